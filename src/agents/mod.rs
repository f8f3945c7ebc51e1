//! The four pipeline agents
//!
//! Extractor, planner, prioritizer and slot scheduler. Each depends only on
//! the external clients it needs; orchestration order is owned by the
//! pipeline.

mod extractor;
mod planner;
pub mod prioritizer;
mod scheduler;

pub use extractor::{parse_deadline, resolve_target, ExtractionOutcome, IntentExtractor, ResolveError};
pub use planner::{PlannedBreakdown, Planner};
pub use prioritizer::{classify_depth, recommend, WorkDepth};
pub use scheduler::{Placement, SlotScheduler};
