//! Domain types shared across the pipeline

mod action;
mod feedback;
mod recommendation;
mod session;
mod task;

pub use action::{Action, ActionResult, SubtaskDraft, TargetRef, TaskPatch};
pub use feedback::{FeedbackKind, FeedbackRecord};
pub use recommendation::{PsychologicalFit, Recommendation, ScheduledWindow};
pub use session::{EnergyPattern, EnergySample, EnergyWindow, Preferences, UserSession, SESSION_VERSION};
pub use task::{Resource, ResourceKind, Subtask, Task, TaskStatus, MAX_SCHEDULABLE_MINUTES};
