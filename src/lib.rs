//! Genie - personal task assistant daemon
//!
//! Genie ingests natural-language statements, compiles them into structured
//! task operations, decomposes tasks into short executable subtasks, and
//! recommends the single next action that fits the user's calendar
//! availability and energy profile.
//!
//! # Core Concepts
//!
//! - **One writer path**: all mutations flow through the store actor; agents
//!   receive read-only snapshots
//! - **Typed intents**: utterances compile into a tagged action enum, never
//!   ad-hoc dictionaries
//! - **Degrade, don't die**: research returns empty, the calendar assumes
//!   free, the extractor preserves the raw utterance as a task
//! - **Per-user isolation**: a per-user lock serializes utterances; no agent
//!   retains per-user state across calls
//!
//! # Modules
//!
//! - [`store`] - persistent multi-user state with backup and migration
//! - [`llm`] - LLM client trait and Gemini implementation
//! - [`research`] - web-research client (never critical)
//! - [`calendar`] - free/busy queries and event lifecycle
//! - [`agents`] - extractor, planner, prioritizer, slot scheduler
//! - [`pipeline`] - orchestration of one utterance end to end
//! - [`prompts`] - named templates with embedded fallbacks
//! - [`config`] - configuration types and loading

pub mod agents;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod research;
pub mod store;

// Re-export commonly used types
pub use calendar::{Availability, CalendarClient, CalendarError, EventDraft, EventHandle, EventPatch, Interval};
pub use config::{CalendarConfig, Config, LlmConfig, PipelineConfig, ResearchConfig, StorageConfig};
pub use domain::{
    Action, ActionResult, FeedbackKind, FeedbackRecord, Preferences, PsychologicalFit, Recommendation, Resource,
    Subtask, Task, TaskStatus,
};
pub use llm::{CompletionRequest, GeminiClient, LlmClient, LlmError};
pub use pipeline::{HealthReport, Pipeline, PipelineOptions, UtteranceOutcome};
pub use prompts::PromptLoader;
pub use research::{PerplexityClient, ResearchClient};
pub use store::{AnalyticsView, JsonStore, StoreError, StoreManager, SystemSettings, UserRecord};
