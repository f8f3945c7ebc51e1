//! Intent actions
//!
//! The tagged variants a user utterance is compiled into. Each variant
//! carries its own payload shape; the pipeline dispatches on the variant,
//! never on key probing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An unresolved reference to a task: an id, a heading (exact or
/// substring), or the literal `last_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef(pub String);

impl TargetRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The sentinel resolving to the most recently created task
    pub fn is_last_task(&self) -> bool {
        self.0.eq_ignore_ascii_case("last_task")
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload for a subtask created directly from an utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskDraft {
    pub heading: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimate_minutes: Option<u32>,
}

/// Fields an `edit` action may change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimate_minutes: Option<u32>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.heading.is_none()
            && self.details.is_none()
            && self.deadline.is_none()
            && self.estimate_minutes.is_none()
    }
}

/// A single typed operation derived from a user utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Create a new task
    Add {
        heading: String,
        #[serde(default)]
        details: Option<String>,
        #[serde(default)]
        deadline: Option<DateTime<Utc>>,
        #[serde(default)]
        subtasks: Vec<SubtaskDraft>,
    },

    /// Modify an existing task
    Edit { target: TargetRef, patch: TaskPatch },

    /// Cascade the task and its open subtasks to done
    MarkDone { target: TargetRef },

    /// Move the deadline; invalidates any calendar placement
    Reschedule {
        target: TargetRef,
        deadline: DateTime<Utc>,
    },

    /// Append a subtask to an existing task
    AddSubtask {
        target: TargetRef,
        subtask: SubtaskDraft,
    },

    /// Remove a task entirely
    Delete { target: TargetRef },

    /// Request a status summary
    QueryProgress,

    /// Request the next recommendation
    QueryNext,
}

impl Action {
    /// Stable kind string for results and logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Edit { .. } => "edit",
            Self::MarkDone { .. } => "mark_done",
            Self::Reschedule { .. } => "reschedule",
            Self::AddSubtask { .. } => "add_subtask",
            Self::Delete { .. } => "delete",
            Self::QueryProgress => "query_progress",
            Self::QueryNext => "query_next",
        }
    }
}

/// Per-action outcome surfaced to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// Action kind this result belongs to
    pub kind: String,
    pub ok: bool,
    /// Human-readable outcome or error
    pub message: String,
    /// Semantic error class when `ok` is false
    /// (validation | not_found | timeout | internal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ok: true,
            message: message.into(),
            error: None,
        }
    }

    pub fn failed(kind: impl Into<String>, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ok: false,
            message: message.into(),
            error: Some(error.into()),
        }
    }
}
