//! Task and Subtask records
//!
//! A Task is the user-facing unit of intent; Subtasks are the one-level-deep
//! execution granules produced by the planner. Only subtasks with a time
//! estimate of at most [`MAX_SCHEDULABLE_MINUTES`] are eligible for calendar
//! placement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for a subtask to be placed on the calendar, in minutes.
pub const MAX_SCHEDULABLE_MINUTES: u32 = 30;

/// Status of a task or subtask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet started
    #[default]
    Pending,
    /// Being worked on
    InProgress,
    /// Successfully completed
    Done,
    /// Cancelled by the user; does not block parent completion
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses never transition again within a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// A research resource attached to a subtask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
    /// article | video | tutorial | docs
    pub kind: ResourceKind,
    /// Short note on which part of the resource to focus on
    pub focus: String,
}

/// Kind of research resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Article,
    Video,
    Tutorial,
    Docs,
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "article" => Ok(Self::Article),
            "video" => Ok(Self::Video),
            "tutorial" => Ok(Self::Tutorial),
            "docs" => Ok(Self::Docs),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// A one-level-deep unit of work, the scheduling granule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique within the owning user
    pub id: Uuid,

    pub heading: String,

    #[serde(default)]
    pub details: String,

    pub status: TaskStatus,

    /// Optional deadline, UTC
    pub deadline: Option<DateTime<Utc>>,

    /// Estimated duration in minutes
    pub estimate_minutes: Option<u32>,

    /// At most one research resource
    pub resource: Option<Resource>,

    /// Provider-side calendar event handle, set by the scheduler
    pub event_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subtask {
    /// Create a new pending subtask
    pub fn new(heading: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            heading: heading.into(),
            details: String::new(),
            status: TaskStatus::Pending,
            deadline: None,
            estimate_minutes: None,
            resource: None,
            event_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the details text
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self.updated_at = Utc::now();
        self
    }

    /// Set the time estimate
    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.estimate_minutes = Some(minutes);
        self.updated_at = Utc::now();
        self
    }

    /// Set the deadline
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self.updated_at = Utc::now();
        self
    }

    /// Attach a research resource
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self.updated_at = Utc::now();
        self
    }

    /// Update the status
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record or clear the calendar event handle
    pub fn set_event_id(&mut self, event_id: Option<String>) {
        self.event_id = event_id;
        self.updated_at = Utc::now();
    }

    /// Whether this subtask may be placed on the calendar.
    ///
    /// Subtasks with no estimate are treated as a full session
    /// ([`MAX_SCHEDULABLE_MINUTES`]) and remain schedulable.
    pub fn is_schedulable(&self) -> bool {
        self.effective_estimate() <= MAX_SCHEDULABLE_MINUTES
    }

    /// Estimate used for scheduling decisions when none was recorded
    pub fn effective_estimate(&self) -> u32 {
        self.estimate_minutes.unwrap_or(MAX_SCHEDULABLE_MINUTES)
    }
}

/// A user-owned task with an ordered list of subtasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,

    pub heading: String,

    #[serde(default)]
    pub details: String,

    pub status: TaskStatus,

    /// Optional deadline, UTC
    pub deadline: Option<DateTime<Utc>>,

    /// Estimated duration in minutes
    pub estimate_minutes: Option<u32>,

    /// Optional resource link for the task itself
    pub resource: Option<Resource>,

    /// Ordered: earlier subtasks are prerequisites of later ones
    #[serde(default)]
    pub subtasks: Vec<Subtask>,

    /// Set when the planner could not produce a breakdown for this task
    #[serde(default)]
    pub needs_planning: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task
    pub fn new(heading: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            heading: heading.into(),
            details: String::new(),
            status: TaskStatus::Pending,
            deadline: None,
            estimate_minutes: None,
            resource: None,
            subtasks: Vec::new(),
            needs_planning: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the details text
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self.updated_at = Utc::now();
        self
    }

    /// Set the deadline
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self.updated_at = Utc::now();
        self
    }

    /// Update the status
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Append a subtask, preserving order
    pub fn add_subtask(&mut self, subtask: Subtask) {
        self.subtasks.push(subtask);
        self.updated_at = Utc::now();
    }

    /// Find a subtask by id
    pub fn subtask(&self, id: Uuid) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    /// Find a subtask by id, mutable
    pub fn subtask_mut(&mut self, id: Uuid) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }

    /// Mark the whole task done, cascading to pending and in-progress
    /// subtasks. Cancelled and already-done subtasks are left untouched.
    pub fn mark_done(&mut self) {
        for subtask in &mut self.subtasks {
            if matches!(subtask.status, TaskStatus::Pending | TaskStatus::InProgress) {
                subtask.set_status(TaskStatus::Done);
            }
        }
        self.set_status(TaskStatus::Done);
    }

    /// Auto-complete the task when every subtask is done or cancelled.
    ///
    /// Returns true if the status changed.
    pub fn sync_completion(&mut self) -> bool {
        if self.status.is_terminal() || self.subtasks.is_empty() {
            return false;
        }
        if self.subtasks.iter().all(|s| s.status.is_terminal()) {
            self.set_status(TaskStatus::Done);
            return true;
        }
        false
    }

    /// Pending subtasks in prerequisite order
    pub fn pending_subtasks(&self) -> impl Iterator<Item = (usize, &Subtask)> {
        self.subtasks
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == TaskStatus::Pending)
    }

    /// Whether the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
