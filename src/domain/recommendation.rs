//! Recommendation - the prioritizer's single-winner output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How well the recommended work matches the user's current energy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsychologicalFit {
    /// Deep work inside the peak-energy window
    Peak,
    /// Shallow work outside the peak window
    Aligned,
    /// No strong signal either way
    Acceptable,
    /// Work type runs against the current energy profile
    Mismatch,
}

impl std::fmt::Display for PsychologicalFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Peak => write!(f, "peak"),
            Self::Aligned => write!(f, "aligned"),
            Self::Acceptable => write!(f, "acceptable"),
            Self::Mismatch => write!(f, "mismatch"),
        }
    }
}

/// The calendar window a recommendation was placed into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The single next action the system recommends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    /// Parent task; None when nothing fits the current window
    pub task_id: Option<Uuid>,

    /// Recommended subtask; None when nothing fits
    pub subtask_id: Option<Uuid>,

    /// Short explanation referencing the dominant ordering rule
    pub reasoning: String,

    pub psychological_fit: PsychologicalFit,

    /// Set by the scheduler once the subtask has a calendar slot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<ScheduledWindow>,
}

impl Recommendation {
    /// The recommendation returned when no subtask passes the hard filter
    pub fn none() -> Self {
        Self {
            task_id: None,
            subtask_id: None,
            reasoning: "no fitting work in window".to_string(),
            psychological_fit: PsychologicalFit::Acceptable,
            scheduled: None,
        }
    }

    /// Whether a concrete subtask was recommended
    pub fn has_target(&self) -> bool {
        self.task_id.is_some() && self.subtask_id.is_some()
    }
}
