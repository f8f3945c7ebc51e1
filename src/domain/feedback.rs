//! Feedback records
//!
//! Append-only observations the user reports after working: how long a
//! subtask actually took, how hard it felt, and energy level at the time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a feedback record is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    TaskCompletion,
    Scheduling,
    Difficulty,
    Energy,
}

impl std::str::FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task_completion" => Ok(Self::TaskCompletion),
            "scheduling" => Ok(Self::Scheduling),
            "difficulty" => Ok(Self::Difficulty),
            "energy" => Ok(Self::Energy),
            _ => Err(format!("Unknown feedback kind: {}", s)),
        }
    }
}

/// One append-only feedback observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub kind: FeedbackKind,

    /// Referenced task, if any
    pub task_id: Option<Uuid>,

    /// Referenced subtask, if any
    pub subtask_id: Option<Uuid>,

    /// Minutes actually spent
    pub actual_minutes: Option<u32>,

    /// Perceived difficulty, 1-10
    pub difficulty: Option<u8>,

    /// Energy level at the time, 1-10
    pub energy: Option<u8>,

    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Create a record stamped with the current time
    pub fn new(kind: FeedbackKind) -> Self {
        Self {
            kind,
            task_id: None,
            subtask_id: None,
            actual_minutes: None,
            difficulty: None,
            energy: None,
            timestamp: Utc::now(),
        }
    }

    /// Reference a task
    pub fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Reference a subtask
    pub fn for_subtask(mut self, subtask_id: Uuid) -> Self {
        self.subtask_id = Some(subtask_id);
        self
    }

    /// Record actual minutes spent
    pub fn with_actual_minutes(mut self, minutes: u32) -> Self {
        self.actual_minutes = Some(minutes);
        self
    }

    /// Record perceived difficulty (clamped to 1-10)
    pub fn with_difficulty(mut self, difficulty: u8) -> Self {
        self.difficulty = Some(difficulty.clamp(1, 10));
        self
    }

    /// Record energy level (clamped to 1-10)
    pub fn with_energy(mut self, energy: u8) -> Self {
        self.energy = Some(energy.clamp(1, 10));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_builder_clamps() {
        let record = FeedbackRecord::new(FeedbackKind::Energy)
            .with_energy(14)
            .with_difficulty(0);
        assert_eq!(record.energy, Some(10));
        assert_eq!(record.difficulty, Some(1));
    }

    #[test]
    fn test_feedback_kind_parse() {
        assert_eq!(
            "task_completion".parse::<FeedbackKind>().unwrap(),
            FeedbackKind::TaskCompletion
        );
        assert!("mood".parse::<FeedbackKind>().is_err());
    }

    #[test]
    fn test_feedback_serde() {
        let record = FeedbackRecord::new(FeedbackKind::Difficulty).with_difficulty(7);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"difficulty\""));
        let back: FeedbackRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, FeedbackKind::Difficulty);
        assert_eq!(back.difficulty, Some(7));
    }
}
