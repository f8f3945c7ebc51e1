//! User sessions, preferences and energy patterns
//!
//! Per-user state that is not a task: working hours, peak-energy window,
//! and the hour-of-day energy profile accumulated from feedback.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Initial session revision; the store increments it on every committed
/// write, which is what optimistic updates compare against.
pub const SESSION_VERSION: u32 = 1;

/// User-declared window of best cognitive performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnergyWindow {
    #[default]
    Morning,
    Afternoon,
    Evening,
}

impl EnergyWindow {
    /// Whether the given hour of day falls inside this window
    pub fn contains_hour(&self, hour: u32) -> bool {
        match self {
            Self::Morning => (5..12).contains(&hour),
            Self::Afternoon => (12..17).contains(&hour),
            Self::Evening => (17..23).contains(&hour),
        }
    }
}

impl std::str::FromStr for EnergyWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morning" => Ok(Self::Morning),
            "afternoon" => Ok(Self::Afternoon),
            "evening" => Ok(Self::Evening),
            _ => Err(format!("Unknown energy window: {}", s)),
        }
    }
}

/// Work-scheduling preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Start of the working window, local time of day
    pub work_start: NaiveTime,

    /// End of the working window, local time of day
    pub work_end: NaiveTime,

    /// Window of peak cognitive energy
    pub peak_energy: EnergyWindow,

    /// Preferred session length in minutes
    pub session_minutes: u32,

    /// Hard upper bound for one session in minutes
    pub max_session_minutes: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            work_end: NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
            peak_energy: EnergyWindow::Morning,
            session_minutes: 25,
            max_session_minutes: 30,
        }
    }
}

/// Accumulated mean energy score for one hour of the day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergySample {
    /// Moving average of observed scores (1-10 scale)
    pub mean: f64,
    /// Number of observations folded into the mean
    pub samples: u32,
}

/// Hour-of-day energy profile, accumulated from feedback
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyPattern {
    /// Hour (0-23) to observed sample. BTreeMap keeps the persisted JSON stable.
    #[serde(default)]
    pub hours: BTreeMap<u32, EnergySample>,
}

impl EnergyPattern {
    /// Fold a new observation into the hour's moving average
    pub fn record(&mut self, hour: u32, score: f64) {
        let hour = hour % 24;
        let entry = self.hours.entry(hour).or_insert(EnergySample { mean: 0.0, samples: 0 });
        let n = f64::from(entry.samples);
        entry.mean = (entry.mean * n + score) / (n + 1.0);
        entry.samples += 1;
    }

    /// Mean score for an hour, if observed
    pub fn mean_for_hour(&self, hour: u32) -> Option<f64> {
        self.hours.get(&(hour % 24)).map(|s| s.mean)
    }

    /// Hour -> mean score view for analytics
    pub fn histogram(&self) -> BTreeMap<u32, f64> {
        self.hours.iter().map(|(h, s)| (*h, s.mean)).collect()
    }
}

/// Per-user session metadata and learning state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub version: u32,

    #[serde(default)]
    pub preferences: Preferences,

    #[serde(default)]
    pub energy: EnergyPattern,
}

impl UserSession {
    /// Create a fresh session for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            created_at: now,
            last_updated: now,
            version: SESSION_VERSION,
            preferences: Preferences::default(),
            energy: EnergyPattern::default(),
        }
    }

    /// Bump the last-updated stamp
    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}
