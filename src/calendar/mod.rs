//! Calendar client
//!
//! Free/busy queries and event lifecycle against the user's external
//! calendar. Read-side failures degrade to "assume free" so the pipeline
//! keeps recommending; write-side failures propagate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod google;
mod interval;

pub use google::GoogleCalendarClient;
pub use interval::{free_gaps, merge_busy, Interval};

/// Errors from calendar write operations
#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Event not found: {0}")]
    NotFound(String),
}

/// Free/busy view over a requested range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub free: Vec<Interval>,
    pub busy: Vec<Interval>,

    /// False when the provider could not be reached; `free` then spans the
    /// whole requested range so upstream logic degrades to "assume free".
    pub connected: bool,
}

impl Availability {
    /// Availability computed from busy blocks within a range
    pub fn from_busy(range: Interval, busy: Vec<Interval>) -> Self {
        let busy = merge_busy(busy);
        let free = free_gaps(range, &busy);
        Self {
            free,
            busy,
            connected: true,
        }
    }

    /// Degraded view: one free block spanning the requested range
    pub fn assume_free(range: Interval) -> Self {
        Self {
            free: vec![range],
            busy: Vec::new(),
            connected: false,
        }
    }

    /// Longest free block, if any
    pub fn largest_free_block(&self) -> Option<&Interval> {
        self.free.iter().max_by_key(|i| i.duration_minutes())
    }
}

/// Fields for a new calendar event
#[derive(Debug, Clone, Serialize)]
pub struct EventDraft {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Fields an event update may change
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A provider-side event reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHandle {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// External calendar operations
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Free/busy over a range. Never fails: connectivity or auth problems
    /// return `connected=false` with the whole range free.
    async fn free_busy(&self, range: Interval, calendars: Option<&[String]>) -> Availability;

    /// Create an event, returning the provider event id
    async fn create_event(&self, draft: EventDraft) -> Result<String, CalendarError>;

    /// Patch an existing event
    async fn update_event(&self, event_id: &str, patch: EventPatch) -> Result<(), CalendarError>;

    /// Delete an event
    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;

    /// List events in a range
    async fn list_events(&self, range: Interval) -> Result<Vec<EventHandle>, CalendarError>;
}
