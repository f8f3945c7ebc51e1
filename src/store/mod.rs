//! Persistent multi-user state store
//!
//! One JSON document holds every user's tasks, session, feedback and
//! analytics. The [`StoreManager`] actor is the single writer path; all
//! other components receive snapshots.

mod document;
mod json_store;
mod manager;
mod messages;

pub use document::{LoadShape, StoreDocument, SystemRecord, SystemSettings, UserAnalytics, UserRecord, DEFAULT_USER};
pub use json_store::{AnalyticsView, BackupInfo, JsonStore, StorageInfo, StoreError, UserExport};
pub use manager::StoreManager;
pub use messages::{StoreCommand, StoreResponse};
