//! Persisted document shape
//!
//! The whole store is one JSON document: per-user records under `users`,
//! system metadata under `system`. A legacy layout (a flat `{taskId: task}`
//! map) is migrated one-shot on load by wrapping it under `default_user`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FeedbackRecord, Task, UserSession};

/// User id legacy tasks are migrated under
pub const DEFAULT_USER: &str = "default_user";

/// Current document schema version
pub const DOCUMENT_VERSION: &str = "1.0";

/// System-wide settings persisted with the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    pub auto_backup: bool,
    pub backup_retention_days: u32,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            auto_backup: true,
            backup_retention_days: 30,
        }
    }
}

/// System metadata block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemRecord {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_backup: Option<String>,
    pub settings: SystemSettings,
}

impl Default for SystemRecord {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            created_at: Utc::now(),
            last_updated: None,
            last_backup: None,
            settings: SystemSettings::default(),
        }
    }
}

/// Lightweight per-user analytics counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAnalytics {
    pub total_sessions: u64,
    pub last_session: Option<DateTime<Utc>>,
}

impl Default for UserAnalytics {
    fn default() -> Self {
        Self {
            total_sessions: 1,
            last_session: Some(Utc::now()),
        }
    }
}

/// Everything the store holds for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub session: UserSession,

    /// Task id (UUID string) to task
    #[serde(default)]
    pub tasks: HashMap<String, Task>,

    /// Append-only feedback log
    #[serde(default)]
    pub feedback: Vec<FeedbackRecord>,

    #[serde(default)]
    pub analytics: UserAnalytics,
}

impl UserRecord {
    /// Fresh record for a new user
    pub fn new(user_id: &str) -> Self {
        Self {
            session: UserSession::new(user_id),
            tasks: HashMap::new(),
            feedback: Vec::new(),
            analytics: UserAnalytics::default(),
        }
    }

    /// Tasks ordered by creation time
    pub fn tasks_ordered(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Most recently created task, the `last_task` target
    pub fn last_task(&self) -> Option<&Task> {
        self.tasks.values().max_by_key(|t| t.created_at)
    }
}

/// The full persisted document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub users: HashMap<String, UserRecord>,

    #[serde(default)]
    pub system: SystemRecord,
}

/// What happened while interpreting a raw document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadShape {
    /// Document already had the `{users, system}` layout
    Modern,
    /// Legacy flat task map was wrapped under [`DEFAULT_USER`]
    Migrated,
}

impl StoreDocument {
    /// Interpret a raw JSON value as a document, migrating the legacy
    /// layout when the `users` key is absent.
    pub fn from_value(value: serde_json::Value) -> Result<(Self, LoadShape), serde_json::Error> {
        let is_modern = value
            .as_object()
            .map(|obj| obj.contains_key("users"))
            .unwrap_or(false);

        if is_modern {
            let doc: StoreDocument = serde_json::from_value(value)?;
            return Ok((doc, LoadShape::Modern));
        }

        let tasks = Self::legacy_tasks(value)?;
        let mut user = UserRecord::new(DEFAULT_USER);
        user.tasks = tasks;

        let mut doc = StoreDocument::default();
        doc.users.insert(DEFAULT_USER.to_string(), user);
        Ok((doc, LoadShape::Migrated))
    }

    /// Extract the task map from a legacy document: either a top-level
    /// `tasks` object or the whole document as a `{taskId: task}` map.
    fn legacy_tasks(value: serde_json::Value) -> Result<HashMap<String, Task>, serde_json::Error> {
        let inner = match value {
            serde_json::Value::Object(mut obj) => match obj.remove("tasks") {
                Some(tasks) => tasks,
                None => serde_json::Value::Object(obj),
            },
            other => other,
        };
        serde_json::from_value(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;

    fn task_json(heading: &str) -> serde_json::Value {
        serde_json::to_value(Task::new(heading)).unwrap()
    }

    #[test]
    fn test_modern_document_roundtrip() {
        let mut doc = StoreDocument::default();
        doc.users.insert("alice".to_string(), UserRecord::new("alice"));

        let value = serde_json::to_value(&doc).unwrap();
        let (loaded, shape) = StoreDocument::from_value(value).unwrap();

        assert_eq!(shape, LoadShape::Modern);
        assert!(loaded.users.contains_key("alice"));
    }

    #[test]
    fn test_legacy_flat_map_migrates() {
        let task = Task::new("Old task");
        let id = task.id.to_string();
        let legacy = serde_json::json!({ id.clone(): serde_json::to_value(&task).unwrap() });

        let (doc, shape) = StoreDocument::from_value(legacy).unwrap();

        assert_eq!(shape, LoadShape::Migrated);
        let user = doc.users.get(DEFAULT_USER).expect("default user synthesized");
        assert_eq!(user.tasks.len(), 1);
        assert_eq!(user.tasks[&id].heading, "Old task");
        assert_eq!(user.session.user_id, DEFAULT_USER);
    }

    #[test]
    fn test_legacy_tasks_key_migrates() {
        let legacy = serde_json::json!({
            "tasks": { "11111111-1111-1111-1111-111111111111": task_json("Wrapped") }
        });

        let (doc, shape) = StoreDocument::from_value(legacy).unwrap();

        assert_eq!(shape, LoadShape::Migrated);
        let user = &doc.users[DEFAULT_USER];
        assert_eq!(user.tasks.len(), 1);
        assert_eq!(
            user.tasks["11111111-1111-1111-1111-111111111111"].status,
            TaskStatus::Pending
        );
    }

    #[test]
    fn test_legacy_equivalence_with_modern_wrap() {
        // loadLegacy({id: task}) == loadModern({users: {default_user: {tasks: {id: task}}}, ...})
        let task = Task::new("Same task");
        let id = task.id.to_string();

        let legacy = serde_json::json!({ id.clone(): serde_json::to_value(&task).unwrap() });
        let (from_legacy, _) = StoreDocument::from_value(legacy).unwrap();

        let mut wrapped = StoreDocument::default();
        let mut user = UserRecord::new(DEFAULT_USER);
        user.tasks.insert(id.clone(), task);
        wrapped.users.insert(DEFAULT_USER.to_string(), user);

        let legacy_tasks = &from_legacy.users[DEFAULT_USER].tasks;
        let modern_tasks = &wrapped.users[DEFAULT_USER].tasks;
        assert_eq!(legacy_tasks.len(), modern_tasks.len());
        assert_eq!(legacy_tasks[&id].heading, modern_tasks[&id].heading);
        assert_eq!(legacy_tasks[&id].id, modern_tasks[&id].id);
    }

    #[test]
    fn test_tasks_ordered_by_created_at() {
        let mut user = UserRecord::new("bob");
        let first = Task::new("first");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Task::new("second");

        // Insert out of order
        user.tasks.insert(second.id.to_string(), second.clone());
        user.tasks.insert(first.id.to_string(), first.clone());

        let ordered = user.tasks_ordered();
        assert_eq!(ordered[0].id, first.id);
        assert_eq!(ordered[1].id, second.id);
        assert_eq!(user.last_task().unwrap().id, second.id);
    }
}
