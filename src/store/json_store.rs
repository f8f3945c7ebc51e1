//! JSON document store
//!
//! Owns the single persisted document: atomic whole-file writes
//! (write-to-temp, fsync, rename), pre-write auto-backups with retention
//! pruning, one-shot legacy migration, and backup-based corruption
//! recovery. All mutations go through [`JsonStore`]; the async manager
//! serializes callers onto it.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{FeedbackKind, FeedbackRecord, Task, TaskPatch, TaskStatus, UserSession};

use super::document::{LoadShape, StoreDocument, SystemSettings, UserRecord};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel error")]
    Channel,
}

/// Metadata about one backup file
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub filename: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}

/// Derived per-user analytics view
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsView {
    pub user_id: String,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub in_progress_tasks: usize,
    pub completed_tasks: usize,
    pub cancelled_tasks: usize,
    /// Mean of actual-minutes / estimated-minutes over completion feedback
    pub estimate_accuracy: Option<f64>,
    /// Hour of day to mean observed energy score
    pub energy_histogram: BTreeMap<u32, f64>,
    pub session_created_at: DateTime<Utc>,
    pub session_last_updated: DateTime<Utc>,
    pub session_version: u32,
}

/// Storage-level diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub storage_path: String,
    pub backup_dir: String,
    pub file_size: u64,
    pub total_users: usize,
    pub total_tasks: usize,
    pub version: String,
    pub last_backup: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Portable single-user export payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserExport {
    pub user_id: String,
    pub exported_at: DateTime<Utc>,
    pub data: UserRecord,
}

/// Single-document JSON store with atomic writes and automatic backups
pub struct JsonStore {
    path: PathBuf,
    backup_dir: PathBuf,
    doc: StoreDocument,
}

impl JsonStore {
    /// Open (or create) the store at `path`, with backups under `backup_dir`.
    ///
    /// A corrupt primary file is preserved as a `corrupted` backup, then the
    /// newest readable backup is restored; if none loads, the store starts
    /// from an empty document. A legacy flat-task document is migrated after
    /// a `migration` backup of the original file.
    pub fn open(path: impl AsRef<Path>, backup_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let backup_dir = backup_dir.as_ref().to_path_buf();
        fs::create_dir_all(&backup_dir)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut store = Self {
            path,
            backup_dir,
            doc: StoreDocument::default(),
        };
        store.load()?;
        debug!(path = %store.path.display(), "JsonStore opened");
        Ok(store)
    }

    /// Apply system settings (from configuration) to the document
    pub fn set_settings(&mut self, settings: SystemSettings) {
        self.doc.system.settings = settings;
    }

    fn load(&mut self) -> Result<(), StoreError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "Creating new store document");
            self.save()?;
            return Ok(());
        }

        let raw = fs::read_to_string(&self.path)?;
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Store document failed to parse");
                return self.recover_from_corruption();
            }
        };

        match StoreDocument::from_value(value) {
            Ok((doc, LoadShape::Modern)) => {
                self.doc = doc;
                debug!(users = self.doc.users.len(), "Loaded store document");
                Ok(())
            }
            Ok((doc, LoadShape::Migrated)) => {
                info!("Legacy task layout detected, migrating to user-based layout");
                // Migration backup of the original file is always taken first
                self.copy_current_file_to_backup("migration")?;
                self.doc = doc;
                self.save()?;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Store document has unusable shape");
                self.recover_from_corruption()
            }
        }
    }

    /// Preserve the corrupt file, then restore the newest readable backup
    /// or fall back to an empty document.
    fn recover_from_corruption(&mut self) -> Result<(), StoreError> {
        if let Err(e) = self.copy_current_file_to_backup("corrupted") {
            warn!(error = %e, "Could not preserve corrupt document");
        }

        for backup in self.list_backups()? {
            if backup.reason == "corrupted" {
                continue;
            }
            let candidate = self.backup_dir.join(&backup.filename);
            match fs::read_to_string(&candidate)
                .map_err(StoreError::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(StoreError::from))
                .and_then(|value| StoreDocument::from_value(value).map_err(StoreError::from))
            {
                Ok((doc, _)) => {
                    warn!(backup = %backup.filename, "Restored store from backup after corruption");
                    self.doc = doc;
                    self.save()?;
                    return Ok(());
                }
                Err(e) => {
                    debug!(backup = %backup.filename, error = %e, "Backup not usable, trying older");
                }
            }
        }

        error!("No usable backup found, starting from empty document");
        self.doc = StoreDocument::default();
        self.save()
    }

    /// Persist the document: optional pre-write backup of the prior file,
    /// then write-to-temp, fsync, rename.
    fn save(&mut self) -> Result<(), StoreError> {
        self.doc.system.last_updated = Some(Utc::now());

        if self.doc.system.settings.auto_backup && self.path.exists() {
            if let Err(e) = self.copy_current_file_to_backup("auto") {
                warn!(error = %e, "Pre-write backup failed");
            }
            self.prune_backups();
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            let body = serde_json::to_vec_pretty(&self.doc)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Store document persisted");
        Ok(())
    }

    fn copy_current_file_to_backup(&mut self, reason: &str) -> Result<String, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound("no document to back up".to_string()));
        }
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        let filename = format!("progress_backup_{}_{}.json", reason, stamp);
        let target = self.backup_dir.join(&filename);
        fs::copy(&self.path, &target)?;
        self.doc.system.last_backup = Some(filename.clone());
        info!(backup = %filename, %reason, "Backup created");
        Ok(filename)
    }

    /// Create a manual backup of the current on-disk document. The
    /// `last_backup` stamp is persisted with the next write.
    pub fn create_backup(&mut self, reason: &str) -> Result<String, StoreError> {
        self.copy_current_file_to_backup(reason)
    }

    /// Delete backups older than the configured retention window
    fn prune_backups(&self) {
        let retention = i64::from(self.doc.system.settings.backup_retention_days);
        let cutoff = Utc::now() - chrono::Duration::days(retention);

        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Could not scan backup directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("progress_backup_") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from);
            if let Ok(modified) = modified {
                if modified < cutoff {
                    if let Err(e) = fs::remove_file(entry.path()) {
                        warn!(backup = %name, error = %e, "Failed to prune backup");
                    } else {
                        debug!(backup = %name, "Pruned expired backup");
                    }
                }
            }
        }
    }

    /// List backups, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, StoreError> {
        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)?.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.starts_with("progress_backup_") || !filename.ends_with(".json") {
                continue;
            }
            let meta = entry.metadata()?;
            let created_at = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
            // progress_backup_<reason>_<stamp>.json
            let reason = filename
                .split('_')
                .nth(2)
                .unwrap_or("unknown")
                .to_string();
            backups.push(BackupInfo {
                filename,
                size: meta.len(),
                created_at,
                reason,
            });
        }
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.filename.cmp(&a.filename)));
        Ok(backups)
    }

    /// Replace the document with a backup's contents
    pub fn restore_backup(&mut self, filename: &str) -> Result<(), StoreError> {
        let path = self.backup_dir.join(filename);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("backup {}", filename)));
        }
        let raw = fs::read_to_string(&path)?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(format!("backup {}: {}", filename, e)))?;
        let (doc, _) = StoreDocument::from_value(value)?;
        self.doc = doc;
        self.save()?;
        info!(backup = %filename, "Restored from backup");
        Ok(())
    }

    // === User operations ===

    /// Snapshot of the user's record, creating it on first contact
    pub fn get_or_create_user(&mut self, user_id: &str) -> Result<UserRecord, StoreError> {
        if !self.doc.users.contains_key(user_id) {
            info!(%user_id, "Creating new user record");
            self.doc.users.insert(user_id.to_string(), UserRecord::new(user_id));
            self.save()?;
        }
        Ok(self.doc.users[user_id].clone())
    }

    fn user(&self, user_id: &str) -> Result<&UserRecord, StoreError> {
        self.doc
            .users
            .get(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    fn user_mut(&mut self, user_id: &str) -> Result<&mut UserRecord, StoreError> {
        self.doc
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    /// Replace a user's record wholesale in one atomic write.
    ///
    /// When `expected_version` is given, the stored session version must
    /// still match it (optimistic update); the committed record's version
    /// is then incremented.
    pub fn commit_user(
        &mut self,
        user_id: &str,
        mut record: UserRecord,
        expected_version: Option<u32>,
    ) -> Result<u32, StoreError> {
        if let Some(expected) = expected_version {
            if let Some(current) = self.doc.users.get(user_id) {
                if current.session.version != expected {
                    return Err(StoreError::Conflict(format!(
                        "user {}: version {} != expected {}",
                        user_id, current.session.version, expected
                    )));
                }
            }
        }
        record.session.version += 1;
        record.session.touch();
        let version = record.session.version;
        self.doc.users.insert(user_id.to_string(), record);
        self.save()?;
        Ok(version)
    }

    /// Remove a user and all owned data
    pub fn delete_user(&mut self, user_id: &str) -> Result<bool, StoreError> {
        let removed = self.doc.users.remove(user_id).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    // === Task operations ===

    /// Add a task, creating the user on first contact
    pub fn add_task(&mut self, user_id: &str, task: Task) -> Result<String, StoreError> {
        if !self.doc.users.contains_key(user_id) {
            self.doc.users.insert(user_id.to_string(), UserRecord::new(user_id));
        }
        let id = task.id.to_string();
        let user = self.user_mut(user_id)?;
        user.tasks.insert(id.clone(), task);
        user.session.touch();
        self.save()?;
        Ok(id)
    }

    /// Fetch one task
    pub fn get_task(&self, user_id: &str, task_id: Uuid) -> Result<Task, StoreError> {
        self.user(user_id)?
            .tasks
            .get(&task_id.to_string())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("task {}", task_id)))
    }

    /// Apply a patch to a task. Returns false if the task is unknown.
    pub fn update_task(&mut self, user_id: &str, task_id: Uuid, patch: TaskPatch) -> Result<bool, StoreError> {
        let user = self.user_mut(user_id)?;
        let task = match user.tasks.get_mut(&task_id.to_string()) {
            Some(task) => task,
            None => return Ok(false),
        };
        if let Some(heading) = patch.heading {
            task.heading = heading;
        }
        if let Some(details) = patch.details {
            task.details = details;
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = Some(deadline);
        }
        if let Some(estimate) = patch.estimate_minutes {
            task.estimate_minutes = Some(estimate);
        }
        task.updated_at = Utc::now();
        user.session.touch();
        self.save()?;
        Ok(true)
    }

    /// Remove a task. Returns false if it was unknown.
    pub fn delete_task(&mut self, user_id: &str, task_id: Uuid) -> Result<bool, StoreError> {
        let user = self.user_mut(user_id)?;
        let removed = user.tasks.remove(&task_id.to_string()).is_some();
        if removed {
            user.session.touch();
            self.save()?;
        }
        Ok(removed)
    }

    /// Tasks ordered by creation time, optionally filtered by status
    pub fn list_tasks(&self, user_id: &str, status: Option<TaskStatus>) -> Result<Vec<Task>, StoreError> {
        let user = self.user(user_id)?;
        let mut tasks: Vec<Task> = user
            .tasks
            .values()
            .filter(|t| status.map(|s| t.status == s).unwrap_or(true))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    /// Case-insensitive heading/details search
    pub fn search_tasks(&self, user_id: &str, query: &str) -> Result<Vec<Task>, StoreError> {
        let needle = query.to_lowercase();
        let mut tasks: Vec<Task> = self
            .user(user_id)?
            .tasks
            .values()
            .filter(|t| {
                t.heading.to_lowercase().contains(&needle) || t.details.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    /// Record or clear the calendar handle cached under a subtask
    pub fn set_subtask_event(
        &mut self,
        user_id: &str,
        task_id: Uuid,
        subtask_id: Uuid,
        event_id: Option<String>,
    ) -> Result<bool, StoreError> {
        let user = self.user_mut(user_id)?;
        let task = match user.tasks.get_mut(&task_id.to_string()) {
            Some(task) => task,
            None => return Ok(false),
        };
        match task.subtask_mut(subtask_id) {
            Some(subtask) => {
                subtask.set_event_id(event_id);
                self.save()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // === Feedback and analytics ===

    /// Append a feedback record; energy observations also update the
    /// session's hour-of-day energy profile.
    pub fn add_feedback(&mut self, user_id: &str, record: FeedbackRecord) -> Result<(), StoreError> {
        if !self.doc.users.contains_key(user_id) {
            self.doc.users.insert(user_id.to_string(), UserRecord::new(user_id));
        }
        let user = self.user_mut(user_id)?;
        if let Some(energy) = record.energy {
            let hour = chrono::Timelike::hour(&record.timestamp);
            user.session.energy.record(hour, f64::from(energy));
        }
        user.feedback.push(record);
        user.session.touch();
        self.save()
    }

    /// Most recent feedback, newest last
    pub fn get_feedback(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<FeedbackRecord>, StoreError> {
        let feedback = &self.user(user_id)?.feedback;
        let records = match limit {
            Some(n) if n < feedback.len() => feedback[feedback.len() - n..].to_vec(),
            _ => feedback.clone(),
        };
        Ok(records)
    }

    /// Derived analytics view for a user
    pub fn analytics(&self, user_id: &str) -> Result<AnalyticsView, StoreError> {
        let user = self.user(user_id)?;
        let tasks = &user.tasks;

        let count = |status: TaskStatus| tasks.values().filter(|t| t.status == status).count();

        let mut ratios = Vec::new();
        for record in &user.feedback {
            if record.kind != FeedbackKind::TaskCompletion {
                continue;
            }
            let actual = match record.actual_minutes {
                Some(actual) if actual > 0 => f64::from(actual),
                _ => continue,
            };
            let estimate = record.subtask_id.and_then(|sid| {
                tasks
                    .values()
                    .find_map(|t| t.subtask(sid))
                    .and_then(|s| s.estimate_minutes)
            });
            if let Some(estimate) = estimate {
                if estimate > 0 {
                    ratios.push(actual / f64::from(estimate));
                }
            }
        }
        let estimate_accuracy = if ratios.is_empty() {
            None
        } else {
            Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
        };

        Ok(AnalyticsView {
            user_id: user_id.to_string(),
            total_tasks: tasks.len(),
            pending_tasks: count(TaskStatus::Pending),
            in_progress_tasks: count(TaskStatus::InProgress),
            completed_tasks: count(TaskStatus::Done),
            cancelled_tasks: count(TaskStatus::Cancelled),
            estimate_accuracy,
            energy_histogram: user.session.energy.histogram(),
            session_created_at: user.session.created_at,
            session_last_updated: user.session.last_updated,
            session_version: user.session.version,
        })
    }

    // === Import/export and diagnostics ===

    /// Export one user's data as a portable payload
    pub fn export_user(&self, user_id: &str) -> Result<UserExport, StoreError> {
        Ok(UserExport {
            user_id: user_id.to_string(),
            exported_at: Utc::now(),
            data: self.user(user_id)?.clone(),
        })
    }

    /// Import a previously exported user payload, replacing any existing data
    pub fn import_user(&mut self, export: UserExport) -> Result<(), StoreError> {
        self.doc.users.insert(export.user_id.clone(), export.data);
        self.save()
    }

    /// Storage diagnostics for health reporting
    pub fn storage_info(&self) -> StorageInfo {
        let file_size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        StorageInfo {
            storage_path: self.path.display().to_string(),
            backup_dir: self.backup_dir.display().to_string(),
            file_size,
            total_users: self.doc.users.len(),
            total_tasks: self.doc.users.values().map(|u| u.tasks.len()).sum(),
            version: self.doc.system.version.clone(),
            last_backup: self.doc.system.last_backup.clone(),
            created_at: self.doc.system.created_at,
            last_updated: self.doc.system.last_updated,
        }
    }

    /// Direct session access for the feedback path
    pub fn session(&self, user_id: &str) -> Result<UserSession, StoreError> {
        Ok(self.user(user_id)?.session.clone())
    }
}
