//! StoreManager - actor that owns the JsonStore
//!
//! Processes commands via channels so every mutation flows through a single
//! writer while callers across tasks hold only a cloneable handle.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{FeedbackRecord, Task, TaskPatch, TaskStatus, UserSession};

use super::document::{SystemSettings, UserRecord};
use super::json_store::{AnalyticsView, BackupInfo, JsonStore, StorageInfo, StoreError, UserExport};
use super::messages::{StoreCommand, StoreResponse};

/// Handle to send commands to the StoreManager actor
#[derive(Clone)]
pub struct StoreManager {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreManager {
    /// Open the store and spawn the owning actor task
    pub fn spawn(
        path: impl AsRef<Path>,
        backup_dir: impl AsRef<Path>,
        settings: SystemSettings,
    ) -> eyre::Result<Self> {
        debug!(path = %path.as_ref().display(), "spawn: called");
        let mut store = JsonStore::open(path, backup_dir)?;
        store.set_settings(settings);

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        info!("StoreManager spawned");
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StoreResponse<T>>) -> StoreCommand,
    ) -> StoreResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| StoreError::Channel)?;
        reply_rx.await.map_err(|_| StoreError::Channel)?
    }

    // === User operations ===

    /// Snapshot of the user's record, creating it on first contact
    pub async fn get_or_create_user(&self, user_id: &str) -> StoreResponse<UserRecord> {
        debug!(%user_id, "get_or_create_user: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::GetOrCreateUser { user_id, reply }).await
    }

    /// Replace a user's record in one atomic write (optionally optimistic)
    pub async fn commit_user(
        &self,
        user_id: &str,
        record: UserRecord,
        expected_version: Option<u32>,
    ) -> StoreResponse<u32> {
        debug!(%user_id, ?expected_version, "commit_user: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::CommitUser {
            user_id,
            record: Box::new(record),
            expected_version,
            reply,
        })
        .await
    }

    /// Remove a user and all owned data
    pub async fn delete_user(&self, user_id: &str) -> StoreResponse<bool> {
        debug!(%user_id, "delete_user: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::DeleteUser { user_id, reply }).await
    }

    /// Session snapshot for a user
    pub async fn session(&self, user_id: &str) -> StoreResponse<UserSession> {
        debug!(%user_id, "session: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::GetSession { user_id, reply }).await
    }

    // === Task operations ===

    /// Add a task for a user
    pub async fn add_task(&self, user_id: &str, task: Task) -> StoreResponse<String> {
        debug!(%user_id, task_id = %task.id, "add_task: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::AddTask {
            user_id,
            task: Box::new(task),
            reply,
        })
        .await
    }

    /// Fetch one task
    pub async fn get_task(&self, user_id: &str, task_id: Uuid) -> StoreResponse<Task> {
        debug!(%user_id, %task_id, "get_task: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::GetTask { user_id, task_id, reply }).await
    }

    /// Patch a task; false if unknown
    pub async fn update_task(&self, user_id: &str, task_id: Uuid, patch: TaskPatch) -> StoreResponse<bool> {
        debug!(%user_id, %task_id, "update_task: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::UpdateTask {
            user_id,
            task_id,
            patch,
            reply,
        })
        .await
    }

    /// Delete a task; false if unknown
    pub async fn delete_task(&self, user_id: &str, task_id: Uuid) -> StoreResponse<bool> {
        debug!(%user_id, %task_id, "delete_task: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::DeleteTask { user_id, task_id, reply }).await
    }

    /// Tasks ordered by creation time, optionally filtered by status
    pub async fn list_tasks(&self, user_id: &str, status: Option<TaskStatus>) -> StoreResponse<Vec<Task>> {
        debug!(%user_id, ?status, "list_tasks: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::ListTasks { user_id, status, reply }).await
    }

    /// Case-insensitive heading/details search
    pub async fn search_tasks(&self, user_id: &str, query: &str) -> StoreResponse<Vec<Task>> {
        debug!(%user_id, %query, "search_tasks: called");
        let user_id = user_id.to_string();
        let query = query.to_string();
        self.request(|reply| StoreCommand::SearchTasks { user_id, query, reply }).await
    }

    /// Record or clear a subtask's calendar handle
    pub async fn set_subtask_event(
        &self,
        user_id: &str,
        task_id: Uuid,
        subtask_id: Uuid,
        event_id: Option<String>,
    ) -> StoreResponse<bool> {
        debug!(%user_id, %task_id, %subtask_id, ?event_id, "set_subtask_event: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::SetSubtaskEvent {
            user_id,
            task_id,
            subtask_id,
            event_id,
            reply,
        })
        .await
    }

    // === Feedback and analytics ===

    /// Append a feedback record
    pub async fn add_feedback(&self, user_id: &str, record: FeedbackRecord) -> StoreResponse<()> {
        debug!(%user_id, kind = ?record.kind, "add_feedback: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::AddFeedback {
            user_id,
            record: Box::new(record),
            reply,
        })
        .await
    }

    /// Most recent feedback records
    pub async fn get_feedback(&self, user_id: &str, limit: Option<usize>) -> StoreResponse<Vec<FeedbackRecord>> {
        debug!(%user_id, ?limit, "get_feedback: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::GetFeedback { user_id, limit, reply }).await
    }

    /// Derived analytics view
    pub async fn analytics(&self, user_id: &str) -> StoreResponse<AnalyticsView> {
        debug!(%user_id, "analytics: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::Analytics { user_id, reply }).await
    }

    // === Backups and portability ===

    /// Create a manual backup; returns the backup filename
    pub async fn create_backup(&self, reason: &str) -> StoreResponse<String> {
        debug!(%reason, "create_backup: called");
        let reason = reason.to_string();
        self.request(|reply| StoreCommand::CreateBackup { reason, reply }).await
    }

    /// List backups, newest first
    pub async fn list_backups(&self) -> StoreResponse<Vec<BackupInfo>> {
        debug!("list_backups: called");
        self.request(|reply| StoreCommand::ListBackups { reply }).await
    }

    /// Restore the document from a named backup
    pub async fn restore_backup(&self, filename: &str) -> StoreResponse<()> {
        debug!(%filename, "restore_backup: called");
        let filename = filename.to_string();
        self.request(|reply| StoreCommand::RestoreBackup { filename, reply }).await
    }

    /// Export one user's data
    pub async fn export_user(&self, user_id: &str) -> StoreResponse<UserExport> {
        debug!(%user_id, "export_user: called");
        let user_id = user_id.to_string();
        self.request(|reply| StoreCommand::ExportUser { user_id, reply }).await
    }

    /// Import a previously exported payload
    pub async fn import_user(&self, export: UserExport) -> StoreResponse<()> {
        debug!(user_id = %export.user_id, "import_user: called");
        self.request(|reply| StoreCommand::ImportUser {
            export: Box::new(export),
            reply,
        })
        .await
    }

    /// Storage diagnostics
    pub async fn storage_info(&self) -> StoreResponse<StorageInfo> {
        debug!("storage_info: called");
        self.request(|reply| StoreCommand::StorageInfo { reply }).await
    }

    /// Shut the actor down
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        debug!("shutdown: called");
        self.tx.send(StoreCommand::Shutdown).await.map_err(|_| StoreError::Channel)
    }
}

/// The actor loop that owns the JsonStore and processes commands
async fn actor_loop(mut store: JsonStore, mut rx: mpsc::Receiver<StoreCommand>) {
    debug!("StoreManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::GetOrCreateUser { user_id, reply } => {
                debug!(%user_id, "actor_loop: GetOrCreateUser command");
                let _ = reply.send(store.get_or_create_user(&user_id));
            }
            StoreCommand::CommitUser {
                user_id,
                record,
                expected_version,
                reply,
            } => {
                debug!(%user_id, "actor_loop: CommitUser command");
                let _ = reply.send(store.commit_user(&user_id, *record, expected_version));
            }
            StoreCommand::DeleteUser { user_id, reply } => {
                debug!(%user_id, "actor_loop: DeleteUser command");
                let _ = reply.send(store.delete_user(&user_id));
            }
            StoreCommand::GetSession { user_id, reply } => {
                debug!(%user_id, "actor_loop: GetSession command");
                let _ = reply.send(store.session(&user_id));
            }
            StoreCommand::AddTask { user_id, task, reply } => {
                debug!(%user_id, task_id = %task.id, "actor_loop: AddTask command");
                let _ = reply.send(store.add_task(&user_id, *task));
            }
            StoreCommand::GetTask { user_id, task_id, reply } => {
                debug!(%user_id, %task_id, "actor_loop: GetTask command");
                let _ = reply.send(store.get_task(&user_id, task_id));
            }
            StoreCommand::UpdateTask {
                user_id,
                task_id,
                patch,
                reply,
            } => {
                debug!(%user_id, %task_id, "actor_loop: UpdateTask command");
                let _ = reply.send(store.update_task(&user_id, task_id, patch));
            }
            StoreCommand::DeleteTask { user_id, task_id, reply } => {
                debug!(%user_id, %task_id, "actor_loop: DeleteTask command");
                let _ = reply.send(store.delete_task(&user_id, task_id));
            }
            StoreCommand::ListTasks { user_id, status, reply } => {
                debug!(%user_id, ?status, "actor_loop: ListTasks command");
                let _ = reply.send(store.list_tasks(&user_id, status));
            }
            StoreCommand::SearchTasks { user_id, query, reply } => {
                debug!(%user_id, "actor_loop: SearchTasks command");
                let _ = reply.send(store.search_tasks(&user_id, &query));
            }
            StoreCommand::SetSubtaskEvent {
                user_id,
                task_id,
                subtask_id,
                event_id,
                reply,
            } => {
                debug!(%user_id, %task_id, %subtask_id, "actor_loop: SetSubtaskEvent command");
                let _ = reply.send(store.set_subtask_event(&user_id, task_id, subtask_id, event_id));
            }
            StoreCommand::AddFeedback { user_id, record, reply } => {
                debug!(%user_id, "actor_loop: AddFeedback command");
                let _ = reply.send(store.add_feedback(&user_id, *record));
            }
            StoreCommand::GetFeedback { user_id, limit, reply } => {
                debug!(%user_id, "actor_loop: GetFeedback command");
                let _ = reply.send(store.get_feedback(&user_id, limit));
            }
            StoreCommand::Analytics { user_id, reply } => {
                debug!(%user_id, "actor_loop: Analytics command");
                let _ = reply.send(store.analytics(&user_id));
            }
            StoreCommand::CreateBackup { reason, reply } => {
                debug!(%reason, "actor_loop: CreateBackup command");
                let _ = reply.send(store.create_backup(&reason));
            }
            StoreCommand::ListBackups { reply } => {
                debug!("actor_loop: ListBackups command");
                let _ = reply.send(store.list_backups());
            }
            StoreCommand::RestoreBackup { filename, reply } => {
                debug!(%filename, "actor_loop: RestoreBackup command");
                let _ = reply.send(store.restore_backup(&filename));
            }
            StoreCommand::ExportUser { user_id, reply } => {
                debug!(%user_id, "actor_loop: ExportUser command");
                let _ = reply.send(store.export_user(&user_id));
            }
            StoreCommand::ImportUser { export, reply } => {
                debug!("actor_loop: ImportUser command");
                let _ = reply.send(store.import_user(*export));
            }
            StoreCommand::StorageInfo { reply } => {
                debug!("actor_loop: StorageInfo command");
                let _ = reply.send(Ok(store.storage_info()));
            }
            StoreCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StoreManager shutting down");
                break;
            }
        }
    }

    debug!("StoreManager actor stopped");
}
