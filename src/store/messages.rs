//! Store manager messages
//!
//! Commands and responses for the actor pattern.

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::{FeedbackRecord, Task, TaskPatch, TaskStatus, UserSession};

use super::document::UserRecord;
use super::json_store::{AnalyticsView, BackupInfo, StorageInfo, StoreError, UserExport};

/// Response from store operations
pub type StoreResponse<T> = Result<T, StoreError>;

/// Commands sent to the StoreManager actor
#[derive(Debug)]
pub enum StoreCommand {
    // User operations
    GetOrCreateUser {
        user_id: String,
        reply: oneshot::Sender<StoreResponse<UserRecord>>,
    },
    CommitUser {
        user_id: String,
        record: Box<UserRecord>,
        expected_version: Option<u32>,
        reply: oneshot::Sender<StoreResponse<u32>>,
    },
    DeleteUser {
        user_id: String,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    GetSession {
        user_id: String,
        reply: oneshot::Sender<StoreResponse<UserSession>>,
    },

    // Task operations
    AddTask {
        user_id: String,
        task: Box<Task>,
        reply: oneshot::Sender<StoreResponse<String>>,
    },
    GetTask {
        user_id: String,
        task_id: Uuid,
        reply: oneshot::Sender<StoreResponse<Task>>,
    },
    UpdateTask {
        user_id: String,
        task_id: Uuid,
        patch: TaskPatch,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    DeleteTask {
        user_id: String,
        task_id: Uuid,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    ListTasks {
        user_id: String,
        status: Option<TaskStatus>,
        reply: oneshot::Sender<StoreResponse<Vec<Task>>>,
    },
    SearchTasks {
        user_id: String,
        query: String,
        reply: oneshot::Sender<StoreResponse<Vec<Task>>>,
    },
    SetSubtaskEvent {
        user_id: String,
        task_id: Uuid,
        subtask_id: Uuid,
        event_id: Option<String>,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },

    // Feedback and analytics
    AddFeedback {
        user_id: String,
        record: Box<FeedbackRecord>,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    GetFeedback {
        user_id: String,
        limit: Option<usize>,
        reply: oneshot::Sender<StoreResponse<Vec<FeedbackRecord>>>,
    },
    Analytics {
        user_id: String,
        reply: oneshot::Sender<StoreResponse<AnalyticsView>>,
    },

    // Backups and portability
    CreateBackup {
        reason: String,
        reply: oneshot::Sender<StoreResponse<String>>,
    },
    ListBackups {
        reply: oneshot::Sender<StoreResponse<Vec<BackupInfo>>>,
    },
    RestoreBackup {
        filename: String,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    ExportUser {
        user_id: String,
        reply: oneshot::Sender<StoreResponse<UserExport>>,
    },
    ImportUser {
        export: Box<UserExport>,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    StorageInfo {
        reply: oneshot::Sender<StoreResponse<StorageInfo>>,
    },

    // Shutdown
    Shutdown,
}
