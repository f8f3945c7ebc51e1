//! Pipeline - orchestrates the agents over one utterance
//!
//! Owns the only mutation path: extract intents, apply them to a draft
//! snapshot (planning new tasks along the way), commit in a single store
//! write, then recommend and schedule against a fresh free/busy view.
//! Steps 1-4 run under the per-user lock; the read-only tail does not.

mod locks;

pub use locks::UserLocks;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use eyre::Result;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::{prioritizer, resolve_target, IntentExtractor, Planner, SlotScheduler};
use crate::calendar::{CalendarClient, Interval};
use crate::domain::{
    Action, ActionResult, FeedbackRecord, Recommendation, ScheduledWindow, Subtask, SubtaskDraft, Task, TaskStatus,
};
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;
use crate::research::ResearchClient;
use crate::store::{StoreManager, UserRecord};

/// Tunables for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Whole-utterance deadline
    pub overall_deadline: Duration,

    /// Marker prefix for calendar event summaries
    pub summary_prefix: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            overall_deadline: Duration::from_secs(60),
            summary_prefix: "[Genie] ".to_string(),
        }
    }
}

/// Result of one utterance
#[derive(Debug, Clone)]
pub struct UtteranceOutcome {
    /// Per-action results in application order
    pub applied: Vec<ActionResult>,

    /// The recommendation, None when the deadline was exceeded before one
    /// could be computed
    pub recommendation: Option<Recommendation>,

    /// Extraction/planning/scheduling warnings
    pub warnings: Vec<String>,

    /// True when the overall deadline cut the utterance short
    pub timed_out: bool,
}

/// One component's health
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// Per-component health statuses
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.components.iter().all(|c| c.ok)
    }
}

/// The orchestration pipeline
pub struct Pipeline {
    store: StoreManager,
    extractor: IntentExtractor,
    planner: Planner,
    scheduler: SlotScheduler,
    calendar: Arc<dyn CalendarClient>,
    locks: UserLocks,
    options: PipelineOptions,
}

impl Pipeline {
    /// Wire the pipeline. Components never call back into the pipeline;
    /// the dependency graph stays a DAG.
    pub fn new(
        store: StoreManager,
        llm: Arc<dyn LlmClient>,
        research: Arc<dyn ResearchClient>,
        calendar: Arc<dyn CalendarClient>,
        prompts: Arc<PromptLoader>,
        options: PipelineOptions,
    ) -> Self {
        let extractor = IntentExtractor::new(llm.clone(), prompts.clone());
        let planner = Planner::new(llm, research, prompts);
        let scheduler = SlotScheduler::new(calendar.clone(), options.summary_prefix.clone());
        Self {
            store,
            extractor,
            planner,
            scheduler,
            calendar,
            locks: UserLocks::new(),
            options,
        }
    }

    /// Process one user utterance end to end.
    ///
    /// Auth failures abort the whole utterance with no task-state change;
    /// everything else degrades per component and is reported in the
    /// per-action results and warnings.
    pub async fn handle_utterance(&self, user_id: &str, utterance: &str) -> Result<UtteranceOutcome> {
        info!(%user_id, utterance_len = utterance.len(), "handle_utterance: called");
        let deadline = Instant::now() + self.options.overall_deadline;

        // Steps 1-4 run under the per-user lock
        let guard = self.locks.acquire(user_id).await;

        let record = self.store.get_or_create_user(user_id).await?;
        let base_version = record.session.version;
        let tasks: Vec<Task> = record.tasks_ordered().into_iter().cloned().collect();

        let now = Utc::now();
        let extraction = match timeout(
            remaining(deadline),
            self.extractor.extract(utterance, &tasks, now),
        )
        .await
        {
            Ok(Ok(extraction)) => extraction,
            Ok(Err(e)) => {
                // Auth is fatal to the request; nothing was committed
                return Err(eyre::eyre!("intent extraction failed: {}", e));
            }
            Err(_) => {
                warn!(%user_id, "handle_utterance: deadline exceeded during extraction");
                return Ok(UtteranceOutcome {
                    applied: Vec::new(),
                    recommendation: None,
                    warnings: vec!["deadline exceeded before any action was applied".to_string()],
                    timed_out: true,
                });
            }
        };

        let mut warnings = extraction.warnings.clone();
        let mut draft = record;
        let mut applied = Vec::new();
        let mut released: Vec<Subtask> = Vec::new();
        let mut timed_out = false;

        for action in extraction.actions {
            if Instant::now() >= deadline {
                timed_out = true;
                applied.push(ActionResult::failed(
                    action.kind(),
                    "timeout",
                    "not applied: overall deadline exceeded",
                ));
                continue;
            }
            match self
                .apply_action(&mut draft, action, deadline, &mut warnings, &mut released)
                .await
            {
                Ok(result) => applied.push(result),
                // Auth during planning aborts before the commit
                Err(e) => return Err(eyre::eyre!("utterance aborted: {}", e)),
            }
        }

        // Step 4: one atomic write for the whole utterance
        self.store
            .commit_user(user_id, draft.clone(), Some(base_version))
            .await?;
        drop(guard);

        // Calendar handles invalidated by the actions are removed after the
        // commit; only the calendar is written here
        for subtask in &released {
            if let Err(e) = self.scheduler.release(subtask).await {
                warn!(subtask = %subtask.heading, error = %e, "failed to delete invalidated event");
                warnings.push(format!("could not delete calendar event for '{}'", subtask.heading));
            }
        }

        if timed_out {
            return Ok(UtteranceOutcome {
                applied,
                recommendation: None,
                warnings,
                timed_out: true,
            });
        }

        // Steps 5-7: recommendation and placement, read-only against the
        // store except for recording the event handle
        let recommendation = match timeout(
            remaining(deadline),
            self.recommend_and_schedule(user_id, &draft),
        )
        .await
        {
            Ok((recommendation, mut schedule_warnings)) => {
                warnings.append(&mut schedule_warnings);
                Some(recommendation)
            }
            Err(_) => {
                warn!(%user_id, "handle_utterance: deadline exceeded before recommendation");
                timed_out = true;
                None
            }
        };

        Ok(UtteranceOutcome {
            applied,
            recommendation,
            warnings,
            timed_out,
        })
    }

    /// Apply one action to the draft snapshot. Only auth failures bubble up.
    async fn apply_action(
        &self,
        draft: &mut UserRecord,
        action: Action,
        deadline: Instant,
        warnings: &mut Vec<String>,
        released: &mut Vec<Subtask>,
    ) -> Result<ActionResult, crate::llm::LlmError> {
        let kind = action.kind();
        debug!(%kind, "apply_action: called");

        match action {
            Action::Add {
                heading,
                details,
                deadline: task_deadline,
                subtasks,
            } => {
                let mut task = Task::new(heading);
                if let Some(details) = details {
                    task = task.with_details(details);
                }
                if let Some(deadline) = task_deadline {
                    task = task.with_deadline(deadline);
                }
                for draft_subtask in subtasks {
                    task.add_subtask(subtask_from_draft(draft_subtask));
                }

                // The planner fills subtasks unless the utterance already
                // supplied them
                if task.subtasks.is_empty() {
                    match timeout(
                        remaining(deadline),
                        self.planner.plan(&task, &draft.session.preferences),
                    )
                    .await
                    {
                        Ok(Ok(plan)) => {
                            warnings.extend(plan.warnings);
                            if plan.fallback {
                                task.needs_planning = true;
                            }
                            for subtask in plan.subtasks {
                                task.add_subtask(subtask);
                            }
                        }
                        Ok(Err(e)) if e.is_auth() => return Err(e),
                        Ok(Err(e)) => {
                            warn!(error = %e, "apply_action: planner failed, task flagged");
                            warnings.push(format!("planning failed for '{}': {}", task.heading, e));
                            task.needs_planning = true;
                        }
                        Err(_) => {
                            warn!("apply_action: planner timed out, task flagged");
                            warnings.push(format!("planning timed out for '{}'", task.heading));
                            task.needs_planning = true;
                        }
                    }
                }

                let message = format!(
                    "created task '{}' with {} subtasks",
                    task.heading,
                    task.subtasks.len()
                );
                draft.tasks.insert(task.id.to_string(), task);
                Ok(ActionResult::ok(kind, message))
            }

            Action::Edit { target, patch } => match self.resolve(draft, &target, kind) {
                Ok(task_id) => {
                    let task = draft.tasks.get_mut(&task_id.to_string()).expect("resolved task");
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
                    Ok(ActionResult::ok(kind, format!("updated task '{}'", task.heading)))
                }
                Err(result) => Ok(result),
            },

            Action::MarkDone { target } => match self.resolve(draft, &target, kind) {
                Ok(task_id) => {
                    let task = draft.tasks.get_mut(&task_id.to_string()).expect("resolved task");
                    collect_scheduled(task, released);
                    task.mark_done();
                    Ok(ActionResult::ok(kind, format!("marked '{}' done", task.heading)))
                }
                Err(result) => Ok(result),
            },

            Action::Reschedule { target, deadline } => match self.resolve(draft, &target, kind) {
                Ok(task_id) => {
                    let task = draft.tasks.get_mut(&task_id.to_string()).expect("resolved task");
                    task.deadline = Some(deadline);
                    task.updated_at = Utc::now();
                    // A moved deadline invalidates existing placements
                    collect_scheduled(task, released);
                    Ok(ActionResult::ok(
                        kind,
                        format!("rescheduled '{}' to {}", task.heading, deadline.format("%Y-%m-%d")),
                    ))
                }
                Err(result) => Ok(result),
            },

            Action::AddSubtask { target, subtask } => match self.resolve(draft, &target, kind) {
                Ok(task_id) => {
                    let task = draft.tasks.get_mut(&task_id.to_string()).expect("resolved task");
                    let subtask = subtask_from_draft(subtask);
                    let message = format!("added subtask '{}' to '{}'", subtask.heading, task.heading);
                    task.add_subtask(subtask);
                    Ok(ActionResult::ok(kind, message))
                }
                Err(result) => Ok(result),
            },

            Action::Delete { target } => match self.resolve(draft, &target, kind) {
                Ok(task_id) => {
                    let mut task = draft.tasks.remove(&task_id.to_string()).expect("resolved task");
                    collect_scheduled(&mut task, released);
                    Ok(ActionResult::ok(kind, format!("deleted task '{}'", task.heading)))
                }
                Err(result) => Ok(result),
            },

            Action::QueryProgress => {
                let total = draft.tasks.len();
                let count = |status: TaskStatus| draft.tasks.values().filter(|t| t.status == status).count();
                Ok(ActionResult::ok(
                    kind,
                    format!(
                        "{} tasks: {} pending, {} in progress, {} done, {} cancelled",
                        total,
                        count(TaskStatus::Pending),
                        count(TaskStatus::InProgress),
                        count(TaskStatus::Done),
                        count(TaskStatus::Cancelled)
                    ),
                ))
            }

            Action::QueryNext => Ok(ActionResult::ok(kind, "recommendation attached")),
        }
    }

    /// Resolve a target against the draft, mapping failures to action
    /// results so later actions continue.
    fn resolve(
        &self,
        draft: &UserRecord,
        target: &crate::domain::TargetRef,
        kind: &'static str,
    ) -> Result<Uuid, ActionResult> {
        let tasks: Vec<Task> = draft.tasks_ordered().into_iter().cloned().collect();
        resolve_target(&tasks, target).map_err(|e| match e {
            crate::agents::ResolveError::NotFound(_) => ActionResult::failed(kind, "not_found", e.to_string()),
            crate::agents::ResolveError::Ambiguous(_) => ActionResult::failed(kind, "validation", e.to_string()),
        })
    }

    /// Steps 5-7: fresh free/busy view, one recommendation, placement.
    /// Calendar failures leave the recommendation unscheduled.
    async fn recommend_and_schedule(&self, user_id: &str, record: &UserRecord) -> (Recommendation, Vec<String>) {
        let now = Utc::now();
        let range = Interval::from_now(now, 24 * 60);
        let availability = self.calendar.free_busy(range, None).await;
        if !availability.connected {
            debug!(%user_id, "recommend_and_schedule: calendar offline, assuming free");
        }

        let tasks: Vec<Task> = record.tasks_ordered().into_iter().cloned().collect();
        let mut recommendation = prioritizer::recommend(&tasks, &record.session.preferences, &availability, now);
        let mut warnings = Vec::new();

        let (Some(task_id), Some(subtask_id)) = (recommendation.task_id, recommendation.subtask_id) else {
            return (recommendation, warnings);
        };
        let subtask = tasks
            .iter()
            .find(|t| t.id == task_id)
            .and_then(|t| t.subtask(subtask_id));
        let Some(subtask) = subtask else {
            return (recommendation, warnings);
        };

        match self.scheduler.place(subtask, &availability, now).await {
            Ok(Some(placement)) => {
                recommendation.scheduled = Some(ScheduledWindow {
                    start: placement.window.start,
                    end: placement.window.end,
                });
                // Record the handle before returning; a failed write here is
                // recovered later by orphan adoption
                if let Err(e) = self
                    .store
                    .set_subtask_event(user_id, task_id, subtask_id, Some(placement.event_id.clone()))
                    .await
                {
                    warn!(error = %e, "failed to record event id; orphan adoption will recover");
                    warnings.push("scheduled, but the event handle could not be recorded".to_string());
                }
            }
            Ok(None) => {
                debug!("recommend_and_schedule: no fitting slot, advisory-only recommendation");
            }
            Err(e) => {
                warn!(error = %e, "recommend_and_schedule: calendar write failed");
                warnings.push(format!("calendar placement failed: {}", e));
            }
        }

        (recommendation, warnings)
    }

    /// Current recommendation without applying any actions
    pub async fn recommendation(&self, user_id: &str) -> Result<Recommendation> {
        let record = self.store.get_or_create_user(user_id).await?;
        let (recommendation, _) = self.recommend_and_schedule(user_id, &record).await;
        Ok(recommendation)
    }

    /// Append feedback; energy observations update the hourly profile
    pub async fn record_feedback(&self, user_id: &str, record: FeedbackRecord) -> Result<()> {
        self.store.add_feedback(user_id, record).await?;
        Ok(())
    }

    /// Ordered task list, optionally filtered by status
    pub async fn list_tasks(&self, user_id: &str, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        self.store.get_or_create_user(user_id).await?;
        Ok(self.store.list_tasks(user_id, status).await?)
    }

    /// Derived analytics view
    pub async fn analytics(&self, user_id: &str) -> Result<crate::store::AnalyticsView> {
        self.store.get_or_create_user(user_id).await?;
        Ok(self.store.analytics(user_id).await?)
    }

    /// Per-component health statuses
    pub async fn health(&self) -> HealthReport {
        let mut components = Vec::new();

        match self.store.storage_info().await {
            Ok(info) => components.push(ComponentHealth {
                name: "store".to_string(),
                ok: true,
                detail: format!("{} users, {} tasks", info.total_users, info.total_tasks),
            }),
            Err(e) => components.push(ComponentHealth {
                name: "store".to_string(),
                ok: false,
                detail: e.to_string(),
            }),
        }

        let now = Utc::now();
        let probe = self.calendar.free_busy(Interval::from_now(now, 60), None).await;
        components.push(ComponentHealth {
            name: "calendar".to_string(),
            ok: probe.connected,
            detail: if probe.connected {
                "connected".to_string()
            } else {
                "offline, degrading to assume-free".to_string()
            },
        });

        components.push(ComponentHealth {
            name: "llm".to_string(),
            ok: true,
            detail: "configured".to_string(),
        });
        components.push(ComponentHealth {
            name: "research".to_string(),
            ok: true,
            detail: "configured (best effort)".to_string(),
        });

        HealthReport { components }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Collect and clear the calendar handles of a task's scheduled subtasks
fn collect_scheduled(task: &mut Task, released: &mut Vec<Subtask>) {
    for subtask in &mut task.subtasks {
        if subtask.event_id.is_some() {
            released.push(subtask.clone());
            subtask.set_event_id(None);
        }
    }
}

fn subtask_from_draft(draft: SubtaskDraft) -> Subtask {
    let mut subtask = Subtask::new(draft.heading);
    if let Some(details) = draft.details {
        subtask = subtask.with_details(details);
    }
    if let Some(deadline) = draft.deadline {
        subtask = subtask.with_deadline(deadline);
    }
    if let Some(estimate) = draft.estimate_minutes {
        subtask = subtask.with_estimate(estimate);
    }
    subtask
}
