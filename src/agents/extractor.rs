//! Intent extractor
//!
//! Compiles one user utterance plus a compact view of the current task
//! graph into an ordered list of typed actions. Malformed actions are
//! dropped with a warning; if the whole LLM output is unusable the
//! utterance is preserved as a single `add` action so user input is never
//! lost.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{Action, SubtaskDraft, TargetRef, Task, TaskPatch};
use crate::llm::{extract_json, CompletionRequest, LlmClient, LlmError};
use crate::prompts::{ExtractContext, PromptLoader};

/// Result of compiling one utterance
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Actions in the order the model produced them
    pub actions: Vec<Action>,
    /// Per-action problems that led to drops
    pub warnings: Vec<String>,
    /// True when the raw utterance was preserved as a single `add`
    pub fallback: bool,
}

/// Why a target reference did not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NotFound(String),
    Ambiguous(Vec<String>),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(target) => write!(f, "no task matches '{}'", target),
            Self::Ambiguous(candidates) => {
                write!(f, "ambiguous target, candidates: {}", candidates.join(", "))
            }
        }
    }
}

/// Resolve a target reference against the current task set.
///
/// Order: exact id, case-insensitive heading equality, unique
/// case-insensitive heading substring, then the `last_task` sentinel.
pub fn resolve_target(tasks: &[Task], target: &TargetRef) -> Result<Uuid, ResolveError> {
    let reference = target.as_str().trim();

    if target.is_last_task() {
        return tasks
            .iter()
            .max_by_key(|t| t.created_at)
            .map(|t| t.id)
            .ok_or_else(|| ResolveError::NotFound(reference.to_string()));
    }

    // Exact id
    if let Ok(id) = reference.parse::<Uuid>() {
        if tasks.iter().any(|t| t.id == id) {
            return Ok(id);
        }
    }

    // Case-insensitive heading equality
    let equal: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.heading.eq_ignore_ascii_case(reference))
        .collect();
    match equal.len() {
        1 => return Ok(equal[0].id),
        n if n > 1 => {
            return Err(ResolveError::Ambiguous(
                equal.iter().map(|t| t.heading.clone()).collect(),
            ))
        }
        _ => {}
    }

    // Unique heading substring
    let needle = reference.to_lowercase();
    let matches: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.heading.to_lowercase().contains(&needle))
        .collect();
    match matches.len() {
        0 => Err(ResolveError::NotFound(reference.to_string())),
        1 => Ok(matches[0].id),
        _ => Err(ResolveError::Ambiguous(
            matches.iter().map(|t| t.heading.clone()).collect(),
        )),
    }
}

/// Parse an ISO 8601 deadline; naive timestamps are taken as UTC
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Compact task-graph view given to the extraction prompt
fn task_graph_json(tasks: &[Task]) -> String {
    let view: Vec<Value> = tasks
        .iter()
        .map(|t| {
            serde_json::json!({
                "id": t.id,
                "heading": t.heading,
                "status": t.status,
                "deadline": t.deadline,
                "subtasks": t.subtasks.iter().map(|s| serde_json::json!({
                    "id": s.id,
                    "heading": s.heading,
                    "status": s.status,
                })).collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| "[]".to_string())
}

/// LLM-backed utterance-to-actions compiler
pub struct IntentExtractor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
}

impl IntentExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>) -> Self {
        Self { llm, prompts }
    }

    /// Compile an utterance into actions.
    ///
    /// Auth failures propagate (the whole request fails); any other LLM or
    /// parse problem falls back to a single `add` carrying the utterance.
    pub async fn extract(
        &self,
        utterance: &str,
        tasks: &[Task],
        now: DateTime<Utc>,
    ) -> Result<ExtractionOutcome, LlmError> {
        debug!(utterance_len = utterance.len(), task_count = tasks.len(), "extract: called");

        let context = ExtractContext {
            existing_tasks_json: task_graph_json(tasks),
            user_input: utterance.to_string(),
            current_time_utc: now.to_rfc3339(),
        };
        let prompt = self
            .prompts
            .render("extract-task", &context)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let raw = match self.llm.complete(CompletionRequest::new(prompt)).await {
            Ok(raw) => raw,
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => {
                warn!(error = %e, "extract: LLM failed, falling back to raw add");
                return Ok(Self::fallback_outcome(utterance));
            }
        };

        match Self::parse_actions(&raw) {
            Some((actions, warnings)) => {
                debug!(action_count = actions.len(), "extract: parsed actions");
                Ok(ExtractionOutcome {
                    actions,
                    warnings,
                    fallback: false,
                })
            }
            None => {
                warn!("extract: output was not parseable JSON, falling back to raw add");
                Ok(Self::fallback_outcome(utterance))
            }
        }
    }

    /// The never-lose-input fallback: one `add` with the raw utterance
    fn fallback_outcome(utterance: &str) -> ExtractionOutcome {
        ExtractionOutcome {
            actions: vec![Action::Add {
                heading: utterance.trim().to_string(),
                details: Some(utterance.to_string()),
                deadline: None,
                subtasks: Vec::new(),
            }],
            warnings: vec!["intent extraction failed; utterance preserved as a new task".to_string()],
            fallback: true,
        }
    }

    /// Parse the model output into actions. Returns None only when the
    /// whole payload fails to parse as JSON.
    fn parse_actions(raw: &str) -> Option<(Vec<Action>, Vec<String>)> {
        let value: Value = serde_json::from_str(extract_json(raw)).ok()?;
        let items = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            _ => return None,
        };

        let mut actions = Vec::new();
        let mut warnings = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            match Self::parse_action(&item) {
                Ok(action) => actions.push(action),
                Err(reason) => {
                    warn!(idx, %reason, "parse_actions: dropping action");
                    warnings.push(format!("action {} dropped: {}", idx, reason));
                }
            }
        }
        Some((actions, warnings))
    }

    /// Validate one action object against its kind's required fields
    fn parse_action(value: &Value) -> Result<Action, String> {
        let obj = value.as_object().ok_or("action must be an object")?;
        let kind = obj
            .get("action")
            .and_then(Value::as_str)
            .ok_or("missing 'action' field")?;

        match kind {
            "add" => {
                let heading = require_str(obj, "heading")?;
                let mut subtasks = Vec::new();
                if let Some(Value::Array(raw_subtasks)) = obj.get("subtasks") {
                    for raw in raw_subtasks {
                        match parse_subtask_draft(raw) {
                            Ok(draft) => subtasks.push(draft),
                            Err(reason) => return Err(format!("bad subtask: {}", reason)),
                        }
                    }
                }
                Ok(Action::Add {
                    heading,
                    details: optional_str(obj, "details"),
                    deadline: optional_deadline(obj, "deadline")?,
                    subtasks,
                })
            }
            "edit" => {
                let target = require_target(obj)?;
                let patch_obj = obj.get("patch").and_then(Value::as_object).unwrap_or(obj);
                let patch = TaskPatch {
                    heading: optional_str(patch_obj, "heading"),
                    details: optional_str(patch_obj, "details"),
                    deadline: optional_deadline(patch_obj, "deadline")?,
                    estimate_minutes: patch_obj
                        .get("estimate_minutes")
                        .and_then(Value::as_u64)
                        .map(|m| m as u32),
                };
                if patch.is_empty() {
                    return Err("edit with no patch fields".to_string());
                }
                Ok(Action::Edit { target, patch })
            }
            "mark_done" => Ok(Action::MarkDone {
                target: require_target(obj)?,
            }),
            "reschedule" => {
                let target = require_target(obj)?;
                let raw = require_str(obj, "deadline")?;
                let deadline =
                    parse_deadline(&raw).ok_or_else(|| format!("invalid deadline '{}'", raw))?;
                Ok(Action::Reschedule { target, deadline })
            }
            "add_subtask" => {
                let target = require_target(obj)?;
                let raw = obj.get("subtask").ok_or("missing 'subtask' field")?;
                Ok(Action::AddSubtask {
                    target,
                    subtask: parse_subtask_draft(raw)?,
                })
            }
            "delete" => Ok(Action::Delete {
                target: require_target(obj)?,
            }),
            "query_progress" => Ok(Action::QueryProgress),
            "query_next" => Ok(Action::QueryNext),
            other => Err(format!("unknown action kind '{}'", other)),
        }
    }
}

fn require_str(obj: &serde_json::Map<String, Value>, key: &str) -> Result<String, String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing '{}' field", key))
}

fn optional_str(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional_deadline(
    obj: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<DateTime<Utc>>, String> {
    match obj.get(key).and_then(Value::as_str) {
        Some(raw) if !raw.trim().is_empty() => parse_deadline(raw)
            .map(Some)
            .ok_or_else(|| format!("invalid deadline '{}'", raw)),
        _ => Ok(None),
    }
}

fn require_target(obj: &serde_json::Map<String, Value>) -> Result<TargetRef, String> {
    // Both "target" and the original field name "target_task" are accepted
    let raw = require_str(obj, "target").or_else(|_| require_str(obj, "target_task"))?;
    Ok(TargetRef::new(raw))
}

fn parse_subtask_draft(value: &Value) -> Result<SubtaskDraft, String> {
    let obj = value.as_object().ok_or("subtask must be an object")?;
    Ok(SubtaskDraft {
        heading: require_str(obj, "heading")?,
        details: optional_str(obj, "details"),
        deadline: optional_deadline(obj, "deadline")?,
        estimate_minutes: obj
            .get("estimated_minutes")
            .or_else(|| obj.get("estimate_minutes"))
            .and_then(Value::as_u64)
            .map(|m| m as u32),
    })
}
