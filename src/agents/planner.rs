//! Planner - LLM-driven decomposition of tasks into short subtasks
//!
//! Takes a newly created task and breaks it into 2-5 executable subtasks of
//! 15-30 minutes each, attaching at most one research resource per subtask.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Preferences, Subtask, Task};
use crate::llm::{extract_json, CompletionRequest, LlmClient, LlmError};
use crate::prompts::{BreakdownContext, PromptLoader};
use crate::research::ResearchClient;

/// Bounds on a breakdown
const MIN_SUBTASKS: usize = 2;
const MAX_SUBTASKS: usize = 5;
const MIN_ESTIMATE_MINUTES: u32 = 15;
const MAX_ESTIMATE_MINUTES: u32 = 30;

/// Appended to the prompt when the first attempt returns an invalid shape
const CLARIFY_SUFFIX: &str = "\n\nYour previous answer was not valid. Respond with ONLY the JSON object \
     {\"subtasks\": [{\"heading\": ..., \"details\": ..., \"estimated_minutes\": ...}]} \
     containing 2 to 5 subtasks of 15 to 30 minutes each.";

/// Result of planning one task
#[derive(Debug, Clone)]
pub struct PlannedBreakdown {
    /// Ordered subtasks, earlier ones prerequisites of later ones
    pub subtasks: Vec<Subtask>,
    /// True when the single-subtask fallback was used
    pub fallback: bool,
    /// Any warnings during planning
    pub warnings: Vec<String>,
}

/// LLM output schema for one subtask
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubtaskOutput {
    heading: String,
    #[serde(default)]
    details: String,
    estimated_minutes: Option<u32>,
}

/// Full breakdown output from the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BreakdownOutput {
    subtasks: Vec<SubtaskOutput>,
}

/// Planner breaks tasks into executable subtasks
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    research: Arc<dyn ResearchClient>,
    prompts: Arc<PromptLoader>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, research: Arc<dyn ResearchClient>, prompts: Arc<PromptLoader>) -> Self {
        Self { llm, research, prompts }
    }

    /// Decompose a task into subtasks.
    ///
    /// An invalid LLM structure is retried once with a clarifying suffix;
    /// a second invalid answer degrades to one 30-minute subtask mirroring
    /// the task heading. LLM errors propagate to the caller.
    pub async fn plan(&self, task: &Task, preferences: &Preferences) -> Result<PlannedBreakdown, LlmError> {
        info!(task_id = %task.id, heading = %task.heading, "Planning task breakdown");

        let prompt = self.build_prompt(task, preferences)?;
        let mut warnings = Vec::new();

        let output = match self.request_breakdown(&prompt).await? {
            Ok(output) => Some(output),
            Err(reason) => {
                warn!(task_id = %task.id, %reason, "Breakdown invalid, retrying with clarification");
                warnings.push(format!("first breakdown attempt invalid: {}", reason));
                let retry_prompt = format!("{}{}", prompt, CLARIFY_SUFFIX);
                match self.request_breakdown(&retry_prompt).await? {
                    Ok(output) => Some(output),
                    Err(reason) => {
                        warn!(task_id = %task.id, %reason, "Breakdown invalid twice, using fallback subtask");
                        warnings.push(format!("second breakdown attempt invalid: {}", reason));
                        None
                    }
                }
            }
        };

        let Some(output) = output else {
            return Ok(Self::fallback_breakdown(task, warnings));
        };

        let subtasks = self.build_subtasks(output, &mut warnings).await;
        info!(task_id = %task.id, subtask_count = subtasks.len(), "Task planned");
        Ok(PlannedBreakdown {
            subtasks,
            fallback: false,
            warnings,
        })
    }

    fn build_prompt(&self, task: &Task, preferences: &Preferences) -> Result<String, LlmError> {
        let task_json = serde_json::json!({
            "heading": task.heading,
            "details": task.details,
            "deadline": task.deadline,
        });
        let context = BreakdownContext {
            task_json: task_json.to_string(),
            preferences_json: serde_json::to_string(preferences)?,
        };
        self.prompts
            .render("breakdown", &context)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    /// One LLM round trip. The outer Result is the call itself; the inner
    /// one is shape validation, which the caller may retry.
    async fn request_breakdown(&self, prompt: &str) -> Result<Result<BreakdownOutput, String>, LlmError> {
        let raw = self.llm.complete(CompletionRequest::new(prompt.to_string())).await?;
        Ok(Self::validate_breakdown(&raw))
    }

    fn validate_breakdown(raw: &str) -> Result<BreakdownOutput, String> {
        let output: BreakdownOutput = serde_json::from_str(extract_json(raw))
            .map_err(|e| format!("not a breakdown object: {}", e))?;

        if output.subtasks.len() < MIN_SUBTASKS {
            return Err(format!(
                "{} subtasks, need at least {}",
                output.subtasks.len(),
                MIN_SUBTASKS
            ));
        }
        if output.subtasks.iter().any(|s| s.heading.trim().is_empty()) {
            return Err("subtask with empty heading".to_string());
        }
        Ok(output)
    }

    async fn build_subtasks(&self, output: BreakdownOutput, warnings: &mut Vec<String>) -> Vec<Subtask> {
        let mut raw_subtasks = output.subtasks;
        if raw_subtasks.len() > MAX_SUBTASKS {
            warnings.push(format!(
                "breakdown produced {} subtasks, keeping the first {}",
                raw_subtasks.len(),
                MAX_SUBTASKS
            ));
            raw_subtasks.truncate(MAX_SUBTASKS);
        }

        let mut subtasks = Vec::with_capacity(raw_subtasks.len());
        for raw in raw_subtasks {
            let estimate = match raw.estimated_minutes {
                Some(est) if (MIN_ESTIMATE_MINUTES..=MAX_ESTIMATE_MINUTES).contains(&est) => est,
                Some(est) => {
                    let clamped = est.clamp(MIN_ESTIMATE_MINUTES, MAX_ESTIMATE_MINUTES);
                    warnings.push(format!(
                        "subtask '{}' estimate {}min clamped to {}min",
                        raw.heading, est, clamped
                    ));
                    clamped
                }
                None => MAX_ESTIMATE_MINUTES,
            };

            let mut subtask = Subtask::new(raw.heading.trim())
                .with_details(raw.details.trim())
                .with_estimate(estimate);

            // At most one resource per subtask; research is never critical
            let resources = self.research.find_resources(&subtask.heading, 1).await;
            if let Some(resource) = resources.into_iter().next() {
                debug!(subtask = %subtask.heading, url = %resource.url, "Attached research resource");
                subtask = subtask.with_resource(resource);
            }

            subtasks.push(subtask);
        }
        subtasks
    }

    /// Degraded plan: one full-session subtask mirroring the task
    fn fallback_breakdown(task: &Task, warnings: Vec<String>) -> PlannedBreakdown {
        let subtask = Subtask::new(task.heading.clone())
            .with_details(task.details.clone())
            .with_estimate(MAX_ESTIMATE_MINUTES);
        PlannedBreakdown {
            subtasks: vec![subtask],
            fallback: true,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Resource, ResourceKind};
    use crate::llm::client::mock::MockLlmClient;
    use crate::research::mock::MockResearchClient;

    fn valid_breakdown() -> &'static str {
        r#"{"subtasks": [
            {"heading": "Install Python and set up a project", "details": "Use python.org installer", "estimated_minutes": 20},
            {"heading": "Write a hello-world script", "details": "Run it from the terminal", "estimated_minutes": 15},
            {"heading": "Study basic syntax", "details": "Variables, loops, functions", "estimated_minutes": 30}
        ]}"#
    }

    fn planner(llm_responses: Vec<&str>, resources: Vec<Resource>) -> Planner {
        Planner::new(
            Arc::new(MockLlmClient::with_texts(llm_responses)),
            Arc::new(MockResearchClient::new(resources)),
            Arc::new(PromptLoader::embedded_only()),
        )
    }

    fn sample_resource() -> Resource {
        Resource {
            title: "Python tutorial".to_string(),
            url: "https://docs.python.org/3/tutorial/".to_string(),
            kind: ResourceKind::Docs,
            focus: "chapters 1-3".to_string(),
        }
    }

    #[tokio::test]
    async fn test_plan_produces_bounded_subtasks() {
        let planner = planner(vec![valid_breakdown()], vec![sample_resource()]);
        let task = Task::new("Learn Python");

        let plan = planner.plan(&task, &Preferences::default()).await.unwrap();

        assert!(!plan.fallback);
        assert!((MIN_SUBTASKS..=MAX_SUBTASKS).contains(&plan.subtasks.len()));
        for subtask in &plan.subtasks {
            let estimate = subtask.estimate_minutes.unwrap();
            assert!((MIN_ESTIMATE_MINUTES..=MAX_ESTIMATE_MINUTES).contains(&estimate));
            assert!(subtask.resource.is_some());
        }
    }

    #[tokio::test]
    async fn test_plan_retries_once_then_succeeds() {
        let planner = planner(vec!["not json at all", valid_breakdown()], vec![]);
        let task = Task::new("Learn Python");

        let plan = planner.plan(&task, &Preferences::default()).await.unwrap();

        assert!(!plan.fallback);
        assert_eq!(plan.subtasks.len(), 3);
        assert!(plan.warnings.iter().any(|w| w.contains("first breakdown attempt")));
    }

    #[tokio::test]
    async fn test_plan_falls_back_after_two_invalid() {
        let planner = planner(vec!["nope", "still nope"], vec![]);
        let task = Task::new("Learn Python").with_details("from scratch");

        let plan = planner.plan(&task, &Preferences::default()).await.unwrap();

        assert!(plan.fallback);
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.subtasks[0].heading, "Learn Python");
        assert_eq!(plan.subtasks[0].estimate_minutes, Some(MAX_ESTIMATE_MINUTES));
    }

    #[tokio::test]
    async fn test_plan_single_subtask_is_invalid_shape() {
        let single = r#"{"subtasks": [{"heading": "Do it all", "estimated_minutes": 25}]}"#;
        let planner = planner(vec![single, single], vec![]);
        let task = Task::new("Big thing");

        let plan = planner.plan(&task, &Preferences::default()).await.unwrap();
        assert!(plan.fallback);
    }

    #[tokio::test]
    async fn test_plan_truncates_excess_subtasks() {
        let many = r#"{"subtasks": [
            {"heading": "One", "estimated_minutes": 20},
            {"heading": "Two", "estimated_minutes": 20},
            {"heading": "Three", "estimated_minutes": 20},
            {"heading": "Four", "estimated_minutes": 20},
            {"heading": "Five", "estimated_minutes": 20},
            {"heading": "Six", "estimated_minutes": 20}
        ]}"#;
        let planner = planner(vec![many], vec![]);

        let plan = planner.plan(&Task::new("Big"), &Preferences::default()).await.unwrap();

        assert_eq!(plan.subtasks.len(), MAX_SUBTASKS);
        assert!(plan.warnings.iter().any(|w| w.contains("keeping the first")));
    }

    #[tokio::test]
    async fn test_plan_clamps_estimates() {
        let oversized = r#"{"subtasks": [
            {"heading": "Quick check", "estimated_minutes": 5},
            {"heading": "Long haul", "estimated_minutes": 120}
        ]}"#;
        let planner = planner(vec![oversized], vec![]);

        let plan = planner.plan(&Task::new("Sized"), &Preferences::default()).await.unwrap();

        assert_eq!(plan.subtasks[0].estimate_minutes, Some(MIN_ESTIMATE_MINUTES));
        assert_eq!(plan.subtasks[1].estimate_minutes, Some(MAX_ESTIMATE_MINUTES));
        assert_eq!(plan.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_plan_propagates_llm_error() {
        let planner = Planner::new(
            Arc::new(MockLlmClient::new(vec![Err(LlmError::Auth("denied".to_string()))])),
            Arc::new(MockResearchClient::empty()),
            Arc::new(PromptLoader::embedded_only()),
        );

        let result = planner.plan(&Task::new("Doomed"), &Preferences::default()).await;
        assert!(matches!(result, Err(LlmError::Auth(_))));
    }

    #[test]
    fn test_validate_breakdown_shapes() {
        assert!(Planner::validate_breakdown(valid_breakdown()).is_ok());
        assert!(Planner::validate_breakdown("{}").is_err());
        assert!(Planner::validate_breakdown(r#"{"subtasks": []}"#).is_err());
        assert!(Planner::validate_breakdown(
            r#"{"subtasks": [{"heading": ""}, {"heading": "ok"}]}"#
        )
        .is_err());
    }
}
