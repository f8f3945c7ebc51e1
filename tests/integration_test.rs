//! Integration tests for the Genie pipeline
//!
//! End-to-end scenarios over scripted LLM, research and calendar doubles:
//! add-plan-recommend-schedule, cascade completion, reschedule
//! invalidation, LLM fallback, offline calendar, and same-user concurrency.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use genied::calendar::{Availability, CalendarClient, CalendarError, EventDraft, EventHandle, EventPatch, Interval};
use genied::domain::{Resource, ResourceKind, Subtask, Task, TaskStatus};
use genied::llm::{CompletionRequest, LlmClient, LlmError};
use genied::pipeline::{Pipeline, PipelineOptions};
use genied::prompts::PromptLoader;
use genied::research::ResearchClient;
use genied::store::{StoreManager, SystemSettings};

// =============================================================================
// Test doubles
// =============================================================================

/// LLM double routing on prompt content, safe for concurrent calls
struct RouterLlm {
    #[allow(clippy::type_complexity)]
    route: Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>,
}

impl RouterLlm {
    fn new(route: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static) -> Self {
        Self { route: Box::new(route) }
    }
}

#[async_trait]
impl LlmClient for RouterLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        (self.route)(&request.prompt)
    }
}

fn is_extraction_prompt(prompt: &str) -> bool {
    prompt.contains("compiling a user's natural-language input")
}

fn is_breakdown_prompt(prompt: &str) -> bool {
    prompt.contains("breaking a task into small executable subtasks")
}

/// Research double returning one fixed resource
struct FixedResearch;

#[async_trait]
impl ResearchClient for FixedResearch {
    async fn find_resources(&self, _query: &str, max_results: usize) -> Vec<Resource> {
        vec![Resource {
            title: "Official tutorial".to_string(),
            url: "https://example.com/tutorial".to_string(),
            kind: ResourceKind::Tutorial,
            focus: "first chapter".to_string(),
        }]
        .into_iter()
        .take(max_results)
        .collect()
    }
}

/// In-memory calendar double
struct TestCalendar {
    busy: Mutex<Vec<Interval>>,
    events: Mutex<Vec<EventHandle>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
    counter: AtomicUsize,
}

impl TestCalendar {
    fn new() -> Self {
        Self {
            busy: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
            counter: AtomicUsize::new(0),
        }
    }

    fn events(&self) -> Vec<EventHandle> {
        self.events.lock().unwrap().clone()
    }

    fn seed_event(&self, id: &str, summary: &str, start: chrono::DateTime<Utc>, minutes: i64) {
        self.events.lock().unwrap().push(EventHandle {
            id: id.to_string(),
            summary: summary.to_string(),
            start,
            end: start + chrono::Duration::minutes(minutes),
        });
    }
}

#[async_trait]
impl CalendarClient for TestCalendar {
    async fn free_busy(&self, range: Interval, _calendars: Option<&[String]>) -> Availability {
        if !self.connected.load(Ordering::SeqCst) {
            return Availability::assume_free(range);
        }
        Availability::from_busy(range, self.busy.lock().unwrap().clone())
    }

    async fn create_event(&self, draft: EventDraft) -> Result<String, CalendarError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CalendarError::Api {
                status: 503,
                message: "offline".to_string(),
            });
        }
        let id = format!("evt-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.events.lock().unwrap().push(EventHandle {
            id: id.clone(),
            summary: draft.summary,
            start: draft.start,
            end: draft.end,
        });
        Ok(id)
    }

    async fn update_event(&self, event_id: &str, patch: EventPatch) -> Result<(), CalendarError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CalendarError::Api {
                status: 503,
                message: "offline".to_string(),
            });
        }
        let mut events = self.events.lock().unwrap();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| CalendarError::NotFound(event_id.to_string()))?;
        if let Some(summary) = patch.summary {
            event.summary = summary;
        }
        if let Some(start) = patch.start {
            event.start = start;
        }
        if let Some(end) = patch.end {
            event.end = end;
        }
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CalendarError::Api {
                status: 503,
                message: "offline".to_string(),
            });
        }
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.id != event_id);
        if events.len() == before {
            return Err(CalendarError::NotFound(event_id.to_string()));
        }
        Ok(())
    }

    async fn list_events(&self, range: Interval) -> Result<Vec<EventHandle>, CalendarError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| Interval::new(e.start, e.end).overlaps(&range))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    pipeline: Pipeline,
    store: StoreManager,
    calendar: Arc<TestCalendar>,
    _temp: TempDir,
}

fn harness(llm: RouterLlm) -> Harness {
    let temp = TempDir::new().expect("temp dir");
    let store = StoreManager::spawn(
        temp.path().join("progress.json"),
        temp.path().join("backups"),
        SystemSettings::default(),
    )
    .expect("store");
    let calendar = Arc::new(TestCalendar::new());

    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(llm),
        Arc::new(FixedResearch),
        calendar.clone(),
        Arc::new(PromptLoader::embedded_only()),
        PipelineOptions::default(),
    );

    Harness {
        pipeline,
        store,
        calendar,
        _temp: temp,
    }
}

const BREAKDOWN_PYTHON: &str = r#"{"subtasks": [
    {"heading": "Study the Python installation guide", "details": "Skim the official docs", "estimated_minutes": 20},
    {"heading": "Write your first script", "details": "Hello world from the terminal", "estimated_minutes": 25},
    {"heading": "Implement a small exercise", "details": "FizzBuzz or similar", "estimated_minutes": 30}
]}"#;

// =============================================================================
// S1: add + plan + recommend + schedule
// =============================================================================

#[tokio::test]
async fn s1_add_plan_recommend_schedule() {
    let h = harness(RouterLlm::new(|prompt| {
        if is_extraction_prompt(prompt) {
            Ok(r#"[{"action": "add", "heading": "Learn Python", "deadline": "2025-09-30T00:00:00Z"}]"#.to_string())
        } else if is_breakdown_prompt(prompt) {
            Ok(BREAKDOWN_PYTHON.to_string())
        } else {
            Err(LlmError::InvalidResponse("unexpected prompt".to_string()))
        }
    }));

    let before = Utc::now();
    let outcome = h
        .pipeline
        .handle_utterance("alice", "Learn Python by 2025-09-30")
        .await
        .unwrap();

    // One successful add
    assert_eq!(outcome.applied.len(), 1);
    assert!(outcome.applied[0].ok);
    assert_eq!(outcome.applied[0].kind, "add");

    // Task with deadline and 2-5 bounded subtasks
    let tasks = h.store.list_tasks("alice", None).await.unwrap();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert!(task.heading.contains("Python"));
    assert_eq!(
        task.deadline.map(|d| d.format("%Y-%m-%d").to_string()),
        Some("2025-09-30".to_string())
    );
    assert!((2..=5).contains(&task.subtasks.len()));
    for subtask in &task.subtasks {
        assert!(subtask.estimate_minutes.unwrap() <= 30);
        assert!(subtask.resource.is_some());
    }

    // The first subtask wins on dependency order
    let rec = outcome.recommendation.expect("recommendation");
    assert_eq!(rec.subtask_id, Some(task.subtasks[0].id));
    assert!(
        rec.reasoning.contains("dependency order") || rec.reasoning.contains("earliest prerequisite"),
        "reasoning was: {}",
        rec.reasoning
    );

    // An event with the marker prefix was created at the earliest slot
    let events = h.calendar.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].summary.starts_with("[Genie] "));
    assert!(events[0].start >= before);
    assert!(events[0].start < before + chrono::Duration::minutes(1));
    assert!(rec.scheduled.is_some());

    // The store remembers the event handle
    let stored = h.store.get_task("alice", task.id).await.unwrap();
    assert_eq!(stored.subtasks[0].event_id.as_deref(), Some(events[0].id.as_str()));
}

// =============================================================================
// S2: mark done cascades
// =============================================================================

#[tokio::test]
async fn s2_mark_done_cascades() {
    let h = harness(RouterLlm::new(|prompt| {
        if is_extraction_prompt(prompt) {
            Ok(r#"[{"action": "mark_done", "target": "last_task"}]"#.to_string())
        } else {
            Err(LlmError::InvalidResponse("unexpected prompt".to_string()))
        }
    }));

    let mut task = Task::new("The whole thing");
    task.add_subtask(Subtask::new("s1").with_estimate(20));
    let mut s2 = Subtask::new("s2").with_estimate(20);
    s2.set_status(TaskStatus::InProgress);
    task.add_subtask(s2);
    let mut s3 = Subtask::new("s3").with_estimate(20);
    s3.set_status(TaskStatus::Done);
    task.add_subtask(s3);
    let task_id = task.id;
    h.store.add_task("carol", task).await.unwrap();

    let outcome = h
        .pipeline
        .handle_utterance("carol", "I finished the whole thing")
        .await
        .unwrap();
    assert!(outcome.applied[0].ok);

    let done = h.store.get_task("carol", task_id).await.unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    assert_eq!(done.subtasks[0].status, TaskStatus::Done);
    assert_eq!(done.subtasks[1].status, TaskStatus::Done);
    assert_eq!(done.subtasks[2].status, TaskStatus::Done);
}

// =============================================================================
// S3: reschedule invalidates the calendar placement
// =============================================================================

#[tokio::test]
async fn s3_reschedule_invalidates_event() {
    let h = harness(RouterLlm::new(|prompt| {
        if is_extraction_prompt(prompt) {
            Ok(r#"[{"action": "reschedule", "target": "last_task", "deadline": "2030-06-07T00:00:00Z"}]"#.to_string())
        } else {
            Err(LlmError::InvalidResponse("unexpected prompt".to_string()))
        }
    }));

    // A task whose subtask is already scheduled as event E
    let mut task = Task::new("Move me");
    task.add_subtask(Subtask::new("Scheduled step").with_estimate(20));
    let task_id = task.id;
    let subtask_id = task.subtasks[0].id;
    h.store.add_task("dave", task).await.unwrap();
    h.calendar
        .seed_event("E", "[Genie] Scheduled step", Utc::now() + chrono::Duration::minutes(10), 20);
    h.store
        .set_subtask_event("dave", task_id, subtask_id, Some("E".to_string()))
        .await
        .unwrap();

    let outcome = h
        .pipeline
        .handle_utterance("dave", "move it to next Friday")
        .await
        .unwrap();
    assert!(outcome.applied[0].ok, "{:?}", outcome.applied);

    // Deadline moved
    let updated = h.store.get_task("dave", task_id).await.unwrap();
    assert_eq!(
        updated.deadline.map(|d| d.format("%Y-%m-%d").to_string()),
        Some("2030-06-07".to_string())
    );

    // Old event E is gone; the still-fitting subtask got a fresh placement
    let events = h.calendar.events();
    assert!(!events.iter().any(|e| e.id == "E"), "old event must be deleted");
    assert_eq!(events.len(), 1);

    let stored = h.store.get_task("dave", task_id).await.unwrap();
    let new_event = stored.subtasks[0].event_id.clone().expect("new event id");
    assert_ne!(new_event, "E");
}

// =============================================================================
// S4: LLM invalid output fallback
// =============================================================================

#[tokio::test]
async fn s4_invalid_llm_output_falls_back() {
    // Extraction returns prose; planning fails with an exhausted-retries error
    let h = harness(RouterLlm::new(|prompt| {
        if is_extraction_prompt(prompt) {
            Ok("I'm sorry, I can't produce JSON today.".to_string())
        } else {
            Err(LlmError::Api {
                status: 500,
                message: "exhausted".to_string(),
            })
        }
    }));

    let outcome = h
        .pipeline
        .handle_utterance("erin", "write blog post about caching")
        .await
        .unwrap();

    // Exactly one add, committed, carrying the raw utterance
    assert_eq!(outcome.applied.len(), 1);
    assert!(outcome.applied[0].ok);
    assert_eq!(outcome.applied[0].kind, "add");

    let tasks = h.store.list_tasks("erin", None).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].heading, "write blog post about caching");
    assert_eq!(tasks[0].details, "write blog post about caching");

    // Planner also failed: zero subtasks, flagged for planning
    assert!(tasks[0].subtasks.is_empty());
    assert!(tasks[0].needs_planning);
}

// =============================================================================
// S5: calendar offline
// =============================================================================

#[tokio::test]
async fn s5_calendar_offline_recommends_unscheduled() {
    let h = harness(RouterLlm::new(|prompt| {
        if is_extraction_prompt(prompt) {
            Ok(r#"[{"action": "query_next"}]"#.to_string())
        } else {
            Err(LlmError::InvalidResponse("unexpected prompt".to_string()))
        }
    }));
    h.calendar.connected.store(false, Ordering::SeqCst);
    h.calendar.fail_writes.store(true, Ordering::SeqCst);

    let mut task = Task::new("Offline work");
    task.add_subtask(Subtask::new("Write the summary").with_estimate(20));
    h.store.add_task("frank", task).await.unwrap();

    let outcome = h.pipeline.handle_utterance("frank", "what should I do").await.unwrap();

    // Recommendation exists despite the dead calendar, unscheduled
    let rec = outcome.recommendation.expect("recommendation");
    assert!(rec.has_target());
    assert!(rec.scheduled.is_none());
    assert!(outcome.warnings.iter().any(|w| w.contains("calendar placement failed")));
    assert_eq!(h.calendar.events().len(), 0);
}

// =============================================================================
// S6: concurrent utterances for the same user
// =============================================================================

#[tokio::test]
async fn s6_concurrent_utterances_same_user() {
    let h = Arc::new(harness(RouterLlm::new(|prompt| {
        if is_extraction_prompt(prompt) {
            if prompt.contains("add task A") {
                Ok(r#"[{"action": "add", "heading": "Task A"}]"#.to_string())
            } else if prompt.contains("add task B") {
                Ok(r#"[{"action": "add", "heading": "Task B"}]"#.to_string())
            } else {
                Err(LlmError::InvalidResponse("unknown utterance".to_string()))
            }
        } else if is_breakdown_prompt(prompt) {
            Ok(r#"{"subtasks": [
                {"heading": "First half", "estimated_minutes": 20},
                {"heading": "Second half", "estimated_minutes": 20}
            ]}"#
            .to_string())
        } else {
            Err(LlmError::InvalidResponse("unexpected prompt".to_string()))
        }
    })));

    let h1 = h.clone();
    let h2 = h.clone();
    let (a, b) = tokio::join!(
        async move { h1.pipeline.handle_utterance("bob", "add task A").await },
        async move { h2.pipeline.handle_utterance("bob", "add task B").await },
    );

    // No lost write, no version conflict
    assert!(a.is_ok(), "{:?}", a.err());
    assert!(b.is_ok(), "{:?}", b.err());

    let tasks = h.store.list_tasks("bob", None).await.unwrap();
    assert_eq!(tasks.len(), 2);
    let headings: Vec<&str> = tasks.iter().map(|t| t.heading.as_str()).collect();
    assert!(headings.contains(&"Task A"));
    assert!(headings.contains(&"Task B"));

    // Commit order is strict: creation timestamps differ
    assert_ne!(tasks[0].created_at, tasks[1].created_at);
}

// =============================================================================
// Scheduler idempotence across repeated recommendations
// =============================================================================

#[tokio::test]
async fn repeated_recommendations_create_one_event() {
    let h = harness(RouterLlm::new(|prompt| {
        if is_extraction_prompt(prompt) {
            Ok(r#"[{"action": "add", "heading": "Learn Python"}]"#.to_string())
        } else if is_breakdown_prompt(prompt) {
            Ok(BREAKDOWN_PYTHON.to_string())
        } else {
            Err(LlmError::InvalidResponse("unexpected prompt".to_string()))
        }
    }));

    h.pipeline.handle_utterance("gail", "Learn Python").await.unwrap();
    assert_eq!(h.calendar.events().len(), 1);

    // Asking again must reuse the stored handle, not duplicate the event
    let rec = h.pipeline.recommendation("gail").await.unwrap();
    assert!(rec.has_target());
    assert_eq!(h.calendar.events().len(), 1);

    let marked: Vec<EventHandle> = h
        .calendar
        .events()
        .into_iter()
        .filter(|e| e.summary.starts_with("[Genie] "))
        .collect();
    assert_eq!(marked.len(), 1);
}

// =============================================================================
// Timeout: partial result carries the flag
// =============================================================================

#[tokio::test]
async fn overall_deadline_returns_partial_result() {
    let temp = TempDir::new().unwrap();
    let store = StoreManager::spawn(
        temp.path().join("progress.json"),
        temp.path().join("backups"),
        SystemSettings::default(),
    )
    .unwrap();
    let calendar = Arc::new(TestCalendar::new());

    // An extraction slower than the overall deadline
    struct SlowLlm;
    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("[]".to_string())
        }
    }

    let pipeline = Pipeline::new(
        store,
        Arc::new(SlowLlm),
        Arc::new(FixedResearch),
        calendar,
        Arc::new(PromptLoader::embedded_only()),
        PipelineOptions {
            overall_deadline: Duration::from_millis(50),
            summary_prefix: "[Genie] ".to_string(),
        },
    );

    let outcome = pipeline.handle_utterance("henry", "anything").await.unwrap();
    assert!(outcome.timed_out);
    assert!(outcome.recommendation.is_none());
    assert!(outcome.applied.is_empty());
}
