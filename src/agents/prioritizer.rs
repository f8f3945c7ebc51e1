//! Prioritizer - picks the single best next subtask
//!
//! Deterministic scoring over all pending subtasks. The ordering rules, in
//! precedence order: hard feasibility filter, deadline pressure within 24h,
//! energy match against the peak window, sibling prerequisite order, task
//! age tie-break.

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::debug;

use crate::calendar::Availability;
use crate::domain::{Preferences, PsychologicalFit, Recommendation, Subtask, Task};

/// How many pending subtasks per task are considered
const VISIBLE_SUBTASKS: usize = 5;

/// Heading verbs indicating deep, focused work
const DEEP_VERBS: &[&str] = &["design", "analyze", "implement", "study", "write"];

/// Heading verbs indicating shallow, administrative work
const SHALLOW_VERBS: &[&str] = &["set up", "review", "list", "email"];

/// Heuristic work-depth classification by heading verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkDepth {
    Deep,
    Shallow,
    Neutral,
}

/// Classify a subtask heading as deep or shallow work
pub fn classify_depth(heading: &str) -> WorkDepth {
    let lower = heading.to_lowercase();
    if DEEP_VERBS.iter().any(|v| lower.contains(v)) {
        WorkDepth::Deep
    } else if SHALLOW_VERBS.iter().any(|v| lower.contains(v)) {
        WorkDepth::Shallow
    } else {
        WorkDepth::Neutral
    }
}

struct Candidate<'a> {
    task: &'a Task,
    subtask: &'a Subtask,
    sibling_index: usize,
    /// 0 when the parent deadline is within 24h, 1 otherwise
    deadline_group: u8,
    /// Parent deadline, ordering candidates inside the pressure group only
    deadline_key: DateTime<Utc>,
    /// 0 = energy-matched, 1 = neutral, 2 = mismatched
    energy_rank: u8,
    fit: PsychologicalFit,
}

/// Compute the single recommendation for the user's current state.
///
/// `availability` must cover the next 24 hours from `now`.
pub fn recommend(
    tasks: &[Task],
    preferences: &Preferences,
    availability: &Availability,
    now: DateTime<Utc>,
) -> Recommendation {
    let largest_free = availability
        .largest_free_block()
        .map(|block| block.duration_minutes())
        .unwrap_or(0);
    let in_peak = preferences.peak_energy.contains_hour(now.hour());
    debug!(largest_free, in_peak, task_count = tasks.len(), "recommend: called");

    let mut candidates: Vec<Candidate> = Vec::new();
    for task in tasks {
        if task.is_terminal() {
            continue;
        }
        for (sibling_index, subtask) in task.pending_subtasks().take(VISIBLE_SUBTASKS) {
            // Hard filter: schedulable size and room in the next 24h
            if !subtask.is_schedulable() {
                debug!(subtask = %subtask.heading, "recommend: skipped, exceeds schedulable bound");
                continue;
            }
            if i64::from(subtask.effective_estimate()) > largest_free {
                debug!(subtask = %subtask.heading, "recommend: skipped, no free block fits");
                continue;
            }

            let depth = classify_depth(&subtask.heading);
            let (energy_rank, fit) = match (depth, in_peak) {
                (WorkDepth::Deep, true) => (0, PsychologicalFit::Peak),
                (WorkDepth::Shallow, false) => (0, PsychologicalFit::Aligned),
                (WorkDepth::Neutral, _) => (1, PsychologicalFit::Acceptable),
                _ => (2, PsychologicalFit::Mismatch),
            };

            let within_24h = task
                .deadline
                .map(|d| d <= now + Duration::hours(24))
                .unwrap_or(false);

            candidates.push(Candidate {
                task,
                subtask,
                sibling_index,
                deadline_group: if within_24h { 0 } else { 1 },
                deadline_key: if within_24h {
                    task.deadline.unwrap_or(DateTime::<Utc>::MAX_UTC)
                } else {
                    DateTime::<Utc>::MAX_UTC
                },
                energy_rank,
                fit,
            });
        }
    }

    if candidates.is_empty() {
        debug!("recommend: no candidate passed the hard filter");
        return Recommendation::none();
    }

    candidates.sort_by(|a, b| {
        a.deadline_group
            .cmp(&b.deadline_group)
            .then(a.deadline_key.cmp(&b.deadline_key))
            .then(a.energy_rank.cmp(&b.energy_rank))
            // Sibling order only applies within one task; across tasks the
            // tie-break is task age
            .then_with(|| {
                if a.task.id == b.task.id {
                    a.sibling_index.cmp(&b.sibling_index)
                } else {
                    a.task.created_at.cmp(&b.task.created_at)
                }
            })
    });

    let winner = &candidates[0];
    let reasoning = build_reasoning(winner, &candidates);
    debug!(subtask = %winner.subtask.heading, %reasoning, "recommend: winner selected");

    Recommendation {
        task_id: Some(winner.task.id),
        subtask_id: Some(winner.subtask.id),
        reasoning,
        psychological_fit: winner.fit,
        scheduled: None,
    }
}

/// Short explanation referencing the rule that decided against the
/// runner-up (or the strongest property of a lone candidate).
fn build_reasoning(winner: &Candidate, candidates: &[Candidate]) -> String {
    if winner.deadline_group == 0 {
        return format!(
            "deadline pressure: '{}' is due {}, within the next 24h",
            winner.task.heading,
            winner.deadline_key.format("%Y-%m-%d %H:%M UTC")
        );
    }

    let runner_up = candidates.get(1);

    if let Some(other) = runner_up {
        if winner.energy_rank < other.energy_rank {
            return match winner.fit {
                PsychologicalFit::Peak => format!(
                    "energy match: peak window favors deep work like '{}'",
                    winner.subtask.heading
                ),
                PsychologicalFit::Aligned => format!(
                    "energy match: outside peak hours, shallow work like '{}' fits best",
                    winner.subtask.heading
                ),
                _ => format!(
                    "energy match: '{}' fits the current hour best",
                    winner.subtask.heading
                ),
            };
        }
        if other.task.id == winner.task.id && winner.sibling_index < other.sibling_index {
            return format!(
                "dependency order: '{}' is the earliest prerequisite of '{}'",
                winner.subtask.heading, winner.task.heading
            );
        }
        return format!(
            "oldest open task first: '{}' from '{}'",
            winner.subtask.heading, winner.task.heading
        );
    }

    format!(
        "next available work: '{}' from '{}'",
        winner.subtask.heading, winner.task.heading
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Interval;
    use crate::domain::EnergyWindow;
    use chrono::TimeZone;

    fn morning() -> DateTime<Utc> {
        // 09:00, inside the default morning peak window
        Utc.with_ymd_and_hms(2025, 9, 15, 9, 0, 0).unwrap()
    }

    fn evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 15, 20, 0, 0).unwrap()
    }

    fn open_availability(now: DateTime<Utc>) -> Availability {
        Availability::from_busy(Interval::from_now(now, 24 * 60), vec![])
    }

    fn task_with_subtasks(heading: &str, subtask_headings: &[&str]) -> Task {
        let mut task = Task::new(heading);
        for sh in subtask_headings {
            task.add_subtask(Subtask::new(*sh).with_estimate(25));
        }
        task
    }

    // === Hard filter ===

    #[test]
    fn test_no_tasks_yields_none() {
        let rec = recommend(&[], &Preferences::default(), &open_availability(morning()), morning());
        assert!(!rec.has_target());
        assert_eq!(rec.reasoning, "no fitting work in window");
    }

    #[test]
    fn test_oversized_subtask_filtered() {
        let mut task = Task::new("Big");
        task.add_subtask(Subtask::new("Enormous step").with_estimate(45));

        let rec = recommend(
            &[task],
            &Preferences::default(),
            &open_availability(morning()),
            morning(),
        );
        assert!(!rec.has_target());
    }

    #[test]
    fn test_no_free_block_filters_everything() {
        let now = morning();
        let range = Interval::from_now(now, 24 * 60);
        // Whole window busy
        let availability = Availability::from_busy(range, vec![range]);

        let task = task_with_subtasks("Busy day", &["Any step"]);
        let rec = recommend(&[task], &Preferences::default(), &availability, now);
        assert!(!rec.has_target());
    }

    #[test]
    fn test_small_free_block_filters_larger_estimates() {
        let now = morning();
        let range = Interval::from_now(now, 24 * 60);
        // Only a 20-minute hole is free
        let busy = vec![Interval::new(now + Duration::minutes(20), range.end)];
        let availability = Availability::from_busy(range, busy);

        let mut task = Task::new("Tight");
        task.add_subtask(Subtask::new("Long step").with_estimate(25));
        task.add_subtask(Subtask::new("Short step").with_estimate(15));

        let rec = recommend(&[task.clone()], &Preferences::default(), &availability, now);
        assert_eq!(rec.subtask_id, Some(task.subtasks[1].id));
    }

    // === Deadline pressure ===

    #[test]
    fn test_deadline_within_24h_wins() {
        let now = morning();
        let mut urgent = task_with_subtasks("Urgent", &["Any urgent step"]);
        urgent.deadline = Some(now + Duration::hours(10));
        let relaxed = task_with_subtasks("Relaxed", &["Write a design doc"]);

        let rec = recommend(
            &[relaxed, urgent.clone()],
            &Preferences::default(),
            &open_availability(now),
            now,
        );

        assert_eq!(rec.task_id, Some(urgent.id));
        assert!(rec.reasoning.contains("deadline pressure"));
    }

    #[test]
    fn test_earliest_deadline_first_within_group() {
        let now = morning();
        let mut later = task_with_subtasks("Later", &["Step L"]);
        later.deadline = Some(now + Duration::hours(20));
        let mut sooner = task_with_subtasks("Sooner", &["Step S"]);
        sooner.deadline = Some(now + Duration::hours(5));

        let rec = recommend(
            &[later, sooner.clone()],
            &Preferences::default(),
            &open_availability(now),
            now,
        );
        assert_eq!(rec.task_id, Some(sooner.id));
    }

    // === Energy match ===

    #[test]
    fn test_deep_work_preferred_in_peak() {
        let now = morning();
        let shallow = task_with_subtasks("Admin", &["Review inbox"]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let deep = task_with_subtasks("Craft", &["Design the schema"]);

        let rec = recommend(
            &[shallow, deep.clone()],
            &Preferences::default(),
            &open_availability(now),
            now,
        );

        assert_eq!(rec.task_id, Some(deep.id));
        assert_eq!(rec.psychological_fit, PsychologicalFit::Peak);
    }

    #[test]
    fn test_shallow_work_preferred_outside_peak() {
        let now = evening();
        let deep = task_with_subtasks("Craft", &["Design the schema"]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let shallow = task_with_subtasks("Admin", &["Review inbox"]);

        let rec = recommend(
            &[deep, shallow.clone()],
            &Preferences::default(),
            &open_availability(now),
            now,
        );

        assert_eq!(rec.task_id, Some(shallow.id));
        assert_eq!(rec.psychological_fit, PsychologicalFit::Aligned);
    }

    #[test]
    fn test_peak_window_follows_preferences() {
        let now = evening();
        let prefs = Preferences {
            peak_energy: EnergyWindow::Evening,
            ..Default::default()
        };
        let deep = task_with_subtasks("Craft", &["Write the essay"]);

        let rec = recommend(&[deep], &prefs, &open_availability(now), now);
        assert_eq!(rec.psychological_fit, PsychologicalFit::Peak);
    }

    // === Dependency order and tie-break ===

    #[test]
    fn test_earlier_sibling_outranks_later() {
        let now = morning();
        let task = task_with_subtasks("Sequence", &["Install the toolchain", "Install more tools"]);

        let rec = recommend(&[task.clone()], &Preferences::default(), &open_availability(now), now);

        assert_eq!(rec.subtask_id, Some(task.subtasks[0].id));
        assert!(
            rec.reasoning.contains("dependency order") || rec.reasoning.contains("earliest prerequisite"),
            "reasoning was: {}",
            rec.reasoning
        );
    }

    #[test]
    fn test_done_siblings_do_not_block_order() {
        let now = morning();
        let mut task = task_with_subtasks("Sequence", &["First step", "Second step", "Third step"]);
        let first = task.subtasks[0].id;
        task.subtask_mut(first).unwrap().set_status(crate::domain::TaskStatus::Done);

        let rec = recommend(&[task.clone()], &Preferences::default(), &open_availability(now), now);
        assert_eq!(rec.subtask_id, Some(task.subtasks[1].id));
    }

    #[test]
    fn test_older_task_wins_tie() {
        let now = morning();
        let older = task_with_subtasks("Older", &["Neutral step A"]);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = task_with_subtasks("Newer", &["Neutral step B"]);

        let rec = recommend(
            &[newer, older.clone()],
            &Preferences::default(),
            &open_availability(now),
            now,
        );
        assert_eq!(rec.task_id, Some(older.id));
    }

    #[test]
    fn test_only_first_five_pending_considered() {
        let now = morning();
        let mut task = Task::new("Many");
        for i in 0..7 {
            // Later subtasks carry an urgent-looking deep verb; they still
            // must not be considered past the visibility window
            let heading = if i >= 5 { format!("Design step {}", i) } else { format!("Step {}", i) };
            task.add_subtask(Subtask::new(heading).with_estimate(20));
        }

        let rec = recommend(&[task.clone()], &Preferences::default(), &open_availability(now), now);
        assert_eq!(rec.subtask_id, Some(task.subtasks[0].id));
    }

    // === Degraded calendar ===

    #[test]
    fn test_disconnected_calendar_still_recommends() {
        let now = morning();
        let availability = Availability::assume_free(Interval::from_now(now, 24 * 60));
        let task = task_with_subtasks("Offline", &["Write notes"]);

        let rec = recommend(&[task], &Preferences::default(), &availability, now);
        assert!(rec.has_target());
        assert_eq!(rec.psychological_fit, PsychologicalFit::Peak);
    }

    // === Depth classifier ===

    #[test]
    fn test_classify_depth() {
        assert_eq!(classify_depth("Design the API"), WorkDepth::Deep);
        assert_eq!(classify_depth("Write blog post"), WorkDepth::Deep);
        assert_eq!(classify_depth("Analyze benchmark data"), WorkDepth::Deep);
        assert_eq!(classify_depth("Set up the repo"), WorkDepth::Shallow);
        assert_eq!(classify_depth("Email the team"), WorkDepth::Shallow);
        assert_eq!(classify_depth("Review the PR"), WorkDepth::Shallow);
        assert_eq!(classify_depth("Buy groceries"), WorkDepth::Neutral);
    }
}
