//! Slot scheduler - places a recommended subtask onto the calendar
//!
//! Finds the earliest free slot in the next two hours that fits the
//! subtask's estimate plus a trailing buffer, then creates or moves the
//! provider event. Placement is idempotent: a stored event id is reused,
//! and an orphaned event carrying this system's summary marker is adopted
//! instead of duplicated.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::calendar::{Availability, CalendarClient, CalendarError, EventDraft, EventPatch, Interval};
use crate::domain::Subtask;

/// How far ahead a slot may start
const PLACEMENT_WINDOW_MINUTES: i64 = 120;

/// Gap required after the subtask before the next busy block
const TRAILING_BUFFER_MINUTES: i64 = 5;

/// A calendar placement for one subtask
#[derive(Debug, Clone)]
pub struct Placement {
    pub event_id: String,
    pub window: Interval,
    /// True when an orphaned event was adopted instead of created
    pub adopted: bool,
}

/// Calendar placement for recommended subtasks
pub struct SlotScheduler {
    calendar: Arc<dyn CalendarClient>,
    summary_prefix: String,
}

impl SlotScheduler {
    pub fn new(calendar: Arc<dyn CalendarClient>, summary_prefix: impl Into<String>) -> Self {
        Self {
            calendar,
            summary_prefix: summary_prefix.into(),
        }
    }

    /// The marker summary for a subtask's event. Downstream cleanup relies
    /// on this exact prefix.
    pub fn event_summary(&self, subtask: &Subtask) -> String {
        format!("{}{}", self.summary_prefix, subtask.heading)
    }

    fn event_description(subtask: &Subtask) -> String {
        match &subtask.resource {
            Some(resource) => format!("{}\n\nResource: {}", subtask.details, resource.url),
            None => subtask.details.clone(),
        }
    }

    /// Earliest free slot within the placement window fitting the estimate
    /// plus the trailing buffer. The returned interval is the event window
    /// (without the buffer).
    fn find_slot(&self, subtask: &Subtask, availability: &Availability, now: DateTime<Utc>) -> Option<Interval> {
        let horizon = Interval::from_now(now, PLACEMENT_WINDOW_MINUTES);
        let needed = i64::from(subtask.effective_estimate()) + TRAILING_BUFFER_MINUTES;

        let mut slots: Vec<Interval> = availability
            .free
            .iter()
            .filter_map(|block| block.intersect(&horizon))
            .filter(|clipped| clipped.duration_minutes() >= needed)
            .collect();
        slots.sort_by_key(|s| s.start);

        slots.first().map(|slot| {
            Interval::new(
                slot.start,
                slot.start + Duration::minutes(i64::from(subtask.effective_estimate())),
            )
        })
    }

    /// Place a subtask into the calendar.
    ///
    /// Returns None when the subtask is not schedulable or no slot fits;
    /// the recommendation is then advisory-only. Write failures propagate.
    pub async fn place(
        &self,
        subtask: &Subtask,
        availability: &Availability,
        now: DateTime<Utc>,
    ) -> Result<Option<Placement>, CalendarError> {
        debug!(subtask = %subtask.heading, "place: called");

        // Oversized subtasks never reach the calendar
        if !subtask.is_schedulable() {
            debug!(subtask = %subtask.heading, "place: not schedulable, skipping");
            return Ok(None);
        }

        let Some(window) = self.find_slot(subtask, availability, now) else {
            debug!(subtask = %subtask.heading, "place: no slot in the placement window");
            return Ok(None);
        };

        let summary = self.event_summary(subtask);
        let description = Self::event_description(subtask);

        // Reuse the stored handle when one exists
        if let Some(event_id) = &subtask.event_id {
            debug!(%event_id, "place: moving existing event");
            let patch = EventPatch {
                summary: Some(summary.clone()),
                description: Some(description.clone()),
                start: Some(window.start),
                end: Some(window.end),
            };
            match self.calendar.update_event(event_id, patch).await {
                Ok(()) => {
                    return Ok(Some(Placement {
                        event_id: event_id.clone(),
                        window,
                        adopted: false,
                    }))
                }
                Err(CalendarError::NotFound(_)) => {
                    warn!(%event_id, "place: stored event vanished, creating a new one");
                }
                Err(e) => return Err(e),
            }
        }

        // Orphan adoption: an earlier run may have created the event but
        // failed to record the id
        if let Some(orphan) = self.find_orphan(&summary, now).await? {
            info!(event_id = %orphan.id, "place: adopting orphaned event");
            if orphan.start != window.start || orphan.end != window.end {
                let patch = EventPatch {
                    start: Some(window.start),
                    end: Some(window.end),
                    ..Default::default()
                };
                self.calendar.update_event(&orphan.id, patch).await?;
            }
            return Ok(Some(Placement {
                event_id: orphan.id,
                window,
                adopted: true,
            }));
        }

        let draft = EventDraft {
            summary,
            description,
            start: window.start,
            end: window.end,
        };
        let event_id = self.calendar.create_event(draft).await?;
        info!(%event_id, start = %window.start, "place: event created");
        Ok(Some(Placement {
            event_id,
            window,
            adopted: false,
        }))
    }

    /// Look for a marker-prefixed event with this exact summary in the
    /// placement window.
    async fn find_orphan(
        &self,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<crate::calendar::EventHandle>, CalendarError> {
        let horizon = Interval::from_now(now, PLACEMENT_WINDOW_MINUTES);
        let events = self.calendar.list_events(horizon).await?;
        Ok(events
            .into_iter()
            .find(|e| e.summary == summary && e.summary.starts_with(&self.summary_prefix)))
    }

    /// Remove a subtask's event, tolerating an already-deleted handle
    pub async fn release(&self, subtask: &Subtask) -> Result<(), CalendarError> {
        let Some(event_id) = &subtask.event_id else {
            return Ok(());
        };
        debug!(%event_id, subtask = %subtask.heading, "release: called");
        match self.calendar.delete_event(event_id).await {
            Ok(()) => Ok(()),
            Err(CalendarError::NotFound(_)) => {
                debug!(%event_id, "release: event already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::mock::MockCalendarClient;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 15, 9, 0, 0).unwrap()
    }

    fn open_availability(now: DateTime<Utc>) -> Availability {
        Availability::from_busy(Interval::from_now(now, 24 * 60), vec![])
    }

    fn scheduler(calendar: Arc<MockCalendarClient>) -> SlotScheduler {
        SlotScheduler::new(calendar, "[Genie] ")
    }

    #[tokio::test]
    async fn test_place_creates_event_at_earliest_slot() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar.clone());
        let subtask = Subtask::new("Install Python").with_estimate(25);

        let placement = scheduler
            .place(&subtask, &open_availability(now()), now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(placement.window.start, now());
        assert_eq!(placement.window.duration_minutes(), 25);
        assert!(!placement.adopted);

        let events = calendar.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "[Genie] Install Python");
    }

    #[tokio::test]
    async fn test_place_skips_busy_start() {
        let calendar = Arc::new(MockCalendarClient::new());
        // 09:00-09:30 is busy
        calendar
            .busy
            .lock()
            .unwrap()
            .push(Interval::from_now(now(), 30));
        let availability = calendar
            .free_busy(Interval::from_now(now(), 24 * 60), None)
            .await;
        let scheduler = scheduler(calendar);
        let subtask = Subtask::new("Read docs").with_estimate(20);

        let placement = scheduler.place(&subtask, &availability, now()).await.unwrap().unwrap();
        assert_eq!(placement.window.start, now() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_place_requires_buffer() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar);
        // Free block of exactly the estimate, no room for the buffer
        let range = Interval::from_now(now(), 24 * 60);
        let busy = vec![Interval::new(now() + Duration::minutes(25), range.end)];
        let availability = Availability::from_busy(range, busy);
        let subtask = Subtask::new("Tight fit").with_estimate(25);

        let placement = scheduler.place(&subtask, &availability, now()).await.unwrap();
        assert!(placement.is_none());
    }

    #[tokio::test]
    async fn test_place_ignores_slots_beyond_two_hours() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar);
        // Everything within the next 2h is busy; free only afterwards
        let range = Interval::from_now(now(), 24 * 60);
        let busy = vec![Interval::from_now(now(), 120)];
        let availability = Availability::from_busy(range, busy);
        let subtask = Subtask::new("Later work").with_estimate(20);

        let placement = scheduler.place(&subtask, &availability, now()).await.unwrap();
        assert!(placement.is_none());
    }

    #[tokio::test]
    async fn test_place_oversized_subtask_never_creates_event() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar.clone());
        let subtask = Subtask::new("Giant step").with_estimate(45);

        let placement = scheduler
            .place(&subtask, &open_availability(now()), now())
            .await
            .unwrap();

        assert!(placement.is_none());
        assert_eq!(calendar.event_count(), 0);
    }

    #[tokio::test]
    async fn test_place_reuses_stored_event_id() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar.clone());
        let mut subtask = Subtask::new("Move me").with_estimate(20);

        let first = scheduler
            .place(&subtask, &open_availability(now()), now())
            .await
            .unwrap()
            .unwrap();
        subtask.set_event_id(Some(first.event_id.clone()));

        // Second placement must not create a duplicate
        let second = scheduler
            .place(&subtask, &open_availability(now()), now())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.event_id, first.event_id);
        assert_eq!(calendar.event_count(), 1);
    }

    #[tokio::test]
    async fn test_place_adopts_orphaned_event() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar.clone());
        let subtask = Subtask::new("Orphan work").with_estimate(20);

        // First placement created the event but the id was never stored
        scheduler
            .place(&subtask, &open_availability(now()), now())
            .await
            .unwrap()
            .unwrap();

        let placement = scheduler
            .place(&subtask, &open_availability(now()), now())
            .await
            .unwrap()
            .unwrap();

        assert!(placement.adopted);
        assert_eq!(calendar.event_count(), 1);
    }

    #[tokio::test]
    async fn test_place_propagates_write_failure() {
        let calendar = Arc::new(MockCalendarClient::new());
        calendar.set_fail_writes(true);
        let scheduler = scheduler(calendar);
        let subtask = Subtask::new("Doomed").with_estimate(20);

        let result = scheduler.place(&subtask, &open_availability(now()), now()).await;
        assert!(matches!(result, Err(CalendarError::Api { .. })));
    }

    #[tokio::test]
    async fn test_release_deletes_event() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar.clone());
        let mut subtask = Subtask::new("Removable").with_estimate(20);

        let placement = scheduler
            .place(&subtask, &open_availability(now()), now())
            .await
            .unwrap()
            .unwrap();
        subtask.set_event_id(Some(placement.event_id));

        scheduler.release(&subtask).await.unwrap();
        assert_eq!(calendar.event_count(), 0);

        // Releasing again is a no-op
        scheduler.release(&subtask).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_without_event_is_noop() {
        let calendar = Arc::new(MockCalendarClient::new());
        let scheduler = scheduler(calendar);
        let subtask = Subtask::new("Never scheduled");
        scheduler.release(&subtask).await.unwrap();
    }

    #[test]
    fn test_event_description_includes_resource() {
        let resource = crate::domain::Resource {
            title: "Guide".to_string(),
            url: "https://example.com/guide".to_string(),
            kind: crate::domain::ResourceKind::Article,
            focus: "intro".to_string(),
        };
        let subtask = Subtask::new("Read guide")
            .with_details("Skim the introduction")
            .with_resource(resource);

        let description = SlotScheduler::event_description(&subtask);
        assert_eq!(description, "Skim the introduction\n\nResource: https://example.com/guide");
    }
}
