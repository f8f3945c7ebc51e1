//! Google Calendar REST client
//!
//! Talks to the Calendar v3 API with a bearer token read from the OAuth
//! token cache. The interactive OAuth bootstrap that produces the token
//! file lives outside the core.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::CalendarConfig;

use super::{Availability, CalendarClient, CalendarError, EventDraft, EventHandle, EventPatch, Interval};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar v3 client
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    token_path: PathBuf,
    calendar_id: String,
    base_url: String,
}

impl GoogleCalendarClient {
    /// Create a client from configuration. The token file may be missing;
    /// reads then degrade to "assume free" and writes fail with `Auth`.
    pub fn from_config(config: &CalendarConfig) -> eyre::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            token_path: config.token_path.clone(),
            calendar_id: config.calendar_id.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Read the cached OAuth access token
    fn access_token(&self) -> Result<String, CalendarError> {
        let raw = std::fs::read_to_string(&self.token_path)
            .map_err(|e| CalendarError::Auth(format!("token cache {}: {}", self.token_path.display(), e)))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| CalendarError::Auth(format!("token cache parse: {}", e)))?;
        value
            .get("access_token")
            .or_else(|| value.get("token"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| CalendarError::Auth("token cache has no access_token".to_string()))
    }

    fn events_url(&self, event_id: Option<&str>) -> String {
        match event_id {
            Some(id) => format!("{}/calendars/{}/events/{}", self.base_url, self.calendar_id, id),
            None => format!("{}/calendars/{}/events", self.base_url, self.calendar_id),
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            let message = response.text().await.unwrap_or_default();
            return Err(CalendarError::Auth(message));
        }
        if status == 404 || status == 410 {
            return Err(CalendarError::NotFound("event".to_string()));
        }
        if !(200..300).contains(&status) {
            let message = response.text().await.unwrap_or_default();
            return Err(CalendarError::Api { status, message });
        }
        Ok(response)
    }

    async fn query_free_busy(
        &self,
        range: Interval,
        calendars: Option<&[String]>,
    ) -> Result<Vec<Interval>, CalendarError> {
        let token = self.access_token()?;
        let ids: Vec<&str> = match calendars {
            Some(ids) if !ids.is_empty() => ids.iter().map(String::as_str).collect(),
            _ => vec![self.calendar_id.as_str()],
        };
        let body = serde_json::json!({
            "timeMin": range.start.to_rfc3339(),
            "timeMax": range.end.to_rfc3339(),
            "items": ids.iter().map(|id| serde_json::json!({ "id": id })).collect::<Vec<_>>(),
        });

        let response = self
            .http
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let payload: FreeBusyResponse = response
            .json()
            .await
            .map_err(CalendarError::Network)?;

        let mut busy = Vec::new();
        for calendar in payload.calendars.into_values() {
            for block in calendar.busy {
                busy.push(Interval::new(block.start, block.end));
            }
        }
        Ok(busy)
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn free_busy(&self, range: Interval, calendars: Option<&[String]>) -> Availability {
        debug!(start = %range.start, end = %range.end, "free_busy: called");
        match self.query_free_busy(range, calendars).await {
            Ok(busy) => {
                debug!(busy_blocks = busy.len(), "free_busy: got busy blocks");
                Availability::from_busy(range, busy)
            }
            Err(e) => {
                warn!(error = %e, "free_busy failed, assuming the requested range is free");
                Availability::assume_free(range)
            }
        }
    }

    async fn create_event(&self, draft: EventDraft) -> Result<String, CalendarError> {
        debug!(summary = %draft.summary, "create_event: called");
        let token = self.access_token()?;
        let body = serde_json::json!({
            "summary": draft.summary,
            "description": draft.description,
            "start": { "dateTime": draft.start.to_rfc3339(), "timeZone": "UTC" },
            "end": { "dateTime": draft.end.to_rfc3339(), "timeZone": "UTC" },
            "reminders": {
                "useDefault": false,
                "overrides": [{ "method": "popup", "minutes": 5 }],
            },
        });

        let response = self
            .http
            .post(self.events_url(None))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let created: CreatedEvent = response.json().await.map_err(CalendarError::Network)?;
        info!(event_id = %created.id, "Calendar event created");
        Ok(created.id)
    }

    async fn update_event(&self, event_id: &str, patch: EventPatch) -> Result<(), CalendarError> {
        debug!(%event_id, "update_event: called");
        let token = self.access_token()?;

        let mut body = serde_json::Map::new();
        if let Some(summary) = patch.summary {
            body.insert("summary".to_string(), serde_json::json!(summary));
        }
        if let Some(description) = patch.description {
            body.insert("description".to_string(), serde_json::json!(description));
        }
        if let Some(start) = patch.start {
            body.insert(
                "start".to_string(),
                serde_json::json!({ "dateTime": start.to_rfc3339(), "timeZone": "UTC" }),
            );
        }
        if let Some(end) = patch.end {
            body.insert(
                "end".to_string(),
                serde_json::json!({ "dateTime": end.to_rfc3339(), "timeZone": "UTC" }),
            );
        }

        let response = self
            .http
            .patch(self.events_url(Some(event_id)))
            .bearer_auth(token)
            .json(&serde_json::Value::Object(body))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        debug!(%event_id, "delete_event: called");
        let token = self.access_token()?;
        let response = self
            .http
            .delete(self.events_url(Some(event_id)))
            .bearer_auth(token)
            .send()
            .await?;
        match Self::check_status(response).await {
            Ok(_) => Ok(()),
            // Already gone counts as deleted
            Err(CalendarError::NotFound(_)) => {
                warn!(%event_id, "delete_event: event already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_events(&self, range: Interval) -> Result<Vec<EventHandle>, CalendarError> {
        debug!(start = %range.start, end = %range.end, "list_events: called");
        let token = self.access_token()?;
        let response = self
            .http
            .get(self.events_url(None))
            .bearer_auth(token)
            .query(&[
                ("timeMin", range.start.to_rfc3339()),
                ("timeMax", range.end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let payload: EventList = response.json().await.map_err(CalendarError::Network)?;

        Ok(payload
            .items
            .into_iter()
            .filter_map(|item| {
                let start = item.start.and_then(|t| t.date_time)?;
                let end = item.end.and_then(|t| t.date_time)?;
                Some(EventHandle {
                    id: item.id,
                    summary: item.summary.unwrap_or_default(),
                    start,
                    end,
                })
            })
            .collect())
    }
}

// Google Calendar API response types

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyBlock>,
}

#[derive(Debug, Deserialize)]
struct BusyBlock {
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    id: String,
    summary: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<chrono::DateTime<chrono::Utc>>,
}
