//! Half-open UTC time intervals and free/busy arithmetic

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)` in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Interval starting now with the given length in minutes
    pub fn from_now(now: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            start: now,
            end: now + Duration::minutes(minutes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Whether `instant` lies inside the half-open range
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether two half-open intervals share any time
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The overlap of two intervals, if any
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(Interval::new(start, end))
        } else {
            None
        }
    }
}

/// Merge overlapping or touching busy blocks into a minimal sorted set
pub fn merge_busy(mut busy: Vec<Interval>) -> Vec<Interval> {
    busy.retain(|b| !b.is_empty());
    busy.sort_by_key(|b| b.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(busy.len());
    for block in busy {
        match merged.last_mut() {
            Some(last) if block.start <= last.end => {
                last.end = last.end.max(block.end);
            }
            _ => merged.push(block),
        }
    }
    merged
}

/// Compute the free gaps inside `range` left by the busy blocks
pub fn free_gaps(range: Interval, busy: &[Interval]) -> Vec<Interval> {
    let merged = merge_busy(busy.to_vec());
    let mut free = Vec::new();
    let mut cursor = range.start;

    for block in merged {
        let Some(clipped) = block.intersect(&range) else {
            continue;
        };
        if cursor < clipped.start {
            free.push(Interval::new(cursor, clipped.start));
        }
        cursor = cursor.max(clipped.end);
    }

    if cursor < range.end {
        free.push(Interval::new(cursor, range.end));
    }
    free
}
