//! Calendar buckets for recurring quests
//!
//! Daily instances are scoped to a local day (`YYYY-MM-DD`), weekly instances
//! to an ISO-8601 week (`YYYY-Www`, Thursday-anchored, ISO week-year). The
//! "local" day is computed at a fixed UTC offset so buckets never depend on
//! the host timezone.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

const DAY_BUCKET_LEN: usize = 10; // 2026-10-19
const WEEK_BUCKET_LEN: usize = 8; // 2026-W43

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl Calendar {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Offset east of UTC in minutes. Out-of-range offsets fall back to UTC.
    pub fn with_offset_minutes(minutes: i32) -> Self {
        match minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
        {
            Some(offset) => Self { offset },
            None => {
                tracing::warn!(minutes, "invalid utc offset, using UTC for calendar buckets");
                Self::utc()
            }
        }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// `YYYY-MM-DD` of the local day containing `now`
    pub fn day_bucket(&self, now: DateTime<Utc>) -> String {
        day_bucket_of(self.local_date(now))
    }

    /// `YYYY-Www` of the ISO week containing `now`
    pub fn week_bucket(&self, now: DateTime<Utc>) -> String {
        week_bucket_of(self.local_date(now))
    }
}

pub fn day_bucket_of(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn week_bucket_of(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// ISO-8601 week number (1..=53)
pub fn iso_week_number(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

pub fn is_day_bucket(s: &str) -> bool {
    s.len() == DAY_BUCKET_LEN && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

pub fn is_week_bucket(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != WEEK_BUCKET_LEN || bytes[4] != b'-' || bytes[5] != b'W' {
        return false;
    }
    if !bytes[..4].iter().chain(&bytes[6..]).all(u8::is_ascii_digit) {
        return false;
    }
    matches!(s[6..].parse::<u32>(), Ok(1..=53))
}

pub fn daily_instance_id(template_id: &str, day_bucket: &str) -> String {
    format!("{template_id}-{day_bucket}")
}

pub fn weekly_instance_id(template_id: &str, week_bucket: &str) -> String {
    format!("{template_id}-{week_bucket}")
}

/// Template id of a daily instance id, or None if it carries no day bucket
pub fn strip_day_bucket(instance_id: &str) -> Option<&str> {
    strip_bucket(instance_id, DAY_BUCKET_LEN, is_day_bucket)
}

/// Template id of a weekly instance id, or None if it carries no week bucket
pub fn strip_week_bucket(instance_id: &str) -> Option<&str> {
    strip_bucket(instance_id, WEEK_BUCKET_LEN, is_week_bucket)
}

fn strip_bucket(instance_id: &str, bucket_len: usize, valid: fn(&str) -> bool) -> Option<&str> {
    let split = instance_id.len().checked_sub(bucket_len + 1)?;
    let template = instance_id.get(..split)?;
    let rest = instance_id.get(split..)?;
    let bucket = rest.strip_prefix('-')?;
    if template.is_empty() || !valid(bucket) {
        return None;
    }
    Some(template)
}

// =====================
// Event windows
// =====================

/// Inclusive `[start, end]` time range of a dated event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventWindow {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl EventWindow {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_date && now <= self.end_date
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now > self.end_date
    }

    /// `is_active && now ∈ [start, end]`
    pub fn is_active(&self, is_active: bool, now: DateTime<Utc>) -> bool {
        is_active && self.contains(now)
    }
}

// =====================
// Seasons
// =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonType {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl SeasonType {
    /// Meteorological season of a month (1..=12)
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => SeasonType::Spring,
            6..=8 => SeasonType::Summer,
            9..=11 => SeasonType::Autumn,
            _ => SeasonType::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonType::Spring => "spring",
            SeasonType::Summer => "summer",
            SeasonType::Autumn => "autumn",
            SeasonType::Winter => "winter",
        }
    }
}

pub fn season_id(season: SeasonType, year: i32) -> String {
    format!("{}-{}", season.as_str(), year)
}

/// Instance id of a seasonal event: `seasonId:eventId`
pub fn seasonal_instance_id(season_id: &str, event_id: &str) -> String {
    format!("{season_id}:{event_id}")
}

/// Inverse of [`seasonal_instance_id`]
pub fn split_seasonal_instance_id(instance_id: &str) -> Option<(&str, &str)> {
    instance_id
        .split_once(':')
        .filter(|(season, event)| !season.is_empty() && !event.is_empty())
}
