//! Query parameters shared by the storage backends and reports.

use analytics_core::events::fields;
use analytics_core::limits::MAX_QUERY_LIMIT;
use analytics_core::{Error, Event, Filter, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Half-open time window `[start, end)`. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Window covering the last `days` days up to `now`.
    ///
    /// A window reaching past the representable calendar is a `QUERY_001`.
    pub fn last_days(days: i64, now: DateTime<Utc>) -> Result<Self> {
        let start = TimeDelta::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| Error::query(format!("days out of range: {}", days)))?;
        Ok(Self {
            start: Some(start),
            end: None,
        })
    }

    /// Parse caller-supplied bounds.
    ///
    /// Accepts RFC 3339 timestamps or `YYYY-MM-DD`. A bare end date covers
    /// that whole day.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let start = start
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_bound(s, false))
            .transpose()?;
        let end = end
            .filter(|s| !s.trim().is_empty())
            .map(|s| parse_bound(s, true))
            .transpose()?;

        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(Error::query("startDate must be before endDate"));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }

    /// Pipeline filters on `createdAt` for this window.
    pub fn filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(start) = self.start {
            filters.push(Filter::gte(fields::CREATED_AT, start.timestamp_millis()));
        }
        if let Some(end) = self.end {
            filters.push(Filter::lt(fields::CREATED_AT, end.timestamp_millis()));
        }
        filters
    }
}

fn parse_bound(raw: &str, is_end: bool) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| Error::query(format!("invalid date: {}", raw)))?;
    let day = if is_end { day.succ_opt() } else { Some(day) };
    day.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| Error::query(format!("date out of range: {}", raw)))
}

/// Tenant event listing, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub user_id: String,
    pub api_key: Option<String>,
    pub range: DateRange,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            api_key: None,
            range: DateRange::default(),
            offset: 0,
            limit: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    /// Page through results. The limit is capped at [`MAX_QUERY_LIMIT`].
    pub fn page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit.map(|l| l.min(MAX_QUERY_LIMIT));
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.user_id == self.user_id
            && self.api_key.as_ref().map_or(true, |k| &event.api_key == k)
            && self.range.contains(event.created_at)
    }
}
