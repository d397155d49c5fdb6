//! Free-form date parsing for `expiresAt` and `testCompletedAt`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::pipeline::{Draft, StageContext};
use crate::validate::normalize_url;
use crate::{ErrorCode, Rejection};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn relative_offset(amount: i64, unit: &str) -> Option<TimeDelta> {
    match unit.trim_end_matches('s') {
        "minute" | "min" => TimeDelta::try_minutes(amount),
        "hour" | "hr" => TimeDelta::try_hours(amount),
        "day" => TimeDelta::try_days(amount),
        "week" => TimeDelta::try_weeks(amount),
        _ => None,
    }
}

/// Parse `in 3 days` / `3 days from now`.
fn parse_relative(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let words: Vec<&str> = input.split_whitespace().collect();
    let (amount, unit) = match words.as_slice() {
        ["in", amount, unit] => (*amount, *unit),
        [amount, unit, "from", "now"] => (*amount, *unit),
        _ => return None,
    };
    let amount: i64 = amount.parse().ok()?;
    now.checked_add_signed(relative_offset(amount, unit)?)
}

/// Parse a date expression. Naive timestamps are taken as UTC.
pub fn parse_date_time(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0));
    }

    let lowered = s.to_lowercase();
    match lowered.as_str() {
        "now" | "today" => Some(now),
        "tomorrow" => now.checked_add_signed(TimeDelta::try_days(1)?),
        other => parse_relative(other, now),
    }
}

/// Temporal stage.
pub(crate) fn parse_fields(cx: &StageContext<'_>, draft: &mut Draft) -> Result<(), Rejection> {
    let now = cx.deps.clock.now();

    if let Some(raw) = draft.request.expires_at.as_deref().filter(|s| !s.is_empty()) {
        let parsed = parse_date_time(raw, now)
            .ok_or_else(|| Rejection::new(ErrorCode::InvalidDate, "Invalid expiration date."))?;
        draft.expires_at = Some(parsed);

        if let Some(expired_url) = draft.expired_url.as_deref().filter(|s| !s.is_empty()) {
            let url = normalize_url(expired_url)
                .ok_or_else(|| Rejection::new(ErrorCode::InvalidUrl, "Invalid expired URL."))?;
            draft.expired_url = Some(url);
        }
    }

    if let Some(raw) = draft.request.test_completed_at.as_deref().filter(|s| !s.is_empty()) {
        let parsed = parse_date_time(raw, now).ok_or_else(|| {
            Rejection::new(ErrorCode::InvalidDate, "Invalid test completion date.")
        })?;
        draft.test_completed_at = Some(parsed);
    }

    Ok(())
}
