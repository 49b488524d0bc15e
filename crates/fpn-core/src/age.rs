//! Humanized relative ages ("3 hours ago", "a month ago").

use chrono::{DateTime, Utc};

const SECS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_MONTH: f64 = 30.436_875;
const DAYS_PER_YEAR: f64 = 365.2425;

/// Render the time elapsed between `then` and `now` in the coarsest unit the span warrants.
pub fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then).num_seconds();
    let phrase = humanize_span(delta.unsigned_abs());
    if delta < 0 {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

fn humanize_span(secs: u64) -> String {
    let secs_f = secs as f64;
    if secs <= 44 {
        return "a few seconds".to_string();
    }
    if secs <= 89 {
        return "a minute".to_string();
    }
    let minutes = (secs_f / 60.0).round() as u64;
    if minutes <= 44 {
        return format!("{minutes} minutes");
    }
    if minutes <= 89 {
        return "an hour".to_string();
    }
    let hours = (secs_f / 3_600.0).round() as u64;
    if hours <= 21 {
        return format!("{hours} hours");
    }
    if hours <= 35 {
        return "a day".to_string();
    }
    let days_f = secs_f / SECS_PER_DAY;
    let days = days_f.round() as u64;
    if days <= 25 {
        return format!("{days} days");
    }
    if days <= 45 {
        return "a month".to_string();
    }
    let months = (days_f / DAYS_PER_MONTH).round() as u64;
    if months <= 10 {
        return format!("{months} months");
    }
    if months <= 17 {
        return "a year".to_string();
    }
    let years = ((days_f / DAYS_PER_YEAR).round() as u64).max(2);
    format!("{years} years")
}
