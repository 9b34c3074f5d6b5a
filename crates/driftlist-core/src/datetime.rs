use anyhow::anyhow;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;

/// Parses a due-date expression from the command line.
///
/// Accepted forms: RFC 3339 timestamps, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM`
/// (local time), `today`, `tomorrow`, and `+<n>d` for n days from now.
/// Calendar dates resolve to local midnight.
pub fn parse_due_expr(raw: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("empty due expression"));
    }

    match raw.to_ascii_lowercase().as_str() {
        "today" => return local_midnight(now.with_timezone(&Local).date_naive()),
        "tomorrow" => {
            let date = now
                .with_timezone(&Local)
                .date_naive()
                .succ_opt()
                .ok_or_else(|| anyhow!("date out of range"))?;
            return local_midnight(date);
        }
        _ => {}
    }

    let days_re = Regex::new(r"^\+?(\d{1,4})d$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = days_re.captures(raw) {
        let days: i64 = caps[1].parse()?;
        return Ok(now + Duration::days(days));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return local_datetime(naive);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return local_datetime(naive);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return local_midnight(date);
    }

    Err(anyhow!("unrecognized due expression: {raw}"))
}

fn local_midnight(date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    local_datetime(date.and_time(NaiveTime::MIN))
}

fn local_datetime(naive: NaiveDateTime) -> anyhow::Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("ambiguous local time: {naive}"))
}

pub fn format_local_date(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

pub fn format_local_datetime(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
