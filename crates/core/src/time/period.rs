use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Month and year a command operates on: the `YYYY-MM` argument when given, else the current
/// UTC month.
pub fn resolve_period(period_arg: Option<&str>, now_utc: DateTime<Utc>) -> anyhow::Result<(u32, i32)> {
    if let Some(s) = period_arg {
        let s = s.trim();
        let date = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
            .with_context(|| format!("invalid period {s:?}, expected YYYY-MM"))?;
        return Ok((date.month(), date.year()));
    }

    let today = now_utc.date_naive();
    Ok((today.month(), today.year()))
}
