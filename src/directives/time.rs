//! `<zin-time />` and `<zin-time format="..." />`.
//!
//! Without a format the tag becomes the Unix time in milliseconds. A format is
//! either a named shortcut (`YEAR`, `DATE_TIME_12H`, `NOW`, ...) or a relative
//! offset such as `+3d`, `-2week` or `6month`, which yields an RFC 3339
//! timestamp.

use super::rewrite_tags;
use crate::engine::{Directive, RenderContext};
use chrono::{DateTime, Days, Local, Months, SecondsFormat, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;

static RE_RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-]?)(\d+)(sec|min|hr|day|d|week|w|month|m|year|y)$").unwrap()
});

/// strftime pattern for a shortcut name (case-insensitive).
fn shortcut(name: &str) -> Option<&'static str> {
    let pattern = match name.to_ascii_uppercase().as_str() {
        "YEAR" => "%Y",
        "MONTH" => "%m",
        "MONTH_NAME" => "%B",
        "DAY" => "%d",
        "DAY_NAME" => "%A",
        "DATE" | "TODAY" => "%Y-%m-%d",
        "TIME" => "%H:%M:%S",
        "TIME_12H" => "%I:%M:%S %p",
        "DATE_TIME" => "%Y-%m-%d %H:%M:%S",
        "DATE_TIME_12H" => "%Y-%m-%d %I:%M:%S %p",
        "WEEK" => "%A (Week %V)",
        "WEEK_NO" => "%V",
        _ => return None,
    };
    Some(pattern)
}

pub struct Time;

impl Directive for Time {
    fn name(&self) -> &'static str {
        "time"
    }

    fn marker(&self) -> &'static str {
        "<zin-time"
    }

    fn apply(&self, document: String, cx: &mut RenderContext<'_>) -> String {
        let zone = cx.config.time_zone.clone();
        rewrite_tags(&document, "time", cx, |tag, cx| {
            let Some(format) = tag.attr("format") else {
                return Utc::now().timestamp_millis().to_string();
            };
            match render_now(format, &zone) {
                Some(text) => text,
                None => cx.tag_error(
                    tag.text,
                    format!(
                        "The time shortcut '{format}' is not recognized. Use a supported value like 'now', 'today', or a relative time such as '5m'."
                    ),
                ),
            }
        })
    }
}

/// Render `format` for the current instant in `zone` (`Local` or IANA name).
fn render_now(format: &str, zone: &str) -> Option<String> {
    if !zone.eq_ignore_ascii_case("local")
        && let Ok(tz) = zone.parse::<Tz>()
    {
        return render(&Utc::now().with_timezone(&tz), format);
    }
    render(&Local::now(), format)
}

pub fn render<Z>(now: &DateTime<Z>, format: &str) -> Option<String>
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let format = format.trim();
    if let Some(pattern) = shortcut(format) {
        return Some(now.format(pattern).to_string());
    }
    if format.eq_ignore_ascii_case("NOW") {
        return Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    relative(now, format).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn relative<Z: TimeZone>(now: &DateTime<Z>, input: &str) -> Option<DateTime<Z>> {
    let input = input.to_ascii_lowercase();
    let caps = RE_RELATIVE.captures(&input)?;
    let backwards = &caps[1] == "-";
    let amount: u32 = caps[2].parse().ok()?;
    let now = now.clone();

    let shift_secs = |secs: i64| {
        let delta = TimeDelta::try_seconds(secs.checked_mul(i64::from(amount))?)?;
        if backwards {
            now.clone().checked_sub_signed(delta)
        } else {
            now.clone().checked_add_signed(delta)
        }
    };
    let shift_days = |days: u64| {
        let days = Days::new(days.checked_mul(u64::from(amount))?);
        if backwards {
            now.clone().checked_sub_days(days)
        } else {
            now.clone().checked_add_days(days)
        }
    };
    let shift_months = |months: u32| {
        let months = Months::new(months.checked_mul(amount)?);
        if backwards {
            now.clone().checked_sub_months(months)
        } else {
            now.clone().checked_add_months(months)
        }
    };

    match &caps[3] {
        "sec" => shift_secs(1),
        "min" => shift_secs(60),
        "hr" => shift_secs(3600),
        "day" | "d" => shift_days(1),
        "week" | "w" => shift_days(7),
        "month" | "m" => shift_months(1),
        "year" | "y" => shift_months(12),
        _ => None,
    }
}
