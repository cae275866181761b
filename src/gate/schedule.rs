use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Parse a compound duration string like "90s", "30m", "24h" or "1h30m".
///
/// Units: ms, s, m, h, d. The whole string must be consumed; anything else
/// is a configuration error.
pub fn parse_duration(s: &str) -> Result<Duration> {
    static PART: OnceLock<Regex> = OnceLock::new();
    let part = PART.get_or_init(|| Regex::new(r"(\d+)(ms|s|m|h|d)").unwrap());

    let trimmed = s.trim();
    if trimmed.is_empty() {
        bail!("empty duration");
    }

    let mut total = Duration::zero();
    let mut consumed = 0;
    for cap in part.captures_iter(trimmed) {
        let whole = cap.get(0).unwrap();
        if whole.start() != consumed {
            bail!("invalid duration {trimmed:?}");
        }
        consumed = whole.end();

        let n: i64 = cap[1].parse()?;
        total = total + match &cap[2] {
            "ms" => Duration::milliseconds(n),
            "s" => Duration::seconds(n),
            "m" => Duration::minutes(n),
            "h" => Duration::hours(n),
            "d" => Duration::days(n),
            _ => unreachable!(),
        };
    }
    if consumed != trimmed.len() {
        bail!("invalid duration {trimmed:?}");
    }
    Ok(total)
}

/// A five-field cron schedule: minute, hour, day-of-month, month, day-of-week.
///
/// Field syntax: `*`, `*/step`, numbers, ranges `a-b`, and comma lists.
/// Day-of-week uses 0-6 with 0 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CronField {
    entries: Vec<CronEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CronEntry {
    Any,
    Step(u32),
    Value(u32),
    Range(u32, u32),
}

impl CronField {
    fn parse(s: &str, min: u32, max: u32) -> Result<Self> {
        let mut entries = Vec::new();
        for piece in s.split(',') {
            let entry = if piece == "*" {
                CronEntry::Any
            } else if let Some(step) = piece.strip_prefix("*/") {
                let step: u32 = step.parse().map_err(|_| anyhow!("bad step {piece:?}"))?;
                if step == 0 {
                    bail!("zero step in {piece:?}");
                }
                CronEntry::Step(step)
            } else if let Some((lo, hi)) = piece.split_once('-') {
                let lo: u32 = lo.parse().map_err(|_| anyhow!("bad range {piece:?}"))?;
                let hi: u32 = hi.parse().map_err(|_| anyhow!("bad range {piece:?}"))?;
                if lo > hi || lo < min || hi > max {
                    bail!("range {piece:?} out of bounds {min}-{max}");
                }
                CronEntry::Range(lo, hi)
            } else {
                let v: u32 = piece.parse().map_err(|_| anyhow!("bad value {piece:?}"))?;
                if v < min || v > max {
                    bail!("value {v} out of bounds {min}-{max}");
                }
                CronEntry::Value(v)
            };
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    fn matches(&self, v: u32) -> bool {
        self.entries.iter().any(|e| match e {
            CronEntry::Any => true,
            CronEntry::Step(step) => v % step == 0,
            CronEntry::Value(want) => v == *want,
            CronEntry::Range(lo, hi) => v >= *lo && v <= *hi,
        })
    }
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            bail!("cron expression needs 5 fields, got {}", fields.len());
        }
        Ok(Self {
            minute: CronField::parse(fields[0], 0, 59)?,
            hour: CronField::parse(fields[1], 0, 23)?,
            day_of_month: CronField::parse(fields[2], 1, 31)?,
            month: CronField::parse(fields[3], 1, 12)?,
            day_of_week: CronField::parse(fields[4], 0, 6)?,
        })
    }

    fn matches(&self, t: DateTime<Utc>) -> bool {
        self.minute.matches(t.minute())
            && self.hour.matches(t.hour())
            && self.day_of_month.matches(t.day())
            && self.month.matches(t.month())
            && self.day_of_week.matches(t.weekday().num_days_from_sunday())
    }

    /// The most recent scheduled fire time at or before `now`, or None if
    /// nothing matched within the lookback horizon (one year).
    pub fn prev_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut slot = now.duration_trunc(Duration::minutes(1)).ok()?;
        let horizon = now - Duration::days(366);
        while slot >= horizon {
            if self.matches(slot) {
                return Some(slot);
            }
            slot -= Duration::minutes(1);
        }
        None
    }
}
