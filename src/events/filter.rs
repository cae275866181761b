//! Pure, order-independent filters over classified events.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::{NarrativeEvent, Significance};

/// Events that relate to a specific workspace.
pub fn by_workspace(events: &[NarrativeEvent], workspace: &str) -> Vec<NarrativeEvent> {
    events
        .iter()
        .filter(|e| e.workspace.as_deref() == Some(workspace))
        .cloned()
        .collect()
}

/// Events at or above the given significance.
pub fn by_min_significance(
    events: &[NarrativeEvent],
    min: Significance,
) -> Vec<NarrativeEvent> {
    events
        .iter()
        .filter(|e| e.significance >= min)
        .cloned()
        .collect()
}

/// Events within the half-open range `[start, end)`. Records with an
/// unparseable timestamp are dropped.
pub fn by_time_range(
    events: &[NarrativeEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<NarrativeEvent> {
    events
        .iter()
        .filter(|e| {
            DateTime::parse_from_rfc3339(&e.event.timestamp)
                .map(|ts| {
                    let ts = ts.with_timezone(&Utc);
                    ts >= start && ts < end
                })
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Events whose type is in the given set.
pub fn by_types(events: &[NarrativeEvent], types: &[&str]) -> Vec<NarrativeEvent> {
    let wanted: HashSet<&str> = types.iter().copied().collect();
    events
        .iter()
        .filter(|e| wanted.contains(e.event.event_type.as_str()))
        .cloned()
        .collect()
}

/// Events whose type is not in the given set.
pub fn exclude_types(events: &[NarrativeEvent], types: &[&str]) -> Vec<NarrativeEvent> {
    let unwanted: HashSet<&str> = types.iter().copied().collect();
    events
        .iter()
        .filter(|e| !unwanted.contains(e.event.event_type.as_str()))
        .cloned()
        .collect()
}
