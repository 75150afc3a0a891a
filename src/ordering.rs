//! Timestamp ordering and patch helpers shared by the remote and local
//! read paths.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a record timestamp into a UTC instant.
///
/// Accepts RFC 3339, the datetime-local form `YYYY-MM-DDTHH:MM[:SS]`, the
/// space-separated variant and bare dates. Naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Newest-first comparison. Unparseable timestamps sort last.
pub fn newest_first(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable newest-first sort: equal timestamps keep insertion order.
pub fn sort_newest_first<T>(items: &mut [T], timestamp: impl Fn(&T) -> &str) {
    items.sort_by(|a, b| newest_first(timestamp(a), timestamp(b)));
}

/// Shallow-merge `patch` into `target`. Identity fields are never
/// overwritten.
pub fn merge_patch(target: &mut Value, patch: &Map<String, Value>) {
    let Some(obj) = target.as_object_mut() else {
        return;
    };
    for (field, value) in patch {
        if field == "id" || field == "pet_id" {
            continue;
        }
        obj.insert(field.clone(), value.clone());
    }
}
