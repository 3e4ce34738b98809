//! Raw records to display-shaped rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::catalog::{TagPosition, common_name};
use crate::forms::nest_inventory::expected_label;
use crate::models::{Nest, NestEvent, Turtle};

pub const MISSING: &str = "N/A";

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` (optionally
/// with fractional seconds) or a bare date (taken as midnight).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    parse_timestamp(raw).map(|dt| dt.date())
}

/// `DD/MM/YYYY`, or the fallback when the value is missing or unparseable.
pub fn format_date(raw: Option<&str>) -> String {
    raw.and_then(parse_day)
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

pub fn or_missing(v: Option<&str>) -> String {
    v.map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(MISSING)
        .to_string()
}

pub fn format_cm(v: Option<f64>) -> String {
    v.map(|n| format!("{n} cm")).unwrap_or_else(|| MISSING.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestRow {
    pub code: String,
    pub beach: String,
    pub date_found: String,
    pub status: String,
    pub eggs: String,
    pub relocated: bool,
    pub gps: String,
}

impl From<&Nest> for NestRow {
    fn from(n: &Nest) -> Self {
        Self {
            code: n.code.clone(),
            beach: or_missing(Some(n.beach.as_str())),
            date_found: format_date(Some(n.date_found.as_str())),
            status: n.status.as_str().to_ascii_uppercase(),
            eggs: format!(
                "{}/{}",
                expected_label(n.current_num_eggs),
                expected_label(n.total_num_eggs)
            ),
            relocated: n.relocated,
            gps: match (n.gps_lat, n.gps_long) {
                (Some(lat), Some(lng)) => format!("{lat:.5}, {lng:.5}"),
                _ => MISSING.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurtleRow {
    pub id: String,
    pub species: String,
    pub sex: String,
    pub tags: String,
    pub health: String,
}

impl From<&Turtle> for TurtleRow {
    fn from(t: &Turtle) -> Self {
        let tags: Vec<&str> = TagPosition::ALL.iter().filter_map(|p| t.tags.tag(*p)).collect();
        Self {
            id: t.id.map(|i| format!("#{i}")).unwrap_or_else(|| MISSING.into()),
            species: or_missing(Some(common_name(&t.species))),
            sex: or_missing(t.sex.as_deref()).to_ascii_uppercase(),
            tags: if tags.is_empty() {
                MISSING.to_string()
            } else {
                tags.join(", ")
            },
            health: or_missing(t.health_condition.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestEventRow {
    pub date: String,
    pub event_type: String,
    pub observer: String,
    pub eggs_counted: u32,
    pub eggs_reburied: u32,
}

impl From<&NestEvent> for NestEventRow {
    fn from(e: &NestEvent) -> Self {
        let when = e
            .event_date
            .as_deref()
            .or(e.start_time.as_deref())
            .or(e.created_at.as_deref());
        Self {
            date: format_date(when),
            event_type: e.event_type.as_str().to_string(),
            observer: or_missing(e.observer.as_deref()),
            eggs_counted: e.stages.total(),
            eggs_reburied: e.eggs_reburied,
        }
    }
}
