use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::mappers::{parse_day, parse_timestamp};
use crate::models::{Nest, NestEvent, NestEventType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub event_type: NestEventType,
    pub date: Option<String>,
    /// Days since discovery; `None` when either date is unknown.
    pub day: Option<i64>,
    /// `None` for the synthetic discovery entry.
    pub event: Option<NestEvent>,
}

impl TimelineEntry {
    pub fn day_label(&self) -> String {
        match self.day {
            Some(d) => format!("Day {d}"),
            None => "Day ?".to_string(),
        }
    }
}

fn sort_key(ev: &NestEvent) -> Option<NaiveDateTime> {
    [&ev.start_time, &ev.created_at, &ev.event_date]
        .into_iter()
        .find_map(|v| v.as_deref().and_then(parse_timestamp))
}

fn event_day(ev: &NestEvent) -> Option<&str> {
    ev.event_date
        .as_deref()
        .or(ev.start_time.as_deref())
        .or(ev.created_at.as_deref())
}

/// Discovery first, then stored events oldest first. Stored DISCOVERY rows
/// are dropped in favour of the one synthesised from the nest record; events
/// without any usable timestamp sort last in their original order.
pub fn timeline(nest: &Nest, events: &[NestEvent]) -> Vec<TimelineEntry> {
    let found = parse_day(&nest.date_found);
    let mut out = vec![TimelineEntry {
        event_type: NestEventType::Discovery,
        date: Some(nest.date_found.clone()).filter(|d| !d.trim().is_empty()),
        day: found.map(|_| 0),
        event: None,
    }];

    let mut stored: Vec<(Option<NaiveDateTime>, &NestEvent)> = events
        .iter()
        .filter(|e| e.event_type != NestEventType::Discovery)
        .map(|e| (sort_key(e), e))
        .collect();
    stored.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    for (_, ev) in stored {
        let when = event_day(ev);
        let day = match (found, when.and_then(parse_day)) {
            (Some(start), Some(d)) => Some((d - start).num_days()),
            _ => None,
        };
        out.push(TimelineEntry {
            event_type: ev.event_type,
            date: when.map(str::to_string),
            day,
            event: Some(ev.clone()),
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteMeasures {
    pub depth_top_egg_h: Option<f64>,
    pub depth_bottom_chamber_h: Option<f64>,
    pub width_w: Option<f64>,
    pub distance_to_sea_s: Option<f64>,
    pub gps_lat: Option<f64>,
    pub gps_long: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SiteCard {
    Site(SiteMeasures),
    /// Relocated nest whose pre-relocation measurements were never stored
    /// as structured data.
    Archived,
}

pub fn current_site(nest: &Nest) -> SiteMeasures {
    SiteMeasures {
        depth_top_egg_h: nest.depth_top_egg_h,
        depth_bottom_chamber_h: nest.depth_bottom_chamber_h,
        width_w: nest.width_w,
        distance_to_sea_s: nest.distance_to_sea_s,
        gps_lat: nest.gps_lat,
        gps_long: nest.gps_long,
    }
}

/// `None` for nests that were never relocated.
pub fn original_site(nest: &Nest, events: &[NestEvent]) -> Option<SiteCard> {
    if !nest.relocated {
        return None;
    }
    let card = events
        .iter()
        .find(|e| e.original_gps_lat.is_some())
        .map(|e| {
            SiteCard::Site(SiteMeasures {
                depth_top_egg_h: e.original_depth_top_egg_h,
                depth_bottom_chamber_h: e.original_depth_bottom_chamber_h,
                width_w: e.original_width_w,
                distance_to_sea_s: e.original_distance_to_sea_s,
                gps_lat: e.original_gps_lat,
                gps_long: e.original_gps_long,
            })
        })
        .unwrap_or(SiteCard::Archived);
    Some(card)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestDetails {
    pub nest: Nest,
    pub current_site: SiteMeasures,
    pub original_site: Option<SiteCard>,
    pub timeline: Vec<TimelineEntry>,
}

impl NestDetails {
    pub fn build(nest: Nest, events: &[NestEvent]) -> Self {
        Self {
            current_site: current_site(&nest),
            original_site: original_site(&nest, events),
            timeline: timeline(&nest, events),
            nest,
        }
    }
}
