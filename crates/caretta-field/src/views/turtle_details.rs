use std::cmp::Reverse;

use serde::Serialize;

use crate::catalog::{TagPosition, common_name};
use crate::mappers::parse_timestamp;
use crate::models::{Measurements, Turtle, TurtleEvent};

/// Survey events newest first; undated events keep their order at the end.
pub fn newest_first(events: &[TurtleEvent]) -> Vec<&TurtleEvent> {
    let mut out: Vec<&TurtleEvent> = events.iter().collect();
    out.sort_by_key(|e| {
        let when = parse_timestamp(&e.event_date)
            .or_else(|| e.created_at.as_deref().and_then(parse_timestamp));
        (when.is_none(), Reverse(when))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagHistory {
    pub position: TagPosition,
    pub current: Option<String>,
    pub address: Option<String>,
    /// Value on the most recent survey that recorded this position.
    pub latest_observed: Option<String>,
    /// Distinct observed values, newest first.
    pub history: Vec<String>,
}

pub fn identification(turtle: &Turtle, events: &[TurtleEvent]) -> Vec<TagHistory> {
    let ordered = newest_first(events);
    TagPosition::ALL
        .iter()
        .map(|&pos| {
            let mut history: Vec<String> = Vec::new();
            for ev in &ordered {
                if let Some(tag) = ev.tags.tag(pos) {
                    if !history.iter().any(|h| h == tag) {
                        history.push(tag.to_string());
                    }
                }
            }
            TagHistory {
                position: pos,
                current: turtle.tags.tag(pos).map(str::to_string),
                address: turtle.tags.address(pos).map(str::to_string),
                latest_observed: history.first().cloned(),
                history,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRow {
    pub name: &'static str,
    pub value: Option<f64>,
    /// Date of the survey the value came from; `None` when it came from the
    /// turtle record itself.
    pub observed_on: Option<String>,
}

pub fn measurements(turtle: &Turtle, events: &[TurtleEvent]) -> Vec<MeasurementRow> {
    let ordered = newest_first(events);
    let base = turtle.measurements.values();
    Measurements::FIELDS
        .iter()
        .enumerate()
        .map(|(i, &name)| {
            let observed = ordered
                .iter()
                .find_map(|e| e.measurements.values()[i].map(|v| (v, e.event_date.clone())));
            match observed {
                Some((v, date)) => MeasurementRow {
                    name,
                    value: Some(v),
                    observed_on: Some(date).filter(|d| !d.is_empty()),
                },
                None => MeasurementRow {
                    name,
                    value: base[i],
                    observed_on: None,
                },
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurtleDetails {
    pub turtle: Turtle,
    pub common_name: String,
    pub tags: Vec<TagHistory>,
    pub measurements: Vec<MeasurementRow>,
    pub surveys: Vec<TurtleEvent>,
}

impl TurtleDetails {
    pub fn build(turtle: Turtle, events: &[TurtleEvent]) -> Self {
        Self {
            common_name: common_name(&turtle.species).to_string(),
            tags: identification(&turtle, events),
            measurements: measurements(&turtle, events),
            surveys: newest_first(events).into_iter().cloned().collect(),
            turtle,
        }
    }
}
