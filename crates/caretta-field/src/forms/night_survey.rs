//! Night-survey sighting of a nesting female.

use chrono::{NaiveTime, Timelike};
use serde::Deserialize;

use super::coords::GpsInput;
use super::tagging::{TagIndex, TurtleInput, TurtleSubmitOutcome, TurtleTarget, date_ok, write_turtle_then_event};
use super::{RuleOutcome, ValidationIssue, filled, first_issue, owned};
use crate::api::Backend;
use crate::error::{Error, Result};
use crate::models::{SurveyTimes, TurtleEvent, TurtleEventType, TurtleId};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NightSurveyForm {
    pub date: Option<String>,
    pub observer: Option<String>,
    pub location: Option<String>,
    pub gps: GpsInput,
    pub nest_code: Option<String>,
    #[serde(flatten)]
    pub turtle: TurtleInput,
    pub times: SurveyTimes,
    pub notes: Option<String>,
}

fn time_slots(t: &SurveyTimes) -> [(&'static str, &Option<String>); 5] {
    [
        ("time_first_seen", &t.time_first_seen),
        ("time_start_egg_laying", &t.time_start_egg_laying),
        ("time_covering", &t.time_covering),
        ("time_end_camouflage", &t.time_end_camouflage),
        ("time_reach_sea", &t.time_reach_sea),
    ]
}

/// Longest plausible span from the first filled time to the last.
const MAX_SIGHTING_MINUTES: u32 = 12 * 60;
const MINUTES_PER_DAY: u32 = 24 * 60;

impl NightSurveyForm {
    /// Filled times must be `HH:MM` and follow the nesting sequence. A step
    /// backwards on the clock is read as crossing midnight, so the whole
    /// sighting has to fit in [`MAX_SIGHTING_MINUTES`].
    fn times_issue(&self) -> Option<ValidationIssue> {
        let mut first: Option<u32> = None;
        let mut last: Option<(&'static str, u32)> = None;
        for (field, raw) in time_slots(&self.times) {
            let Some(raw) = filled(raw) else {
                continue;
            };
            let Ok(t) = NaiveTime::parse_from_str(raw, "%H:%M") else {
                return Some(ValidationIssue::new(
                    format!("times.{field}"),
                    "Times use HH:MM",
                ));
            };
            let mut minute = t.hour() * 60 + t.minute();
            if let Some((prev_field, prev)) = last {
                while minute < prev {
                    minute += MINUTES_PER_DAY;
                }
                let start = first.unwrap_or(prev);
                if minute - start > MAX_SIGHTING_MINUTES {
                    return Some(ValidationIssue::new(
                        format!("times.{field}"),
                        format!("{field} cannot be earlier than {prev_field}"),
                    ));
                }
            }
            first.get_or_insert(minute);
            last = Some((field, minute));
        }
        None
    }

    pub fn evaluate(&self, index: &TagIndex, target: TurtleTarget) -> Vec<RuleOutcome> {
        let gps_issue = if self.gps.is_blank() {
            None
        } else {
            self.gps
                .lat_issue("gps", "Sighting")
                .or_else(|| self.gps.lng_issue("gps", "Sighting"))
        };
        let t = &self.turtle;
        vec![
            RuleOutcome::check("date", date_ok(&self.date), || {
                ValidationIssue::new("date", "Enter the survey date (YYYY-MM-DD)")
            }),
            RuleOutcome::check(
                "species",
                target != TurtleTarget::New || filled(&t.species).is_some(),
                || ValidationIssue::new("species", "Select the species of the new turtle"),
            ),
            match gps_issue {
                Some(issue) => RuleOutcome::fail("gps", issue),
                None => RuleOutcome::pass("gps"),
            },
            match self.times_issue() {
                Some(issue) => RuleOutcome::fail("times", issue),
                None => RuleOutcome::pass("times"),
            },
            match index.check(&t.tags, target.editing()) {
                Some(issue) => RuleOutcome::fail("tags.unique", issue),
                None => RuleOutcome::pass("tags.unique"),
            },
            match t.measurement_issue() {
                Some(issue) => RuleOutcome::fail("measurements", issue),
                None => RuleOutcome::pass("measurements"),
            },
        ]
    }

    pub fn first_issue(&self, index: &TagIndex, target: TurtleTarget) -> Option<ValidationIssue> {
        first_issue(&self.evaluate(index, target)).cloned()
    }

    pub fn build_event(&self, turtle_id: TurtleId) -> TurtleEvent {
        let (gps_lat, gps_long) = self.gps.parsed().unzip();
        let times = SurveyTimes {
            time_first_seen: owned(&self.times.time_first_seen),
            time_start_egg_laying: owned(&self.times.time_start_egg_laying),
            time_covering: owned(&self.times.time_covering),
            time_end_camouflage: owned(&self.times.time_end_camouflage),
            time_reach_sea: owned(&self.times.time_reach_sea),
        };
        TurtleEvent {
            turtle_id,
            event_type: TurtleEventType::NightSurvey,
            event_date: filled(&self.date).unwrap_or_default().to_string(),
            observer: owned(&self.observer),
            location: owned(&self.location),
            gps_lat,
            gps_long,
            nest_code: owned(&self.nest_code),
            tags: self.turtle.tags.clone(),
            measurements: self.turtle.measurements.clone(),
            times,
            notes: owned(&self.notes),
            ..Default::default()
        }
    }
}

/// New turtle → create then event; known turtle → update only when its tags
/// changed, then event.
pub fn submit(backend: &dyn Backend, form: &NightSurveyForm, target: TurtleTarget) -> Result<TurtleSubmitOutcome> {
    let turtles = backend.list_turtles()?;
    let index = TagIndex::build(&turtles);
    if let Some(issue) = form.first_issue(&index, target) {
        tracing::warn!(field = %issue.field, "night survey blocked: {}", issue.message);
        return Err(issue.into());
    }
    if let TurtleTarget::Existing(id) = target {
        if !turtles.iter().any(|t| t.id == Some(id)) {
            return Err(Error::msg(format!("turtle #{id} not found")));
        }
    }
    write_turtle_then_event(backend, target, &form.turtle, false, |id| form.build_event(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(first: &str, laying: &str, sea: &str) -> SurveyTimes {
        SurveyTimes {
            time_first_seen: Some(first.into()),
            time_start_egg_laying: Some(laying.into()),
            time_reach_sea: Some(sea.into()),
            ..Default::default()
        }
    }

    fn form() -> NightSurveyForm {
        NightSurveyForm {
            date: Some("2024-07-02".into()),
            times: times("22:10", "22:40", "23:55"),
            ..Default::default()
        }
    }

    #[test]
    fn ordered_times_pass() {
        let f = form();
        assert!(f.first_issue(&TagIndex::default(), TurtleTarget::Existing(3)).is_none());
    }

    #[test]
    fn backwards_times_are_flagged_at_the_later_field() {
        let mut f = form();
        f.times.time_reach_sea = Some("22:20".into());
        let issue = f.first_issue(&TagIndex::default(), TurtleTarget::Existing(3)).unwrap();
        assert_eq!(issue.field, "times.time_reach_sea");

        f.times.time_reach_sea = Some("11pm".into());
        let issue = f.first_issue(&TagIndex::default(), TurtleTarget::Existing(3)).unwrap();
        assert_eq!(issue.message, "Times use HH:MM");
    }

    #[test]
    fn sighting_may_run_past_midnight() {
        let mut f = form();
        f.times = times("23:40", "00:15", "01:05");
        assert!(f.first_issue(&TagIndex::default(), TurtleTarget::Existing(3)).is_none());

        f.times.time_covering = Some("00:40".into());
        f.times.time_end_camouflage = Some("00:30".into());
        let issue = f.first_issue(&TagIndex::default(), TurtleTarget::Existing(3)).unwrap();
        assert_eq!(issue.field, "times.time_end_camouflage");
        assert_eq!(
            issue.message,
            "time_end_camouflage cannot be earlier than time_covering"
        );
    }

    #[test]
    fn gps_is_optional_but_strict_when_given() {
        let mut f = form();
        f.gps.lat = Some("37.5".into());
        let issue = f.first_issue(&TagIndex::default(), TurtleTarget::Existing(3)).unwrap();
        assert_eq!(issue.field, "gps.lat");
    }

    #[test]
    fn new_turtle_needs_species() {
        let f = form();
        let issue = f.first_issue(&TagIndex::default(), TurtleTarget::New).unwrap();
        assert_eq!(issue.field, "species");
    }

    #[test]
    fn event_snapshot_carries_times_and_nest() {
        let mut f = form();
        f.nest_code = Some("KY-9".into());
        f.gps = GpsInput::new("37.40000", "21.60000");
        let ev = f.build_event(3);
        assert_eq!(ev.event_type, TurtleEventType::NightSurvey);
        assert_eq!(ev.times.time_start_egg_laying.as_deref(), Some("22:40"));
        assert_eq!(ev.nest_code.as_deref(), Some("KY-9"));
        assert_eq!(ev.gps_lat, Some(37.4));
    }
}
