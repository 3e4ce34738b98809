//! Turtle tagging: the cross-record duplicate-tag guard, sequential tag
//! numbering for new recruits, and the turtle-then-event submit.

use std::collections::HashMap;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use super::{RuleOutcome, ValidationIssue, filled, first_issue, owned};
use crate::api::Backend;
use crate::catalog::{TagPosition, scientific_name};
use crate::error::{Error, Result};
use crate::models::{FlipperTags, Measurements, Turtle, TurtleEvent, TurtleEventType, TurtleId};

/// Every tag string currently on record, mapped to the turtle carrying it.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    owners: HashMap<String, TurtleId>,
}

impl TagIndex {
    pub fn build(turtles: &[Turtle]) -> Self {
        let mut owners = HashMap::new();
        for t in turtles {
            let Some(id) = t.id else {
                continue;
            };
            for (_, tag) in t.tags.present() {
                owners.entry(tag.to_string()).or_insert(id);
            }
        }
        Self { owners }
    }

    pub fn owner(&self, tag: &str) -> Option<TurtleId> {
        self.owners.get(tag.trim()).copied()
    }

    /// Rejects a tag repeated across the form's own positions, then any tag
    /// owned by a turtle other than `editing` (for a new turtle, any owner).
    pub fn check(&self, tags: &FlipperTags, editing: Option<TurtleId>) -> Option<ValidationIssue> {
        let present = tags.present();
        for (i, (pos, tag)) in present.iter().enumerate() {
            if let Some((first, _)) = present[..i].iter().find(|(_, t)| t == tag) {
                return Some(ValidationIssue::new(
                    format!("tags.{}", pos.field()),
                    format!(
                        "Tag {tag} is entered twice ({} and {})",
                        first.label(),
                        pos.label()
                    ),
                ));
            }
        }
        for (pos, tag) in present {
            match self.owner(tag) {
                Some(owner) if Some(owner) != editing => {
                    return Some(ValidationIssue::new(
                        format!("tags.{}", pos.field()),
                        format!("Tag {tag} already belongs to turtle #{owner}"),
                    ));
                }
                _ => {}
            }
        }
        None
    }
}

/// The next two sequential tag numbers after the highest `<prefix>-?<n>` on record.
pub fn next_tag_pair(turtles: &[Turtle], prefix: &str) -> (String, String) {
    let prefix = prefix.trim();
    let max = Regex::new(&format!(r"{}-?(\d+)", regex::escape(prefix)))
        .ok()
        .and_then(|re| {
            turtles
                .iter()
                .flat_map(|t| t.tags.present())
                .filter_map(|(_, tag)| re.captures(tag)?.get(1)?.as_str().parse::<u64>().ok())
                .max()
        })
        .unwrap_or(0);
    (
        format!("{prefix}-{}", max + 1),
        format!("{prefix}-{}", max + 2),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurtleTarget {
    /// First capture: the turtle record is created.
    New,
    /// Already on record: the whole record is re-sent with the form applied.
    Existing(TurtleId),
}

impl TurtleTarget {
    pub fn editing(self) -> Option<TurtleId> {
        match self {
            TurtleTarget::New => None,
            TurtleTarget::Existing(id) => Some(id),
        }
    }
}

/// Turtle identity and morphometrics shared by tagging and night-survey forms.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TurtleInput {
    pub species: Option<String>,
    pub sex: Option<String>,
    pub health_condition: Option<String>,
    #[serde(flatten)]
    pub tags: FlipperTags,
    pub measurements: Measurements,
}

impl TurtleInput {
    pub(crate) fn measurement_issue(&self) -> Option<ValidationIssue> {
        let m = &self.measurements;
        for (name, value) in Measurements::FIELDS.iter().zip(m.values()) {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Some(ValidationIssue::new(
                        format!("measurements.{name}"),
                        format!("{name} must be a positive number of cm"),
                    ));
                }
            }
        }
        for (min_name, min, max) in [
            ("scl_min", m.scl_min, m.scl_max),
            ("ccl_min", m.ccl_min, m.ccl_max),
        ] {
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Some(ValidationIssue::new(
                        format!("measurements.{min_name}"),
                        format!("{min_name} cannot exceed its max"),
                    ));
                }
            }
        }
        None
    }

    /// New record, or `base` with every filled field of the form applied.
    pub fn apply_to(&self, base: Option<&Turtle>) -> Turtle {
        let mut t = base.cloned().unwrap_or_default();
        if let Some(species) = filled(&self.species) {
            t.species = scientific_name(species).to_string();
        }
        if let Some(sex) = owned(&self.sex) {
            t.sex = Some(sex.to_ascii_lowercase());
        }
        if let Some(h) = owned(&self.health_condition) {
            t.health_condition = Some(h);
        }
        for pos in TagPosition::ALL {
            if let Some(tag) = self.tags.tag(pos) {
                t.tags.set_tag(pos, Some(tag.to_string()));
            }
        }
        let addr = |new: &Option<String>, old: &mut Option<String>| {
            if let Some(a) = owned(new) {
                *old = Some(a);
            }
        };
        addr(&self.tags.front_left_address, &mut t.tags.front_left_address);
        addr(&self.tags.front_right_address, &mut t.tags.front_right_address);
        addr(&self.tags.rear_left_address, &mut t.tags.rear_left_address);
        addr(&self.tags.rear_right_address, &mut t.tags.rear_right_address);

        let m = &self.measurements;
        let tm = &mut t.measurements;
        tm.scl_max = m.scl_max.or(tm.scl_max);
        tm.scl_min = m.scl_min.or(tm.scl_min);
        tm.scw = m.scw.or(tm.scw);
        tm.ccl_max = m.ccl_max.or(tm.ccl_max);
        tm.ccl_min = m.ccl_min.or(tm.ccl_min);
        tm.ccw = m.ccw.or(tm.ccw);
        tm.tail_extension = m.tail_extension.or(tm.tail_extension);
        tm.vent_to_tail_tip = m.vent_to_tail_tip.or(tm.vent_to_tail_tip);
        tm.total_tail_length = m.total_tail_length.or(tm.total_tail_length);
        t
    }

    /// Whether applying the form would change any tag or address on `base`.
    pub fn changes_tags_of(&self, base: &Turtle) -> bool {
        self.apply_to(Some(base)).tags != base.tags
    }
}

pub(crate) fn date_ok(raw: &Option<String>) -> bool {
    filled(raw).is_some_and(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TaggingForm {
    pub date: Option<String>,
    pub observer: Option<String>,
    pub location: Option<String>,
    #[serde(flatten)]
    pub turtle: TurtleInput,
    pub notes: Option<String>,
}

impl TaggingForm {
    /// Fills front-left/front-right with the next free numbers when both are blank.
    pub fn prefill_tags(&mut self, turtles: &[Turtle], prefix: &str) -> bool {
        let tags = &mut self.turtle.tags;
        if tags.tag(TagPosition::FrontLeft).is_some() || tags.tag(TagPosition::FrontRight).is_some() {
            return false;
        }
        let (left, right) = next_tag_pair(turtles, prefix);
        tags.set_tag(TagPosition::FrontLeft, Some(left));
        tags.set_tag(TagPosition::FrontRight, Some(right));
        true
    }

    pub fn evaluate(&self, index: &TagIndex, target: TurtleTarget) -> Vec<RuleOutcome> {
        let t = &self.turtle;
        vec![
            RuleOutcome::check(
                "species",
                target != TurtleTarget::New || filled(&t.species).is_some(),
                || ValidationIssue::new("species", "Select the species"),
            ),
            RuleOutcome::check("date", date_ok(&self.date), || {
                ValidationIssue::new("date", "Enter the tagging date (YYYY-MM-DD)")
            }),
            RuleOutcome::check("tags.present", !t.tags.present().is_empty(), || {
                ValidationIssue::new("tags.front_left_tag", "Record at least one flipper tag")
            }),
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
        TurtleEvent {
            turtle_id,
            event_type: TurtleEventType::Tagging,
            event_date: filled(&self.date).unwrap_or_default().to_string(),
            observer: owned(&self.observer),
            location: owned(&self.location),
            tags: self.turtle.tags.clone(),
            measurements: self.turtle.measurements.clone(),
            notes: owned(&self.notes),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurtleSubmitOutcome {
    pub turtle: Turtle,
    pub event: Option<TurtleEvent>,
    /// The turtle write succeeded but the event did not; nothing was rolled back.
    pub event_error: Option<String>,
}

/// Writes the turtle (create or whole-record update) when needed, then the event.
pub(crate) fn write_turtle_then_event(
    backend: &dyn Backend,
    target: TurtleTarget,
    input: &TurtleInput,
    force_update: bool,
    make_event: impl FnOnce(TurtleId) -> TurtleEvent,
) -> Result<TurtleSubmitOutcome> {
    let turtle = match target {
        TurtleTarget::New => {
            let created = backend.create_turtle(&input.apply_to(None))?;
            tracing::info!(id = ?created.id, species = %created.species, "turtle created");
            created
        }
        TurtleTarget::Existing(id) => {
            let current = backend.get_turtle(id)?;
            if force_update || input.changes_tags_of(&current) {
                let mut next = input.apply_to(Some(&current));
                next.id = Some(id);
                backend.update_turtle(id, &next)?
            } else {
                current
            }
        }
    };

    let Some(id) = turtle.id.or(target.editing()) else {
        let msg = "backend did not return an id for the new turtle".to_string();
        tracing::error!("{msg}; survey event not recorded");
        return Ok(TurtleSubmitOutcome {
            turtle,
            event: None,
            event_error: Some(msg),
        });
    };

    let event = make_event(id);
    match backend.create_turtle_event(&event) {
        Ok(ev) => {
            tracing::info!(turtle = id, event_type = ev.event_type.as_str(), "turtle event saved");
            Ok(TurtleSubmitOutcome {
                turtle,
                event: Some(ev),
                event_error: None,
            })
        }
        Err(e) => {
            tracing::error!(turtle = id, "turtle saved but event failed: {e}");
            Ok(TurtleSubmitOutcome {
                turtle,
                event: None,
                event_error: Some(e.to_string()),
            })
        }
    }
}

pub fn submit(backend: &dyn Backend, form: &TaggingForm, target: TurtleTarget) -> Result<TurtleSubmitOutcome> {
    let turtles = backend.list_turtles()?;
    let index = TagIndex::build(&turtles);
    if let Some(issue) = form.first_issue(&index, target) {
        tracing::warn!(field = %issue.field, "tagging blocked: {}", issue.message);
        return Err(issue.into());
    }
    if let TurtleTarget::Existing(id) = target {
        if !turtles.iter().any(|t| t.id == Some(id)) {
            return Err(Error::msg(format!("turtle #{id} not found")));
        }
    }
    write_turtle_then_event(backend, target, &form.turtle, true, |id| form.build_event(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turtle(id: TurtleId, front_left: &str) -> Turtle {
        let mut t = Turtle {
            id: Some(id),
            species: "Caretta caretta".into(),
            ..Default::default()
        };
        t.tags.front_left_tag = Some(front_left.into());
        t
    }

    #[test]
    fn tag_owned_by_other_turtle_is_rejected() {
        let index = TagIndex::build(&[turtle(7, "KF-2001")]);
        let mut tags = FlipperTags::default();
        tags.rear_right_tag = Some("KF-2001".into());
        let issue = index.check(&tags, None).unwrap();
        assert_eq!(issue.field, "tags.rear_right_tag");
        assert!(issue.message.contains("#7"));

        assert!(index.check(&tags, Some(8)).is_some());
        assert!(index.check(&tags, Some(7)).is_none());
    }

    #[test]
    fn repeated_tag_within_form_is_rejected() {
        let index = TagIndex::default();
        let mut tags = FlipperTags::default();
        tags.front_left_tag = Some("KF-10".into());
        tags.rear_left_tag = Some(" KF-10 ".into());
        let issue = index.check(&tags, None).unwrap();
        assert_eq!(issue.field, "tags.rear_left_tag");
        assert!(issue.message.contains("front left and rear left"));
    }

    #[test]
    fn tag_numbers_continue_from_highest() {
        let turtles = [turtle(1, "KF-2001"), turtle(2, "KF1999"), turtle(3, "XX-9999")];
        assert_eq!(
            next_tag_pair(&turtles, "KF"),
            ("KF-2002".to_string(), "KF-2003".to_string())
        );
        assert_eq!(next_tag_pair(&[], "KF").0, "KF-1");
    }

    #[test]
    fn prefill_only_touches_blank_front_tags() {
        let turtles = [turtle(1, "KF-5")];
        let mut form = TaggingForm::default();
        assert!(form.prefill_tags(&turtles, "KF"));
        assert_eq!(form.turtle.tags.tag(TagPosition::FrontRight), Some("KF-7"));

        let mut form = TaggingForm::default();
        form.turtle.tags.front_left_tag = Some("KF-100".into());
        assert!(!form.prefill_tags(&turtles, "KF"));
    }

    #[test]
    fn apply_keeps_existing_values_for_blank_inputs() {
        let mut base = turtle(7, "KF-2001");
        base.measurements.scl_max = Some(70.0);
        let mut input = TurtleInput {
            species: Some("Loggerhead".into()),
            ..Default::default()
        };
        input.tags.rear_left_tag = Some("KF-3000".into());
        input.measurements.ccw = Some(61.0);
        let t = input.apply_to(Some(&base));
        assert_eq!(t.species, "Caretta caretta");
        assert_eq!(t.tags.tag(TagPosition::FrontLeft), Some("KF-2001"));
        assert_eq!(t.tags.tag(TagPosition::RearLeft), Some("KF-3000"));
        assert_eq!(t.measurements.scl_max, Some(70.0));
        assert_eq!(t.measurements.ccw, Some(61.0));
        assert!(input.changes_tags_of(&base));
    }

    #[test]
    fn measurement_rules() {
        let mut input = TurtleInput::default();
        input.measurements.scl_min = Some(75.0);
        input.measurements.scl_max = Some(70.0);
        assert_eq!(input.measurement_issue().unwrap().field, "measurements.scl_min");
        input.measurements.scl_min = Some(-1.0);
        assert_eq!(input.measurement_issue().unwrap().field, "measurements.scl_min");
    }
}
