//! Excavation / inventory session: stage tallies, reconciliation against the
//! nest's expected egg count, event-type derivation and the parent-nest update.

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use super::nest_entry::SiteInput;
use super::{RuleOutcome, ValidationIssue, filled, first_issue, owned};
use crate::api::Backend;
use crate::error::Result;
use crate::models::{
    Contamination, EmbryonicStages, HatchlingTally, Nest, NestEvent, NestEventType, NestStatus,
    Stage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HatchlingOutcome {
    AliveWithinNest,
    DeadWithinNest,
    AliveAboveNest,
    DeadAboveNest,
}

fn hatchling_slot(t: &mut HatchlingTally, which: HatchlingOutcome) -> &mut u32 {
    match which {
        HatchlingOutcome::AliveWithinNest => &mut t.alive_within_nest,
        HatchlingOutcome::DeadWithinNest => &mut t.dead_within_nest,
        HatchlingOutcome::AliveAboveNest => &mut t.alive_above_nest,
        HatchlingOutcome::DeadAboveNest => &mut t.dead_above_nest,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NestInventoryForm {
    pub observer: Option<String>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub notes: Option<String>,
    pub original: SiteInput,
    pub reburied: SiteInput,
    pub eggs_reburied: u32,
    pub stages: EmbryonicStages,
    pub hatchlings: HatchlingTally,
    /// Spot check of the top egg layer only; skips reconciliation.
    pub top_egg_check: bool,
}

/// How the recorded eggs compare with what the nest should still hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Balanced,
    /// Top-egg-check override is on.
    Bypassed,
    /// The nest has no known egg count yet.
    Unknown,
    Mismatch { recorded: u32, expected: u32 },
}

impl Reconciliation {
    pub fn blocks_save(self) -> bool {
        matches!(self, Reconciliation::Mismatch { .. })
    }
}

/// Eggs the nest should still hold. Only the last-known current count
/// counts; a total set by a top-egg check is a partial tally.
pub fn expected_eggs(nest: &Nest) -> Option<u32> {
    nest.current_num_eggs
}

/// `"?"` when the expected count is unknown.
pub fn expected_label(expected: Option<u32>) -> String {
    expected.map_or_else(|| "?".to_string(), |n| n.to_string())
}

fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

impl NestInventoryForm {
    pub fn increment_stage(&mut self, stage: Stage) {
        self.stages.get_mut(stage).increment();
    }

    pub fn decrement_stage(&mut self, stage: Stage) {
        self.stages.get_mut(stage).decrement();
    }

    /// Refused (returns false) once the sub-count equals the stage count.
    pub fn increment_contamination(&mut self, stage: Stage, kind: Contamination) -> bool {
        self.stages.get_mut(stage).increment_sub(kind)
    }

    pub fn decrement_contamination(&mut self, stage: Stage, kind: Contamination) {
        self.stages.get_mut(stage).decrement_sub(kind);
    }

    pub fn increment_hatchlings(&mut self, which: HatchlingOutcome) {
        let slot = hatchling_slot(&mut self.hatchlings, which);
        *slot = slot.saturating_add(1);
    }

    pub fn decrement_hatchlings(&mut self, which: HatchlingOutcome) {
        let slot = hatchling_slot(&mut self.hatchlings, which);
        *slot = slot.saturating_sub(1);
    }

    /// Stage counts plus eggs moved to the new chamber.
    pub fn recorded_total(&self) -> u32 {
        self.stages.total().saturating_add(self.eggs_reburied)
    }

    pub fn reconcile(&self, expected: Option<u32>) -> Reconciliation {
        if self.top_egg_check {
            return Reconciliation::Bypassed;
        }
        let Some(expected) = expected else {
            return Reconciliation::Unknown;
        };
        let recorded = self.recorded_total();
        if recorded == expected {
            Reconciliation::Balanced
        } else {
            Reconciliation::Mismatch { recorded, expected }
        }
    }

    pub fn event_type(&self) -> NestEventType {
        if self.top_egg_check {
            NestEventType::TopEgg
        } else if self.eggs_reburied > 0 {
            NestEventType::PartialInventory
        } else if self.original.metrics.only_top_egg_filled() {
            NestEventType::TopEgg
        } else {
            NestEventType::FullInventory
        }
    }

    pub fn evaluate(&self, expected: Option<u32>) -> Vec<RuleOutcome> {
        let mut out = Vec::with_capacity(12);
        let orig = &self.original;
        let checks = [
            ("original.h", orig.metrics.top_egg_issue("original", "Original")),
            (
                "original.depth_order",
                orig.metrics.depth_order_issue("original", "Original"),
            ),
            ("original.lat", orig.gps.lat_issue("original.gps", "Original")),
            ("original.lng", orig.gps.lng_issue("original.gps", "Original")),
        ];
        for (rule, issue) in checks {
            out.push(outcome(rule, issue));
        }

        let reb = &self.reburied;
        let reburying = self.eggs_reburied > 0;
        let checks = [
            ("reburied.h", reb.metrics.top_egg_issue("reburied", "Reburied")),
            (
                "reburied.depth_order",
                reb.metrics.depth_order_issue("reburied", "Reburied"),
            ),
            ("reburied.lat", reb.gps.lat_issue("reburied.gps", "Reburied")),
            ("reburied.lng", reb.gps.lng_issue("reburied.gps", "Reburied")),
        ];
        for (rule, issue) in checks {
            out.push(outcome(rule, issue.filter(|_| reburying)));
        }

        let date_ok = filled(&self.date)
            .is_some_and(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok());
        out.push(RuleOutcome::check("date", date_ok, || {
            ValidationIssue::new("date", "Enter the inventory date (YYYY-MM-DD)")
        }));
        out.push(outcome("session.times", self.session_time_issue()));

        let bad_stage = Stage::ALL
            .iter()
            .find(|s| !self.stages.get(**s).is_consistent());
        out.push(outcome(
            "stages",
            bad_stage.map(|s| {
                ValidationIssue::new(
                    format!("stages.{}", s.label().replace(' ', "_")),
                    format!(
                        "Contamination counts for {} cannot exceed its egg count",
                        s.label()
                    ),
                )
            }),
        ));

        let rec = self.reconcile(expected);
        out.push(outcome(
            "reconciliation",
            match rec {
                Reconciliation::Mismatch { recorded, expected } => Some(ValidationIssue::new(
                    "stages",
                    format!(
                        "Egg count mismatch: recorded {recorded} != expected {expected} ({} off)",
                        recorded.abs_diff(expected)
                    ),
                )),
                _ => None,
            },
        ));
        out
    }

    fn session_time_issue(&self) -> Option<ValidationIssue> {
        let start = filled(&self.start_time);
        let end = filled(&self.end_time);
        for (field, raw) in [("start_time", start), ("end_time", end)] {
            if let Some(raw) = raw {
                if parse_hhmm(raw).is_none() {
                    return Some(ValidationIssue::new(field, "Times use HH:MM"));
                }
            }
        }
        match (start.and_then(parse_hhmm), end.and_then(parse_hhmm)) {
            (Some(s), Some(e)) if e < s => Some(ValidationIssue::new(
                "end_time",
                "End time cannot be before start time",
            )),
            _ => None,
        }
    }

    pub fn first_issue(&self, expected: Option<u32>) -> Option<ValidationIssue> {
        first_issue(&self.evaluate(expected)).cloned()
    }

    pub fn build_event(&self, nest_code: &str) -> NestEvent {
        let date = owned(&self.date);
        let stamp = |t: &Option<String>| match (date.as_deref(), filled(t)) {
            (Some(d), Some(t)) => Some(format!("{d}T{t}:00")),
            _ => None,
        };
        let orig = &self.original;
        let (orig_lat, orig_lng) = orig.gps.parsed().unzip();
        let mut ev = NestEvent {
            nest_code: nest_code.to_string(),
            event_type: self.event_type(),
            observer: owned(&self.observer),
            event_date: date.clone(),
            start_time: stamp(&self.start_time),
            end_time: stamp(&self.end_time),
            notes: owned(&self.notes),
            original_depth_top_egg_h: orig.metrics.top_egg(),
            original_depth_bottom_chamber_h: orig.metrics.bottom_chamber(),
            original_width_w: orig.metrics.width(),
            original_distance_to_sea_s: orig.metrics.distance_to_sea(),
            original_gps_lat: orig_lat,
            original_gps_long: orig_lng,
            eggs_reburied: self.eggs_reburied,
            stages: self.stages,
            hatchlings: self.hatchlings,
            ..Default::default()
        };
        if self.eggs_reburied > 0 {
            let reb = &self.reburied;
            let (lat, lng) = reb.gps.parsed().unzip();
            ev.reburied_depth_top_egg_h = reb.metrics.top_egg();
            ev.reburied_depth_bottom_chamber_h = reb.metrics.bottom_chamber();
            ev.reburied_width_w = reb.metrics.width();
            ev.reburied_distance_to_sea_s = reb.metrics.distance_to_sea();
            ev.reburied_gps_lat = lat;
            ev.reburied_gps_long = lng;
        }
        ev
    }

    /// Full nest record to PUT after the event is saved.
    pub fn parent_update(&self, nest: &Nest) -> Nest {
        let mut next = nest.clone();
        let total = match nest.total_num_eggs {
            Some(t) if t > 0 => t,
            _ => self.recorded_total(),
        };
        next.total_num_eggs = Some(total);
        if !self.top_egg_check {
            let current = self.eggs_reburied;
            next.current_num_eggs = Some(current);
            next.status = NestStatus::from_counts(current, total);
        }
        next
    }
}

fn outcome(rule: &'static str, issue: Option<ValidationIssue>) -> RuleOutcome {
    match issue {
        Some(issue) => RuleOutcome::fail(rule, issue),
        None => RuleOutcome::pass(rule),
    }
}

#[derive(Debug, Clone)]
pub struct InventoryOutcome {
    pub event: NestEvent,
    /// Updated nest as returned by the backend, when the second call succeeded.
    pub nest: Option<Nest>,
    /// The event was stored but the nest update failed; nothing was rolled back.
    pub nest_update_error: Option<String>,
}

/// Create the event, then re-send the whole nest with recomputed counts.
pub fn submit(backend: &dyn Backend, nest_code: &str, form: &NestInventoryForm) -> Result<InventoryOutcome> {
    let nest = backend.get_nest(nest_code)?;
    let expected = expected_eggs(&nest);
    if let Some(issue) = form.first_issue(expected) {
        tracing::warn!(nest = %nest.code, field = %issue.field, "inventory blocked: {}", issue.message);
        return Err(issue.into());
    }

    let event = backend.create_nest_event(&form.build_event(&nest.code))?;
    tracing::info!(
        nest = %nest.code,
        event_type = event.event_type.as_str(),
        recorded = form.recorded_total(),
        expected = %expected_label(expected),
        "inventory saved"
    );

    let updated = form.parent_update(&nest);
    let (nest, nest_update_error) = match backend.update_nest(&updated) {
        Ok(n) => (Some(n), None),
        Err(e) => {
            tracing::error!(nest = %updated.code, "inventory saved but nest update failed: {e}");
            (None, Some(e.to_string()))
        }
    };
    Ok(InventoryOutcome {
        event,
        nest,
        nest_update_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::coords::GpsInput;
    use crate::forms::metrics::SiteMetrics;

    fn site(h: &str, big_h: &str) -> SiteInput {
        SiteInput {
            metrics: SiteMetrics {
                h: Some(h.into()),
                big_h: (!big_h.is_empty()).then(|| big_h.into()),
                ..Default::default()
            },
            gps: GpsInput::new("37.50000", "21.50000"),
        }
    }

    fn form_with(stage_sum: u32, reburied: u32) -> NestInventoryForm {
        let mut f = NestInventoryForm {
            date: Some("2024-08-20".into()),
            original: site("30", "55"),
            reburied: site("28", "50"),
            eggs_reburied: reburied,
            ..Default::default()
        };
        f.stages.hatched.count = stage_sum;
        f
    }

    fn nest(current: Option<u32>, total: Option<u32>) -> Nest {
        Nest {
            code: "KY-2".into(),
            current_num_eggs: current,
            total_num_eggs: total,
            ..Default::default()
        }
    }

    #[test]
    fn reconciliation_examples() {
        let expected = expected_eggs(&nest(Some(100), Some(100)));
        let f = form_with(95, 5);
        assert_eq!(f.reconcile(expected), Reconciliation::Balanced);
        assert!(f.first_issue(expected).is_none());

        let mut f = form_with(95, 4);
        assert_eq!(
            f.reconcile(expected),
            Reconciliation::Mismatch {
                recorded: 99,
                expected: 100
            }
        );
        let issue = f.first_issue(expected).unwrap();
        assert!(issue.message.contains("99 != expected 100"), "{}", issue.message);

        f.top_egg_check = true;
        assert_eq!(f.reconcile(expected), Reconciliation::Bypassed);
        assert!(f.first_issue(expected).is_none());
    }

    #[test]
    fn unknown_expected_count_never_blocks() {
        let f = form_with(80, 0);
        assert_eq!(f.reconcile(None), Reconciliation::Unknown);
        assert_eq!(expected_label(None), "?");
        assert_eq!(expected_eggs(&nest(None, Some(90))), None);
        assert_eq!(expected_eggs(&nest(Some(40), Some(90))), Some(40));
    }

    #[test]
    fn reburied_site_required_only_when_eggs_reburied() {
        let mut f = form_with(100, 0);
        f.reburied = SiteInput::default();
        assert!(f.first_issue(Some(100)).is_none());

        f.stages.hatched.count = 90;
        f.eggs_reburied = 10;
        assert_eq!(f.first_issue(Some(100)).unwrap().field, "reburied.h");
    }

    #[test]
    fn event_type_priority() {
        let mut f = form_with(10, 0);
        assert_eq!(f.event_type(), NestEventType::FullInventory);
        f.original = site("30", "");
        f.original.metrics.w = None;
        assert_eq!(f.event_type(), NestEventType::TopEgg);
        f.eggs_reburied = 3;
        assert_eq!(f.event_type(), NestEventType::PartialInventory);
        f.top_egg_check = true;
        assert_eq!(f.event_type(), NestEventType::TopEgg);
    }

    #[test]
    fn parent_update_recomputes_counts_and_status() {
        let f = form_with(95, 5);
        let n = f.parent_update(&nest(Some(100), Some(100)));
        assert_eq!(n.total_num_eggs, Some(100));
        assert_eq!(n.current_num_eggs, Some(5));
        assert_eq!(n.status, NestStatus::Hatching);

        let n = form_with(120, 0).parent_update(&nest(None, None));
        assert_eq!(n.total_num_eggs, Some(120));
        assert_eq!(n.current_num_eggs, Some(0));
        assert_eq!(n.status, NestStatus::Hatched);

        let mut f = form_with(3, 0);
        f.top_egg_check = true;
        let mut before = nest(Some(100), Some(100));
        before.status = NestStatus::Incubating;
        let n = f.parent_update(&before);
        assert_eq!(n.current_num_eggs, Some(100));
        assert_eq!(n.status, NestStatus::Incubating);
    }

    #[test]
    fn contamination_increments_are_bounded() {
        let mut f = NestInventoryForm::default();
        assert!(!f.increment_contamination(Stage::LateEmbryo, Contamination::PinkBacteria));
        f.increment_stage(Stage::LateEmbryo);
        assert!(f.increment_contamination(Stage::LateEmbryo, Contamination::PinkBacteria));
        assert!(!f.increment_contamination(Stage::LateEmbryo, Contamination::PinkBacteria));
        f.decrement_stage(Stage::LateEmbryo);
        assert_eq!(f.stages.late_embryo.pink_bacteria, 0);
        f.increment_hatchlings(HatchlingOutcome::DeadAboveNest);
        f.decrement_hatchlings(HatchlingOutcome::AliveWithinNest);
        assert_eq!(f.hatchlings.dead_above_nest, 1);
        assert_eq!(f.hatchlings.alive_within_nest, 0);
    }

    #[test]
    fn draft_with_inconsistent_subcounts_is_rejected() {
        let mut f = form_with(100, 0);
        f.stages.early_embryo.black_fungus = 2;
        assert_eq!(f.first_issue(None).unwrap().field, "stages.early_embryo");
    }

    #[test]
    fn event_carries_original_site_and_timestamps() {
        let mut f = form_with(95, 5);
        f.start_time = Some("07:30".into());
        f.end_time = Some("07:10".into());
        assert_eq!(f.first_issue(Some(100)).unwrap().field, "end_time");
        f.end_time = Some("08:15".into());
        let ev = f.build_event("KY-2");
        assert_eq!(ev.event_type, NestEventType::PartialInventory);
        assert_eq!(ev.original_gps_lat, Some(37.5));
        assert_eq!(ev.reburied_depth_top_egg_h, Some(28.0));
        assert_eq!(ev.start_time.as_deref(), Some("2024-08-20T07:30:00"));
        assert_eq!(ev.eggs_reburied, 5);
    }
}
