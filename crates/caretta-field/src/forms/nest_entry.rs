//! New-nest form: ordered validation, gap-filling nest codes and the single
//! `create_nest` submit.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use super::coords::GpsInput;
use super::metrics::SiteMetrics;
use super::{RuleOutcome, ValidationIssue, filled, first_issue, owned, text_or_number};
use crate::api::Backend;
use crate::catalog::{Beach, find_beach};
use crate::error::{Error, Result};
use crate::models::{Nest, NestStatus, TriangulationPoint};

pub const TRIANGULATION_POINTS: usize = 2;

/// One nest site as typed: chamber metrics plus GPS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiteInput {
    #[serde(flatten)]
    pub metrics: SiteMetrics,
    pub gps: GpsInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelocationDraft {
    pub reason: Option<String>,
    pub site: SiteInput,
}

/// Whether the eggs were moved to a new chamber at discovery. The relocated
/// site's fields only exist (and are only required) in the `Relocated` arm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<RelocationDraft>")]
pub enum Relocation {
    #[default]
    NotRelocated,
    Relocated {
        reason: Option<String>,
        site: SiteInput,
    },
}

impl From<Option<RelocationDraft>> for Relocation {
    fn from(d: Option<RelocationDraft>) -> Self {
        match d {
            None => Relocation::NotRelocated,
            Some(d) => Relocation::Relocated {
                reason: d.reason,
                site: d.site,
            },
        }
    }
}

impl Relocation {
    pub fn is_relocated(&self) -> bool {
        matches!(self, Relocation::Relocated { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TriangulationInput {
    pub description: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub distance: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub lat: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub lng: Option<String>,
}

impl TriangulationInput {
    fn first_missing(&self) -> Option<&'static str> {
        let number = |v: &Option<String>| filled(v).and_then(|s| s.parse::<f64>().ok());
        if filled(&self.description).is_none() {
            Some("description")
        } else if number(&self.distance).is_none() {
            Some("distance")
        } else if number(&self.lat).is_none() {
            Some("lat")
        } else if number(&self.lng).is_none() {
            Some("lng")
        } else {
            None
        }
    }

    fn to_point(&self) -> TriangulationPoint {
        let number = |v: &Option<String>| filled(v).and_then(|s| s.parse::<f64>().ok());
        TriangulationPoint {
            description: filled(&self.description).unwrap_or_default().to_string(),
            distance: number(&self.distance),
            lat: number(&self.lat),
            lng: number(&self.lng),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NestEntryForm {
    pub beach: Option<String>,
    pub date: Option<String>,
    pub original: SiteInput,
    pub relocation: Relocation,
    pub triangulation: Vec<TriangulationInput>,
    pub notes: Option<String>,
}

fn parse_date(raw: &Option<String>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(filled(raw)?, "%Y-%m-%d").ok()
}

impl NestEntryForm {
    /// Every rule in its fixed order. Relocation rules pass trivially when the
    /// nest was not relocated.
    pub fn evaluate(&self, beaches: &[Beach]) -> Vec<RuleOutcome> {
        let mut out = Vec::with_capacity(12);

        let beach_known = filled(&self.beach).is_some_and(|b| find_beach(beaches, b).is_some());
        out.push(RuleOutcome::check("beach", beach_known, || {
            ValidationIssue::new("beach", "Select the beach where the nest was found")
        }));
        out.push(RuleOutcome::check("date", parse_date(&self.date).is_some(), || {
            ValidationIssue::new("date", "Enter the date found (YYYY-MM-DD)")
        }));

        let orig = &self.original;
        push_issue(&mut out, "original.h", orig.metrics.top_egg_issue("original", "Original"));
        push_issue(
            &mut out,
            "original.depth_order",
            orig.metrics.depth_order_issue("original", "Original"),
        );
        push_issue(&mut out, "original.lat", orig.gps.lat_issue("original.gps", "Original"));
        push_issue(&mut out, "original.lng", orig.gps.lng_issue("original.gps", "Original"));

        match &self.relocation {
            Relocation::NotRelocated => {
                for rule in [
                    "relocation.reason",
                    "relocation.metrics",
                    "relocation.depth_order",
                    "relocation.lat",
                    "relocation.lng",
                ] {
                    out.push(RuleOutcome::pass(rule));
                }
            }
            Relocation::Relocated { reason, site } => {
                out.push(RuleOutcome::check("relocation.reason", filled(reason).is_some(), || {
                    ValidationIssue::new("relocation.reason", "Give a reason for relocating the nest")
                }));
                push_issue(
                    &mut out,
                    "relocation.metrics",
                    site.metrics.top_egg_issue("relocation", "Relocated"),
                );
                push_issue(
                    &mut out,
                    "relocation.depth_order",
                    site.metrics.depth_order_issue("relocation", "Relocated"),
                );
                push_issue(&mut out, "relocation.lat", site.gps.lat_issue("relocation.gps", "Relocated"));
                push_issue(&mut out, "relocation.lng", site.gps.lng_issue("relocation.gps", "Relocated"));
            }
        }

        out.push(self.triangulation_outcome());
        out
    }

    fn triangulation_outcome(&self) -> RuleOutcome {
        let empty = TriangulationInput::default();
        for i in 0..TRIANGULATION_POINTS {
            let point = self.triangulation.get(i).unwrap_or(&empty);
            if let Some(field) = point.first_missing() {
                return RuleOutcome::fail(
                    "triangulation",
                    ValidationIssue::new(
                        format!("triangulation.{}.{field}", i + 1),
                        format!("Triangulation point {} needs a {field}", i + 1),
                    ),
                );
            }
        }
        RuleOutcome::check(
            "triangulation",
            self.triangulation.len() <= TRIANGULATION_POINTS,
            || {
                ValidationIssue::new(
                    "triangulation",
                    format!("Exactly {TRIANGULATION_POINTS} triangulation points are recorded"),
                )
            },
        )
    }

    pub fn first_issue(&self, beaches: &[Beach]) -> Option<ValidationIssue> {
        first_issue(&self.evaluate(beaches)).cloned()
    }

    pub fn is_submittable(&self, beaches: &[Beach]) -> bool {
        self.first_issue(beaches).is_none()
    }

    /// Builds the record to POST, assigning the next free code for the beach.
    pub fn prepare(&self, beaches: &[Beach], existing_codes: &[String]) -> Result<Nest> {
        if let Some(issue) = self.first_issue(beaches) {
            return Err(issue.into());
        }
        let beach = filled(&self.beach)
            .and_then(|b| find_beach(beaches, b))
            .ok_or_else(|| Error::msg("beach vanished after validation"))?;
        let date = parse_date(&self.date).ok_or_else(|| Error::msg("date vanished after validation"))?;

        let relocated = self.relocation.is_relocated();
        let code = next_nest_code(existing_codes.iter().map(String::as_str), &beach.abbrev, relocated);

        let (active, reason) = match &self.relocation {
            Relocation::NotRelocated => (&self.original, None),
            Relocation::Relocated { reason, site } => (site, owned(reason)),
        };
        let (gps_lat, gps_long) = active
            .gps
            .parsed()
            .ok_or_else(|| Error::msg("coordinates vanished after validation"))?;

        let mut notes: Vec<String> = owned(&self.notes).into_iter().collect();
        if relocated {
            notes.push(original_site_note(&self.original));
        }

        Ok(Nest {
            id: None,
            code,
            beach: beach.name.clone(),
            date_found: date.format("%Y-%m-%d").to_string(),
            gps_lat: Some(gps_lat),
            gps_long: Some(gps_long),
            depth_top_egg_h: active.metrics.top_egg(),
            depth_bottom_chamber_h: active.metrics.bottom_chamber(),
            width_w: active.metrics.width(),
            distance_to_sea_s: active.metrics.distance_to_sea(),
            relocated,
            relocation_reason: reason,
            triangulation: self
                .triangulation
                .iter()
                .take(TRIANGULATION_POINTS)
                .map(TriangulationInput::to_point)
                .collect(),
            total_num_eggs: None,
            current_num_eggs: None,
            status: NestStatus::Incubating,
            is_archived: false,
            notes: (!notes.is_empty()).then(|| notes.join("\n")),
            created_at: None,
            updated_at: None,
        })
    }
}

fn push_issue(out: &mut Vec<RuleOutcome>, rule: &'static str, issue: Option<ValidationIssue>) {
    out.push(match issue {
        Some(issue) => RuleOutcome::fail(rule, issue),
        None => RuleOutcome::pass(rule),
    });
}

/// Free-text rendering of the pre-relocation site, stored in the nest notes.
pub fn original_site_note(site: &SiteInput) -> String {
    format!(
        "Original site: {} lat={} lng={}",
        site.metrics.summary(),
        filled(&site.gps.lat).unwrap_or("-"),
        filled(&site.gps.lng).unwrap_or("-"),
    )
}

/// Lowest positive sequence number not yet used by `abbrev`'s nest codes.
/// Trailing `R` (relocated) and the hyphen are ignored when scanning.
pub fn next_nest_code<'a>(
    existing: impl IntoIterator<Item = &'a str>,
    abbrev: &str,
    relocated: bool,
) -> String {
    let abbrev = abbrev.trim();
    let used = used_sequence_numbers(existing, abbrev);
    let mut n: u32 = 1;
    while used.contains(&n) {
        n += 1;
    }
    format!("{abbrev}-{n}{}", if relocated { "R" } else { "" })
}

fn used_sequence_numbers<'a>(existing: impl IntoIterator<Item = &'a str>, abbrev: &str) -> BTreeSet<u32> {
    let pattern = format!(r"^{}-?(\d+)R?$", regex::escape(abbrev));
    let Ok(re) = Regex::new(&pattern) else {
        return BTreeSet::new();
    };
    existing
        .into_iter()
        .filter_map(|code| re.captures(code.trim()))
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .collect()
}

/// Loads existing codes, validates, and fires exactly one `create_nest`.
pub fn submit(backend: &dyn Backend, form: &NestEntryForm, beaches: &[Beach]) -> Result<Nest> {
    if let Some(issue) = form.first_issue(beaches) {
        tracing::warn!(field = %issue.field, "nest entry blocked: {}", issue.message);
        return Err(issue.into());
    }
    let codes: Vec<String> = backend.list_nests()?.into_iter().map(|n| n.code).collect();
    let nest = form.prepare(beaches, &codes)?;
    tracing::info!(code = %nest.code, beach = %nest.beach, relocated = nest.relocated, "creating nest");
    backend.create_nest(&nest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_beaches;

    fn tri(desc: &str) -> TriangulationInput {
        TriangulationInput {
            description: Some(desc.into()),
            distance: Some("12.5".into()),
            lat: Some("37.50010".into()),
            lng: Some("21.50010".into()),
        }
    }

    fn valid_form() -> NestEntryForm {
        NestEntryForm {
            beach: Some("Kyparissia Bay".into()),
            date: Some("2024-06-14".into()),
            original: SiteInput {
                metrics: SiteMetrics {
                    h: Some("30".into()),
                    ..Default::default()
                },
                gps: GpsInput::new("37.50000", "21.50000"),
            },
            relocation: Relocation::NotRelocated,
            triangulation: vec![tri("taverna pole"), tri("dune fence")],
            notes: None,
        }
    }

    #[test]
    fn valid_form_has_no_issue() {
        assert!(valid_form().is_submittable(&default_beaches()));
    }

    #[test]
    fn first_failure_follows_fixed_order() {
        let mut form = valid_form();
        form.original.gps.lat = Some("37.5".into());
        form.triangulation[1].lng = None;
        let issue = form.first_issue(&default_beaches()).unwrap();
        assert_eq!(issue.field, "original.gps.lat");

        form.original.metrics.h = Some("40".into());
        form.original.metrics.big_h = Some("30".into());
        let issue = form.first_issue(&default_beaches()).unwrap();
        assert_eq!(issue.field, "original.H");

        form.beach = None;
        let issue = form.first_issue(&default_beaches()).unwrap();
        assert_eq!(issue.field, "beach");
    }

    #[test]
    fn relocation_rules_only_apply_when_relocated() {
        let mut form = valid_form();
        form.relocation = Relocation::Relocated {
            reason: None,
            site: SiteInput::default(),
        };
        let beaches = default_beaches();
        assert_eq!(form.first_issue(&beaches).unwrap().field, "relocation.reason");

        form.relocation = Relocation::Relocated {
            reason: Some("below high tide line".into()),
            site: SiteInput::default(),
        };
        assert_eq!(form.first_issue(&beaches).unwrap().field, "relocation.h");

        form.relocation = Relocation::Relocated {
            reason: Some("below high tide line".into()),
            site: SiteInput {
                metrics: SiteMetrics {
                    h: Some("35".into()),
                    ..Default::default()
                },
                gps: GpsInput::new("37.51000", "21.5"),
            },
        };
        assert_eq!(form.first_issue(&beaches).unwrap().field, "relocation.gps.lng");
    }

    #[test]
    fn first_offending_triangulation_point_wins() {
        let mut form = valid_form();
        form.triangulation[0].distance = Some("far".into());
        form.triangulation[1].description = None;
        let issue = form.first_issue(&default_beaches()).unwrap();
        assert_eq!(issue.field, "triangulation.1.distance");

        form.triangulation.truncate(1);
        form.triangulation[0] = tri("pole");
        let issue = form.first_issue(&default_beaches()).unwrap();
        assert_eq!(issue.field, "triangulation.2.description");
    }

    #[test]
    fn nest_codes_fill_gaps() {
        let existing = ["KY-1", "KY-3", "LK-2"];
        assert_eq!(next_nest_code(existing, "KY", false), "KY-2");
        assert_eq!(next_nest_code(existing, "KY", false), "KY-2");
        assert_eq!(next_nest_code(["KY1", "KY-2R", "KY-3"], "KY", false), "KY-4");
        assert_eq!(next_nest_code(Vec::<&str>::new(), "LK", true), "LK-1R");
        assert_eq!(next_nest_code(["KYX-1", "KY-0"], "KY", false), "KY-1");
    }

    #[test]
    fn relocated_nest_stores_new_site_and_notes_original() {
        let mut form = valid_form();
        form.notes = Some("tracks washed out".into());
        form.relocation = Relocation::Relocated {
            reason: Some("inundation risk".into()),
            site: SiteInput {
                metrics: SiteMetrics {
                    h: Some("32".into()),
                    big_h: Some("50".into()),
                    ..Default::default()
                },
                gps: GpsInput::new("37.60000", "21.40000"),
            },
        };
        let nest = form
            .prepare(&default_beaches(), &["KY-1".to_string()])
            .unwrap();
        assert_eq!(nest.code, "KY-2R");
        assert!(nest.relocated);
        assert_eq!(nest.gps_lat, Some(37.6));
        assert_eq!(nest.depth_top_egg_h, Some(32.0));
        assert_eq!(nest.depth_bottom_chamber_h, Some(50.0));
        assert_eq!(nest.relocation_reason.as_deref(), Some("inundation risk"));
        assert_eq!(
            nest.notes.as_deref(),
            Some("tracks washed out\nOriginal site: h=30 H=- w=- S=- lat=37.50000 lng=21.50000")
        );
    }

    #[test]
    fn draft_without_relocation_table_is_not_relocated() {
        let raw = r#"
beach = "Kyparissia Bay"
date = "2024-06-14"

[original]
h = 30
gps = { lat = "37.50000", lng = "21.50000" }

[[triangulation]]
description = "pole"
distance = 10
lat = "37.5"
lng = "21.5"
"#;
        let form: NestEntryForm = toml::from_str(raw).unwrap();
        assert_eq!(form.relocation, Relocation::NotRelocated);
        assert_eq!(form.original.metrics.h.as_deref(), Some("30"));
        assert_eq!(
            form.first_issue(&default_beaches()).unwrap().field,
            "triangulation.2.description"
        );
    }
}
