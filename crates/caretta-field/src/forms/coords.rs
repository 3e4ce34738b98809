use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ValidationIssue, filled, text_or_number};

static COORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}\.\d{5}$").expect("coordinate regex"));

fn in_range(raw: &str, limit: f64) -> bool {
    let raw = raw.trim();
    if !COORD_RE.is_match(raw) {
        return false;
    }
    raw.parse::<f64>()
        .map(|v| (-limit..=limit).contains(&v))
        .unwrap_or(false)
}

/// Exactly five fractional digits and within [-90, 90].
pub fn is_lat_valid(raw: &str) -> bool {
    in_range(raw, 90.0)
}

/// Exactly five fractional digits and within [-180, 180].
pub fn is_lng_valid(raw: &str) -> bool {
    in_range(raw, 180.0)
}

/// Raw GPS text as typed into a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsInput {
    #[serde(default, deserialize_with = "text_or_number")]
    pub lat: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub lng: Option<String>,
}

impl GpsInput {
    pub fn new(lat: &str, lng: &str) -> Self {
        Self {
            lat: Some(lat.to_string()),
            lng: Some(lng.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        filled(&self.lat).is_none() && filled(&self.lng).is_none()
    }

    pub fn lat_issue(&self, prefix: &str, site: &str) -> Option<ValidationIssue> {
        let ok = filled(&self.lat).is_some_and(is_lat_valid);
        (!ok).then(|| {
            ValidationIssue::new(
                format!("{prefix}.lat"),
                format!("{site} latitude must be between -90 and 90 with exactly 5 decimals (e.g. 37.50000)"),
            )
        })
    }

    pub fn lng_issue(&self, prefix: &str, site: &str) -> Option<ValidationIssue> {
        let ok = filled(&self.lng).is_some_and(is_lng_valid);
        (!ok).then(|| {
            ValidationIssue::new(
                format!("{prefix}.lng"),
                format!("{site} longitude must be between -180 and 180 with exactly 5 decimals (e.g. 21.50000)"),
            )
        })
    }

    /// Parsed pair; only meaningful once both checks passed.
    pub fn parsed(&self) -> Option<(f64, f64)> {
        let lat = filled(&self.lat)?.parse().ok()?;
        let lng = filled(&self.lng)?.parse().ok()?;
        Some((lat, lng))
    }
}
