use serde::{Deserialize, Serialize};

use super::{ValidationIssue, filled, text_or_number};

/// Nest chamber measurements as typed (cm): top-egg depth `h`, bottom-of-chamber
/// depth `H`, chamber width `w`, distance to sea `S`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMetrics {
    #[serde(default, deserialize_with = "text_or_number")]
    pub h: Option<String>,
    #[serde(rename = "H", default, deserialize_with = "text_or_number")]
    pub big_h: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub w: Option<String>,
    #[serde(rename = "S", default, deserialize_with = "text_or_number")]
    pub s: Option<String>,
}

pub(crate) fn number(v: &Option<String>) -> Option<f64> {
    filled(v)?.parse::<f64>().ok().filter(|n| n.is_finite())
}

impl SiteMetrics {
    pub fn top_egg(&self) -> Option<f64> {
        number(&self.h)
    }

    pub fn bottom_chamber(&self) -> Option<f64> {
        number(&self.big_h)
    }

    pub fn width(&self) -> Option<f64> {
        number(&self.w)
    }

    pub fn distance_to_sea(&self) -> Option<f64> {
        number(&self.s)
    }

    pub fn has_top_egg(&self) -> bool {
        self.top_egg().is_some()
    }

    /// `h < H` when both are given; a missing value leaves nothing to compare.
    pub fn depth_order_ok(&self) -> bool {
        match (self.top_egg(), self.bottom_chamber()) {
            (Some(h), Some(big_h)) => h < big_h,
            _ => true,
        }
    }

    /// Only `h` was filled; `H`, `w` and `S` are blank.
    pub fn only_top_egg_filled(&self) -> bool {
        self.has_top_egg()
            && filled(&self.big_h).is_none()
            && filled(&self.w).is_none()
            && filled(&self.s).is_none()
    }

    pub fn top_egg_issue(&self, prefix: &str, site: &str) -> Option<ValidationIssue> {
        (!self.has_top_egg()).then(|| {
            ValidationIssue::new(
                format!("{prefix}.h"),
                format!("{site} depth to top egg (h) is required"),
            )
        })
    }

    pub fn depth_order_issue(&self, prefix: &str, site: &str) -> Option<ValidationIssue> {
        (!self.depth_order_ok()).then(|| {
            ValidationIssue::new(
                format!("{prefix}.H"),
                format!("{site} depth to top egg (h) must be less than depth to bottom of chamber (H)"),
            )
        })
    }

    /// Plain `h=.. H=.. w=.. S=..` rendering, blanks shown as `-`.
    pub fn summary(&self) -> String {
        let show = |v: &Option<String>| filled(v).unwrap_or("-").to_string();
        format!(
            "h={} H={} w={} S={}",
            show(&self.h),
            show(&self.big_h),
            show(&self.w),
            show(&self.s)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(h: &str, big_h: &str) -> SiteMetrics {
        SiteMetrics {
            h: Some(h.into()),
            big_h: Some(big_h.into()),
            ..Default::default()
        }
    }

    #[test]
    fn depth_order_blocks_only_when_both_present() {
        assert!(!m("40", "30").depth_order_ok());
        assert!(!m("30", "30").depth_order_ok());
        assert!(m("30", "40").depth_order_ok());
        assert!(m("40", "").depth_order_ok());
        assert!(m("", "10").depth_order_ok());
    }

    #[test]
    fn only_top_egg_detection() {
        assert!(m("25", "").only_top_egg_filled());
        assert!(!m("25", "50").only_top_egg_filled());
        assert!(!m("", "").only_top_egg_filled());
    }

    #[test]
    fn draft_keys_use_field_letters() {
        let raw = "h = \"30\"\nH = 55\nS = \"1200\"\n";
        let parsed: SiteMetrics = toml::from_str(raw).unwrap();
        assert_eq!(parsed.bottom_chamber(), Some(55.0));
        assert_eq!(parsed.distance_to_sea(), Some(1200.0));
        assert_eq!(parsed.summary(), "h=30 H=55 w=- S=1200");
    }
}
