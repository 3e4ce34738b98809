//! Client-side form validation and submit orchestration.
//!
//! Each form is a plain struct deserialized from a TOML draft (the CLI) or
//! filled field by field (the TUI). Validation runs a fixed, ordered list of
//! rules and reports the first failure together with the field to jump to.

use std::fmt;

pub mod coords;
pub mod metrics;
pub mod nest_entry;
pub mod nest_inventory;
pub mod night_survey;
pub mod tagging;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending input, e.g. `triangulation.1.lat`.
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.field)
    }
}

/// Outcome of one named rule, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub rule: &'static str,
    pub issue: Option<ValidationIssue>,
}

impl RuleOutcome {
    pub fn pass(rule: &'static str) -> Self {
        Self { rule, issue: None }
    }

    pub fn fail(rule: &'static str, issue: ValidationIssue) -> Self {
        Self {
            rule,
            issue: Some(issue),
        }
    }

    pub fn check(rule: &'static str, ok: bool, issue: impl FnOnce() -> ValidationIssue) -> Self {
        if ok {
            Self::pass(rule)
        } else {
            Self::fail(rule, issue())
        }
    }

    pub fn passed(&self) -> bool {
        self.issue.is_none()
    }
}

/// First failing rule wins; `None` means the form can be saved.
pub fn first_issue(outcomes: &[RuleOutcome]) -> Option<&ValidationIssue> {
    outcomes.iter().find_map(|o| o.issue.as_ref())
}

/// Trimmed text, or `None` when blank.
pub(crate) fn filled(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn owned(v: &Option<String>) -> Option<String> {
    filled(v).map(ToOwned::to_owned)
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Int(i64),
    Float(f64),
}

/// Accepts `h = "30"` as well as `h = 30` in drafts; the value is kept as text
/// so format rules (e.g. five decimals) still apply to what was typed.
pub(crate) fn text_or_number<'de, D>(d: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v: Option<TextOrNumber> = serde::Deserialize::deserialize(d)?;
    Ok(v.map(|v| match v {
        TextOrNumber::Text(s) => s,
        TextOrNumber::Int(i) => i.to_string(),
        TextOrNumber::Float(f) => f.to_string(),
    }))
}
