//! Fixed reference data: nesting beaches, species names and flipper tag positions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beach {
    pub name: String,
    /// Two-letter prefix used in nest codes (e.g. `KY` for `KY-12`).
    pub abbrev: String,
}

impl Beach {
    pub fn new(name: &str, abbrev: &str) -> Self {
        Self {
            name: name.to_string(),
            abbrev: abbrev.to_string(),
        }
    }
}

pub fn default_beaches() -> Vec<Beach> {
    vec![
        Beach::new("Kyparissia Bay", "KY"),
        Beach::new("Lakonikos Bay", "LK"),
        Beach::new("Rethymno", "RE"),
        Beach::new("Chania", "CH"),
        Beach::new("Zakynthos", "ZA"),
        Beach::new("Koroni", "KO"),
    ]
}

pub fn find_beach<'a>(beaches: &'a [Beach], name: &str) -> Option<&'a Beach> {
    let name = name.trim();
    beaches
        .iter()
        .find(|b| b.name.eq_ignore_ascii_case(name) || b.abbrev.eq_ignore_ascii_case(name))
}

const SPECIES: &[(&str, &str)] = &[
    ("Caretta caretta", "Loggerhead"),
    ("Chelonia mydas", "Green"),
    ("Dermochelys coriacea", "Leatherback"),
    ("Eretmochelys imbricata", "Hawksbill"),
    ("Lepidochelys kempii", "Kemp's Ridley"),
    ("Lepidochelys olivacea", "Olive Ridley"),
];

/// Common name for a scientific name; unknown names pass through unchanged.
pub fn common_name(scientific: &str) -> &str {
    let s = scientific.trim();
    SPECIES
        .iter()
        .find(|(sci, _)| sci.eq_ignore_ascii_case(s))
        .map(|(_, common)| *common)
        .unwrap_or(s)
}

/// Scientific name for a common name; unknown names pass through unchanged.
pub fn scientific_name(common: &str) -> &str {
    let c = common.trim();
    SPECIES
        .iter()
        .find(|(sci, name)| name.eq_ignore_ascii_case(c) || sci.eq_ignore_ascii_case(c))
        .map(|(sci, _)| *sci)
        .unwrap_or(c)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPosition {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl TagPosition {
    pub const ALL: [TagPosition; 4] = [
        TagPosition::FrontLeft,
        TagPosition::FrontRight,
        TagPosition::RearLeft,
        TagPosition::RearRight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TagPosition::FrontLeft => "front left",
            TagPosition::FrontRight => "front right",
            TagPosition::RearLeft => "rear left",
            TagPosition::RearRight => "rear right",
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            TagPosition::FrontLeft => "front_left_tag",
            TagPosition::FrontRight => "front_right_tag",
            TagPosition::RearLeft => "rear_left_tag",
            TagPosition::RearRight => "rear_right_tag",
        }
    }
}
