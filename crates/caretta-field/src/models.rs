//! Records exchanged with the REST backend.
//!
//! Every record is created with one POST and afterwards only replaced whole
//! with a PUT, so each struct here is the full payload for both.

use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::TagPosition;

pub type TurtleId = i64;

/// `#[serde(default)]` only covers missing keys; the backend also sends
/// explicit `null` for unset columns.
fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NestStatus {
    #[default]
    Incubating,
    Hatching,
    Hatched,
}

impl NestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NestStatus::Incubating => "incubating",
            NestStatus::Hatching => "hatching",
            NestStatus::Hatched => "hatched",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "incubating" => Some(NestStatus::Incubating),
            "hatching" => Some(NestStatus::Hatching),
            "hatched" => Some(NestStatus::Hatched),
            _ => None,
        }
    }

    /// Status implied by the remaining and total egg counts.
    pub fn from_counts(current: u32, total: u32) -> Self {
        if current == 0 {
            NestStatus::Hatched
        } else if current < total {
            NestStatus::Hatching
        } else {
            NestStatus::Incubating
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationPoint {
    #[serde(deserialize_with = "null_default")]
    pub description: String,
    pub distance: Option<f64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Nest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub code: String,
    #[serde(deserialize_with = "null_default")]
    pub beach: String,
    #[serde(deserialize_with = "null_default")]
    pub date_found: String,
    pub gps_lat: Option<f64>,
    pub gps_long: Option<f64>,
    pub depth_top_egg_h: Option<f64>,
    pub depth_bottom_chamber_h: Option<f64>,
    pub width_w: Option<f64>,
    pub distance_to_sea_s: Option<f64>,
    #[serde(deserialize_with = "null_default")]
    pub relocated: bool,
    pub relocation_reason: Option<String>,
    #[serde(deserialize_with = "null_default")]
    pub triangulation: Vec<TriangulationPoint>,
    pub total_num_eggs: Option<u32>,
    pub current_num_eggs: Option<u32>,
    #[serde(deserialize_with = "null_default")]
    pub status: NestStatus,
    #[serde(deserialize_with = "null_default")]
    pub is_archived: bool,
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Nest {
    /// Path key for `PUT /nests/:id/update`: numeric id when known, else the code.
    pub fn update_key(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => self.code.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NestEventType {
    Discovery,
    #[default]
    FullInventory,
    PartialInventory,
    TopEgg,
    Emergence,
    Hatching,
}

impl NestEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            NestEventType::Discovery => "DISCOVERY",
            NestEventType::FullInventory => "FULL_INVENTORY",
            NestEventType::PartialInventory => "PARTIAL_INVENTORY",
            NestEventType::TopEgg => "TOP_EGG",
            NestEventType::Emergence => "EMERGENCE",
            NestEventType::Hatching => "HATCHING",
        }
    }

    pub fn is_inventory(self) -> bool {
        matches!(
            self,
            NestEventType::FullInventory | NestEventType::PartialInventory
        )
    }
}

/// One embryonic-stage bucket: eggs counted plus contamination sub-counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTally {
    #[serde(deserialize_with = "null_default")]
    pub count: u32,
    #[serde(deserialize_with = "null_default")]
    pub black_fungus: u32,
    #[serde(deserialize_with = "null_default")]
    pub pink_bacteria: u32,
    #[serde(deserialize_with = "null_default")]
    pub green_bacteria: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contamination {
    BlackFungus,
    PinkBacteria,
    GreenBacteria,
}

impl StageTally {
    pub fn sub(&self, kind: Contamination) -> u32 {
        match kind {
            Contamination::BlackFungus => self.black_fungus,
            Contamination::PinkBacteria => self.pink_bacteria,
            Contamination::GreenBacteria => self.green_bacteria,
        }
    }

    fn sub_mut(&mut self, kind: Contamination) -> &mut u32 {
        match kind {
            Contamination::BlackFungus => &mut self.black_fungus,
            Contamination::PinkBacteria => &mut self.pink_bacteria,
            Contamination::GreenBacteria => &mut self.green_bacteria,
        }
    }

    pub fn increment(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Lowers the count; sub-counts above the new count are pulled down with it.
    pub fn decrement(&mut self) {
        self.count = self.count.saturating_sub(1);
        let cap = self.count;
        for kind in [
            Contamination::BlackFungus,
            Contamination::PinkBacteria,
            Contamination::GreenBacteria,
        ] {
            let slot = self.sub_mut(kind);
            *slot = (*slot).min(cap);
        }
    }

    /// Returns false (and changes nothing) when the sub-count already equals the count.
    pub fn increment_sub(&mut self, kind: Contamination) -> bool {
        let cap = self.count;
        let slot = self.sub_mut(kind);
        if *slot >= cap {
            return false;
        }
        *slot += 1;
        true
    }

    pub fn decrement_sub(&mut self, kind: Contamination) {
        let slot = self.sub_mut(kind);
        *slot = slot.saturating_sub(1);
    }

    pub fn is_consistent(&self) -> bool {
        self.black_fungus <= self.count
            && self.pink_bacteria <= self.count
            && self.green_bacteria <= self.count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Hatched,
    NoVisibleEmbryo,
    EarlyEmbryo,
    MiddleEmbryo,
    LateEmbryo,
    Pipped,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Hatched,
        Stage::NoVisibleEmbryo,
        Stage::EarlyEmbryo,
        Stage::MiddleEmbryo,
        Stage::LateEmbryo,
        Stage::Pipped,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Hatched => "hatched",
            Stage::NoVisibleEmbryo => "no visible embryo",
            Stage::EarlyEmbryo => "early embryo",
            Stage::MiddleEmbryo => "middle embryo",
            Stage::LateEmbryo => "late embryo",
            Stage::Pipped => "pipped",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbryonicStages {
    #[serde(deserialize_with = "null_default")]
    pub hatched: StageTally,
    #[serde(deserialize_with = "null_default")]
    pub no_visible_embryo: StageTally,
    #[serde(deserialize_with = "null_default")]
    pub early_embryo: StageTally,
    #[serde(deserialize_with = "null_default")]
    pub middle_embryo: StageTally,
    #[serde(deserialize_with = "null_default")]
    pub late_embryo: StageTally,
    #[serde(deserialize_with = "null_default")]
    pub pipped: StageTally,
}

impl EmbryonicStages {
    pub fn get(&self, stage: Stage) -> &StageTally {
        match stage {
            Stage::Hatched => &self.hatched,
            Stage::NoVisibleEmbryo => &self.no_visible_embryo,
            Stage::EarlyEmbryo => &self.early_embryo,
            Stage::MiddleEmbryo => &self.middle_embryo,
            Stage::LateEmbryo => &self.late_embryo,
            Stage::Pipped => &self.pipped,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut StageTally {
        match stage {
            Stage::Hatched => &mut self.hatched,
            Stage::NoVisibleEmbryo => &mut self.no_visible_embryo,
            Stage::EarlyEmbryo => &mut self.early_embryo,
            Stage::MiddleEmbryo => &mut self.middle_embryo,
            Stage::LateEmbryo => &mut self.late_embryo,
            Stage::Pipped => &mut self.pipped,
        }
    }

    pub fn total(&self) -> u32 {
        Stage::ALL.iter().map(|s| self.get(*s).count).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HatchlingTally {
    #[serde(deserialize_with = "null_default")]
    pub alive_within_nest: u32,
    #[serde(deserialize_with = "null_default")]
    pub dead_within_nest: u32,
    #[serde(deserialize_with = "null_default")]
    pub alive_above_nest: u32,
    #[serde(deserialize_with = "null_default")]
    pub dead_above_nest: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub nest_code: String,
    #[serde(deserialize_with = "null_default")]
    pub event_type: NestEventType,
    pub observer: Option<String>,
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub notes: Option<String>,

    pub original_depth_top_egg_h: Option<f64>,
    pub original_depth_bottom_chamber_h: Option<f64>,
    pub original_width_w: Option<f64>,
    pub original_distance_to_sea_s: Option<f64>,
    pub original_gps_lat: Option<f64>,
    pub original_gps_long: Option<f64>,

    pub reburied_depth_top_egg_h: Option<f64>,
    pub reburied_depth_bottom_chamber_h: Option<f64>,
    pub reburied_width_w: Option<f64>,
    pub reburied_distance_to_sea_s: Option<f64>,
    pub reburied_gps_lat: Option<f64>,
    pub reburied_gps_long: Option<f64>,
    #[serde(deserialize_with = "null_default")]
    pub eggs_reburied: u32,

    #[serde(flatten)]
    pub stages: EmbryonicStages,
    #[serde(flatten)]
    pub hatchlings: HatchlingTally,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurements {
    pub scl_max: Option<f64>,
    pub scl_min: Option<f64>,
    pub scw: Option<f64>,
    pub ccl_max: Option<f64>,
    pub ccl_min: Option<f64>,
    pub ccw: Option<f64>,
    pub tail_extension: Option<f64>,
    pub vent_to_tail_tip: Option<f64>,
    pub total_tail_length: Option<f64>,
}

impl Measurements {
    pub const FIELDS: [&'static str; 9] = [
        "scl_max",
        "scl_min",
        "scw",
        "ccl_max",
        "ccl_min",
        "ccw",
        "tail_extension",
        "vent_to_tail_tip",
        "total_tail_length",
    ];

    pub fn values(&self) -> [Option<f64>; 9] {
        [
            self.scl_max,
            self.scl_min,
            self.scw,
            self.ccl_max,
            self.ccl_min,
            self.ccw,
            self.tail_extension,
            self.vent_to_tail_tip,
            self.total_tail_length,
        ]
    }
}

/// The four flipper tags with their body-location addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipperTags {
    pub front_left_tag: Option<String>,
    pub front_left_address: Option<String>,
    pub front_right_tag: Option<String>,
    pub front_right_address: Option<String>,
    pub rear_left_tag: Option<String>,
    pub rear_left_address: Option<String>,
    pub rear_right_tag: Option<String>,
    pub rear_right_address: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl FlipperTags {
    pub fn tag(&self, pos: TagPosition) -> Option<&str> {
        match pos {
            TagPosition::FrontLeft => non_empty(&self.front_left_tag),
            TagPosition::FrontRight => non_empty(&self.front_right_tag),
            TagPosition::RearLeft => non_empty(&self.rear_left_tag),
            TagPosition::RearRight => non_empty(&self.rear_right_tag),
        }
    }

    pub fn address(&self, pos: TagPosition) -> Option<&str> {
        match pos {
            TagPosition::FrontLeft => non_empty(&self.front_left_address),
            TagPosition::FrontRight => non_empty(&self.front_right_address),
            TagPosition::RearLeft => non_empty(&self.rear_left_address),
            TagPosition::RearRight => non_empty(&self.rear_right_address),
        }
    }

    pub fn set_tag(&mut self, pos: TagPosition, value: Option<String>) {
        match pos {
            TagPosition::FrontLeft => self.front_left_tag = value,
            TagPosition::FrontRight => self.front_right_tag = value,
            TagPosition::RearLeft => self.rear_left_tag = value,
            TagPosition::RearRight => self.rear_right_tag = value,
        }
    }

    /// Non-empty tags in position order.
    pub fn present(&self) -> Vec<(TagPosition, &str)> {
        TagPosition::ALL
            .iter()
            .filter_map(|p| self.tag(*p).map(|t| (*p, t)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Turtle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<TurtleId>,
    #[serde(deserialize_with = "null_default")]
    pub species: String,
    pub sex: Option<String>,
    pub health_condition: Option<String>,
    #[serde(flatten)]
    pub tags: FlipperTags,
    #[serde(flatten)]
    pub measurements: Measurements,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurtleEventType {
    #[default]
    Tagging,
    NightSurvey,
}

impl TurtleEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            TurtleEventType::Tagging => "TAGGING",
            TurtleEventType::NightSurvey => "NIGHT_SURVEY",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyTimes {
    pub time_first_seen: Option<String>,
    pub time_start_egg_laying: Option<String>,
    pub time_covering: Option<String>,
    pub time_end_camouflage: Option<String>,
    pub time_reach_sea: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurtleEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub turtle_id: TurtleId,
    #[serde(deserialize_with = "null_default")]
    pub event_type: TurtleEventType,
    #[serde(deserialize_with = "null_default")]
    pub event_date: String,
    pub observer: Option<String>,
    pub location: Option<String>,
    pub gps_lat: Option<f64>,
    pub gps_long: Option<f64>,
    pub nest_code: Option<String>,
    #[serde(flatten)]
    pub tags: FlipperTags,
    #[serde(flatten)]
    pub measurements: Measurements,
    #[serde(flatten)]
    pub times: SurveyTimes,
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_counts() {
        assert_eq!(NestStatus::from_counts(0, 100), NestStatus::Hatched);
        assert_eq!(NestStatus::from_counts(40, 100), NestStatus::Hatching);
        assert_eq!(NestStatus::from_counts(100, 100), NestStatus::Incubating);
    }

    #[test]
    fn sub_counts_never_exceed_stage_count() {
        let mut t = StageTally::default();
        assert!(!t.increment_sub(Contamination::BlackFungus));
        t.increment();
        t.increment();
        assert!(t.increment_sub(Contamination::BlackFungus));
        assert!(t.increment_sub(Contamination::BlackFungus));
        assert!(!t.increment_sub(Contamination::BlackFungus));
        t.decrement();
        assert_eq!(t.count, 1);
        assert_eq!(t.black_fungus, 1);
        t.decrement();
        t.decrement();
        assert_eq!(t, StageTally::default());
        assert!(t.is_consistent());
    }

    #[test]
    fn nest_event_serializes_stages_as_nested_objects() {
        let mut ev = NestEvent {
            nest_code: "KY-4".into(),
            event_type: NestEventType::TopEgg,
            ..Default::default()
        };
        ev.stages.hatched.count = 12;
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event_type"], "TOP_EGG");
        assert_eq!(v["hatched"]["count"], 12);
        assert_eq!(v["alive_within_nest"], 0);
        assert!(v.get("id").is_none());
    }

    #[test]
    fn turtle_tags_flatten_on_the_wire() {
        let raw = r#"{"id":7,"species":"Caretta caretta","front_left_tag":"KF-2001","scl_max":71.5}"#;
        let t: Turtle = serde_json::from_str(raw).unwrap();
        assert_eq!(t.tags.tag(TagPosition::FrontLeft), Some("KF-2001"));
        assert_eq!(t.tags.tag(TagPosition::RearRight), None);
        assert_eq!(t.measurements.scl_max, Some(71.5));
    }
}
