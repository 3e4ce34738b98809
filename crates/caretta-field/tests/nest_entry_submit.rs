mod common;

use caretta_field::catalog::default_beaches;
use caretta_field::error::ErrorKind;
use caretta_field::forms::nest_entry::{self, NestEntryForm};
use caretta_field::models::{Nest, NestStatus};

use common::Recording;

const DRAFT: &str = r#"
beach = "Kyparissia Bay"
date = "2024-06-14"
notes = "tracks from the north"

[original]
h = 30

[original.gps]
lat = "37.50000"
lng = "21.50000"

[[triangulation]]
description = "taverna pole"
distance = 12.5
lat = "37.50010"
lng = "21.50010"

[[triangulation]]
description = "dune fence"
distance = 8
lat = "37.49990"
lng = "21.49990"
"#;

fn existing(code: &str) -> Nest {
    Nest {
        code: code.into(),
        beach: "Kyparissia Bay".into(),
        ..Default::default()
    }
}

#[test]
fn valid_draft_creates_exactly_one_nest() {
    let form: NestEntryForm = toml::from_str(DRAFT).expect("draft parses");
    let backend = Recording::with_nests(vec![existing("KY-1"), existing("KY-3")]);

    let created = nest_entry::submit(&backend, &form, &default_beaches()).expect("submit");

    assert_eq!(backend.calls(), vec!["list_nests", "create_nest"]);
    assert_eq!(created.code, "KY-2");

    let sent = serde_json::to_value(&created).unwrap();
    assert_eq!(sent["depth_top_egg_h"], 30.0);
    assert_eq!(sent["gps_lat"], 37.5);
    assert_eq!(sent["status"], "incubating");
    assert_eq!(sent["relocated"], false);
    assert_eq!(sent["triangulation"].as_array().map(Vec::len), Some(2));
    assert_eq!(created.status, NestStatus::Incubating);
}

#[test]
fn invalid_coordinates_block_without_any_request() {
    let draft = DRAFT.replace("lat = \"37.50000\"", "lat = \"37.5\"");
    let form: NestEntryForm = toml::from_str(&draft).expect("draft parses");
    let backend = Recording::default();

    let err = nest_entry::submit(&backend, &form, &default_beaches()).unwrap_err();

    assert!(backend.calls().is_empty());
    assert_eq!(
        err.kind(),
        &ErrorKind::Validation {
            field: "original.gps.lat".into()
        }
    );
}

#[test]
fn relocated_draft_stores_new_site_and_notes_original() {
    let draft = format!(
        "{DRAFT}\n[relocation]\nreason = \"flooding\"\n[relocation.site]\nh = 35\nH = 60\n[relocation.site.gps]\nlat = \"37.51000\"\nlng = \"21.51000\"\n"
    );
    let form: NestEntryForm = toml::from_str(&draft).expect("draft parses");
    let backend = Recording::with_nests(vec![existing("KY-1")]);

    let created = nest_entry::submit(&backend, &form, &default_beaches()).expect("submit");

    assert_eq!(created.code, "KY-2R");
    assert!(created.relocated);
    assert_eq!(created.depth_top_egg_h, Some(35.0));
    assert_eq!(created.depth_bottom_chamber_h, Some(60.0));
    assert_eq!(created.gps_lat, Some(37.51));
    assert_eq!(created.relocation_reason.as_deref(), Some("flooding"));
    let notes = created.notes.unwrap_or_default();
    assert!(notes.contains("tracks from the north"));
    assert!(notes.contains("Original site:"));
    assert!(notes.contains("37.50000"));
}

#[test]
fn backend_failure_is_returned_not_retried() {
    let form: NestEntryForm = toml::from_str(DRAFT).expect("draft parses");
    let backend = Recording::default().failing("create_nest");

    let err = nest_entry::submit(&backend, &form, &default_beaches()).unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(backend.calls(), vec!["list_nests", "create_nest"]);
}
