mod common;

use caretta_field::error::ErrorKind;
use caretta_field::forms::nest_inventory::{self, NestInventoryForm};
use caretta_field::models::{Nest, NestEventType, NestStatus};

use common::Recording;

fn draft(reburied: u32) -> String {
    format!(
        r#"
observer = "M. Rees"
date = "2024-08-20"
start_time = "07:10"
end_time = "08:05"
eggs_reburied = {reburied}

[original]
h = 28
H = 55

[original.gps]
lat = "37.50000"
lng = "21.50000"

[reburied]
h = 25

[reburied.gps]
lat = "37.50100"
lng = "21.50100"

[stages.hatched]
count = 90
black_fungus = 2

[stages.early_embryo]
count = 5

[hatchlings]
alive_within_nest = 3
"#
    )
}

fn nest() -> Nest {
    Nest {
        id: Some(41),
        code: "KY-7".into(),
        beach: "Kyparissia Bay".into(),
        date_found: "2024-06-10".into(),
        total_num_eggs: Some(100),
        current_num_eggs: Some(100),
        status: NestStatus::Incubating,
        ..Default::default()
    }
}

#[test]
fn balanced_count_saves_event_then_updates_nest() {
    let form: NestInventoryForm = toml::from_str(&draft(5)).expect("draft parses");
    let backend = Recording::with_nests(vec![nest()]);

    let out = nest_inventory::submit(&backend, "KY-7", &form).expect("submit");

    assert_eq!(
        backend.calls(),
        vec!["get_nest", "create_nest_event", "update_nest"]
    );
    assert_eq!(out.event.event_type, NestEventType::PartialInventory);
    assert_eq!(out.event.stages.hatched.black_fungus, 2);
    assert_eq!(out.event.reburied_gps_lat, Some(37.501));
    assert_eq!(out.event.start_time.as_deref(), Some("2024-08-20T07:10:00"));
    assert!(out.nest_update_error.is_none());

    let updated = out.nest.expect("nest updated");
    assert_eq!(updated.total_num_eggs, Some(100));
    assert_eq!(updated.current_num_eggs, Some(5));
    assert_eq!(updated.status, NestStatus::Hatching);
}

#[test]
fn mismatch_blocks_before_any_write() {
    let form: NestInventoryForm = toml::from_str(&draft(4)).expect("draft parses");
    let backend = Recording::with_nests(vec![nest()]);

    let err = nest_inventory::submit(&backend, "KY-7", &form).unwrap_err();

    assert_eq!(backend.calls(), vec!["get_nest"]);
    assert_eq!(
        err.kind(),
        &ErrorKind::Validation {
            field: "stages".into()
        }
    );
    assert!(err.message().contains("recorded 99 != expected 100"), "{err}");
}

#[test]
fn top_egg_override_skips_reconciliation_and_keeps_counts() {
    let mut form: NestInventoryForm = toml::from_str(&draft(4)).expect("draft parses");
    form.top_egg_check = true;
    let backend = Recording::with_nests(vec![nest()]);

    let out = nest_inventory::submit(&backend, "KY-7", &form).expect("submit");

    assert_eq!(out.event.event_type, NestEventType::TopEgg);
    let updated = out.nest.expect("nest updated");
    assert_eq!(updated.current_num_eggs, Some(100));
    assert_eq!(updated.status, NestStatus::Incubating);
}

#[test]
fn failed_nest_update_is_reported_without_rollback() {
    let form: NestInventoryForm = toml::from_str(&draft(5)).expect("draft parses");
    let backend = Recording::with_nests(vec![nest()]).failing("update_nest");

    let out = nest_inventory::submit(&backend, "KY-7", &form).expect("event still saved");

    assert!(out.nest.is_none());
    assert!(
        out.nest_update_error
            .as_deref()
            .is_some_and(|e| e.contains("update_nest exploded"))
    );
    assert_eq!(backend.nest_events.borrow().len(), 1);
    assert_eq!(backend.nests.borrow()[0].current_num_eggs, Some(100));
}

#[test]
fn full_inventory_after_top_egg_check_on_fresh_nest_is_not_blocked() {
    let fresh = Nest {
        total_num_eggs: None,
        current_num_eggs: None,
        ..nest()
    };
    let backend = Recording::with_nests(vec![fresh]);

    let mut spot: NestInventoryForm = toml::from_str(&draft(0)).expect("draft parses");
    spot.top_egg_check = true;
    spot.stages = Default::default();
    spot.stages.hatched.count = 3;
    let out = nest_inventory::submit(&backend, "KY-7", &spot).expect("top-egg check");
    let after_spot = out.nest.expect("nest updated");
    assert_eq!(after_spot.total_num_eggs, Some(3));
    assert_eq!(after_spot.current_num_eggs, None);

    let mut full: NestInventoryForm = toml::from_str(&draft(0)).expect("draft parses");
    full.stages.late_embryo.count = 5;
    let out = nest_inventory::submit(&backend, "KY-7", &full).expect("full inventory of 100");

    assert_eq!(out.event.event_type, NestEventType::FullInventory);
    assert_eq!(out.event.stages.total(), 100);
    let updated = out.nest.expect("nest updated");
    assert_eq!(updated.current_num_eggs, Some(0));
    assert_eq!(updated.status, NestStatus::Hatched);
    assert_eq!(backend.nest_events.borrow().len(), 2);
}
