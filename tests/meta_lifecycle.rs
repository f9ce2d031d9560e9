use std::sync::Arc;
use std::thread;

use feedstore::core::{Error, ManualClock};
use feedstore::meta::{Condition, Criteria, MetaField, MetaService, Status};
use feedstore::MetaProperties;
use tempfile::tempdir;

fn service_at(now_ms: u64) -> (Arc<ManualClock>, MetaService) {
    let clock = Arc::new(ManualClock::new(now_ms));
    let service = MetaService::in_memory(clock.clone());
    (clock, service)
}

#[test]
fn create_unlock_delete_stamps_the_clock() {
    let (clock, service) = service_at(1_000);
    let meta = service.create(MetaProperties::new("F", "T")).expect("create");
    assert_eq!(meta.status, Status::Locked);
    assert_eq!(meta.created_at_ms, 1_000);
    assert_eq!(meta.effective_at_ms, Some(1_000));

    clock.advance(50);
    let unlocked = service
        .update_status(&meta, Status::Locked, Status::Unlocked)
        .expect("unlock");
    assert_eq!(unlocked.status_changed_at_ms, 1_050);

    clock.advance(50);
    assert_eq!(service.soft_delete(meta.id, true).expect("delete"), 1);
    let deleted = service.get(meta.id).expect("get");
    assert_eq!(deleted.status, Status::Deleted);
    assert_eq!(deleted.status_changed_at_ms, 1_100);
    assert_eq!(service.soft_delete(meta.id, true).expect("again"), 0);
}

#[test]
fn stale_expectation_is_a_status_conflict() {
    let (_clock, service) = service_at(0);
    let meta = service.create(MetaProperties::new("F", "T")).expect("create");
    service
        .update_status(&meta, Status::Locked, Status::Unlocked)
        .expect("unlock");
    match service.update_status(&meta, Status::Locked, Status::Unlocked) {
        Err(Error::StatusConflict {
            id,
            expected,
            actual,
        }) => {
            assert_eq!(id, meta.id);
            assert_eq!(expected, Status::Locked);
            assert_eq!(actual, Status::Unlocked);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        service.update_status(&meta, Status::Unlocked, Status::Locked),
        Err(Error::InvalidTransition { .. })
    ));
}

#[test]
fn locked_metas_survive_delete_unless_forced() {
    let (_clock, service) = service_at(0);
    let locked = service.create(MetaProperties::new("F", "T")).expect("create");
    assert_eq!(service.soft_delete(locked.id, true).expect("delete"), 0);
    assert_eq!(service.get(locked.id).expect("get").status, Status::Locked);
    assert_eq!(service.soft_delete(locked.id, false).expect("force"), 1);
    assert_eq!(service.get(locked.id).expect("get").status, Status::Deleted);
}

#[test]
fn effective_time_follows_parent_then_explicit_then_created() {
    let (clock, service) = service_at(10_000);
    let parent = service
        .create(MetaProperties::new("RAW", "Raw Events").effective_at(1_234))
        .expect("parent");
    assert_eq!(parent.effective_at_ms, Some(1_234));

    clock.advance(1_000);
    let child = service
        .create(
            MetaProperties::new("RAW", "Events")
                .parent(parent.id)
                .effective_at(9_999),
        )
        .expect("child");
    assert_eq!(child.parent_meta_id, Some(parent.id));
    assert_eq!(child.effective_at_ms, Some(1_234));

    let plain = service.create(MetaProperties::new("RAW", "Events")).expect("plain");
    assert_eq!(plain.effective_at_ms, Some(11_000));

    assert!(service
        .create(MetaProperties::new("RAW", "Events").parent(999))
        .expect_err("missing parent")
        .is_not_found());
}

#[test]
fn find_evaluates_criteria_in_id_order() {
    let (_clock, service) = service_at(0);
    for (feed, type_name) in [("A", "Raw"), ("B", "Raw"), ("A", "Events"), ("A", "Raw")] {
        let meta = service
            .create(MetaProperties::new(feed, type_name).processor(7, 1))
            .expect("create");
        if type_name == "Raw" {
            service
                .update_status(&meta, Status::Locked, Status::Unlocked)
                .expect("unlock");
        }
    }

    let raw_a = Criteria::feed("A").and(Criteria::type_name("Raw"));
    let ids: Vec<u64> = service.find(&raw_a).iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 4]);

    let not_a = Criteria::feed("A").negate();
    assert_eq!(service.count(&not_a), 1);

    let locked_or_b = Criteria::status(Status::Locked).or(Criteria::feed("B"));
    let ids: Vec<u64> = service.find(&locked_or_b).iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2, 3]);

    let later = Criteria::term(MetaField::Id, Condition::GreaterThan, 2u64);
    assert_eq!(service.count(&later), 2);
    assert_eq!(service.count(&Criteria::is_null(MetaField::ParentId)), 4);
    assert_eq!(service.count(&Criteria::is_null(MetaField::ProcessorId)), 0);
}

#[test]
fn concurrent_creates_get_distinct_ids() {
    let (_clock, service) = service_at(0);
    let service = Arc::new(service);
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                (0..25)
                    .map(|i| {
                        service
                            .create(MetaProperties::new(format!("F{t}"), format!("T{i}")))
                            .expect("create")
                            .id
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("join"))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 200);
    assert_eq!(ids.first(), Some(&1));
    assert_eq!(ids.last(), Some(&200));
}

#[test]
fn catalog_reopens_with_statuses_and_next_id() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("catalog.json");
    let clock = Arc::new(ManualClock::new(0));
    let kept = {
        let service = MetaService::open(&path, clock.clone()).expect("open");
        let kept = service.create(MetaProperties::new("F", "T")).expect("create");
        service
            .update_status(&kept, Status::Locked, Status::Unlocked)
            .expect("unlock");
        let dropped = service.create(MetaProperties::new("F", "T")).expect("create");
        service.soft_delete(dropped.id, false).expect("delete");
        kept
    };

    let service = MetaService::open(&path, clock).expect("reopen");
    assert_eq!(service.get(kept.id).expect("get").status, Status::Unlocked);
    assert_eq!(service.count(&Criteria::status(Status::Deleted)), 1);
    let next = service.create(MetaProperties::new("F", "T")).expect("create");
    assert_eq!(next.id, 3);
}
