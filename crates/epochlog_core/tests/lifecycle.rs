use chrono::{DateTime, Duration, FixedOffset};
use epochlog_core::{
    Entity, EpochPersistor, OpenGroupPolicy, PersistorError, PersistorOptions,
};

fn start() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2024-05-01T09:00:00-07:00").unwrap()
}

fn at(minutes: i64) -> DateTime<FixedOffset> {
    start() + Duration::minutes(minutes)
}

fn persistor_with(policy: OpenGroupPolicy) -> EpochPersistor {
    EpochPersistor::open_in_memory(PersistorOptions {
        open_group_policy: policy,
        ..PersistorOptions::default()
    })
    .unwrap()
}

#[test]
fn epoch_groups_nest_and_close_lifo() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    persistor.begin_experiment("nesting", at(0)).unwrap();

    let outer = persistor.begin_epoch_group("outer", &cell, at(1)).unwrap();
    let middle = persistor.begin_epoch_group("middle", &cell, at(2)).unwrap();
    let inner = persistor.begin_epoch_group("inner", &cell, at(3)).unwrap();
    assert_eq!(persistor.open_epoch_groups(), &[outer, middle, inner]);

    assert_eq!(persistor.end_epoch_group(at(4)).unwrap(), inner);
    assert_eq!(persistor.current_epoch_group(), Some(middle));
    assert_eq!(persistor.end_epoch_group(at(5)).unwrap(), middle);
    assert_eq!(persistor.end_epoch_group(at(6)).unwrap(), outer);
    assert_eq!(persistor.current_epoch_group(), None);

    assert_eq!(persistor.child_epoch_groups(&outer).unwrap(), vec![middle]);
    assert_eq!(persistor.child_epoch_groups(&middle).unwrap(), vec![inner]);
    assert_eq!(persistor.end_time(&inner).unwrap(), Some(at(4)));
    assert!(!persistor.is_open(&outer).unwrap());
}

#[test]
fn second_begin_experiment_is_invalid_state() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let first = persistor.begin_experiment("first", at(0)).unwrap();

    let err = persistor.begin_experiment("second", at(1)).unwrap_err();
    assert!(matches!(err, PersistorError::InvalidState(_)));
    assert_eq!(persistor.current_experiment(), Some(first));
    assert_eq!(persistor.experiments().unwrap(), vec![first]);
}

#[test]
fn ending_without_open_entities_is_invalid_state() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    assert!(matches!(
        persistor.end_experiment(at(0)).unwrap_err(),
        PersistorError::InvalidState(_)
    ));
    assert!(matches!(
        persistor.end_epoch_group(at(0)).unwrap_err(),
        PersistorError::InvalidState(_)
    ));
}

#[test]
fn begin_epoch_group_requires_open_experiment() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let cell = persistor.add_source("Cell 1", None).unwrap();

    let err = persistor
        .begin_epoch_group("orphan", &cell, at(0))
        .unwrap_err();
    assert!(matches!(err, PersistorError::InvalidState(_)));
    assert!(persistor.source_epoch_groups(&cell).unwrap().is_empty());
}

#[test]
fn experiment_round_trips_purpose_and_times_with_offset() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let experiment = persistor.begin_experiment("patch clamp", at(0)).unwrap();
    assert!(persistor.is_open(&experiment).unwrap());
    persistor.end_experiment(at(90)).unwrap();

    assert_eq!(persistor.purpose(&experiment).unwrap(), "patch clamp");
    let started = persistor.start_time(&experiment).unwrap();
    assert_eq!(started, at(0));
    assert_eq!(started.offset().local_minus_utc(), -7 * 3600);
    assert_eq!(persistor.end_time(&experiment).unwrap(), Some(at(90)));
    assert_eq!(persistor.current_experiment(), None);

    persistor.set_purpose(&experiment, "renamed").unwrap();
    assert_eq!(persistor.purpose(&experiment).unwrap(), "renamed");
}

#[test]
fn end_before_start_is_rejected_and_state_is_kept() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    let experiment = persistor.begin_experiment("timing", at(10)).unwrap();
    let group = persistor.begin_epoch_group("g", &cell, at(20)).unwrap();

    assert!(matches!(
        persistor.end_epoch_group(at(15)).unwrap_err(),
        PersistorError::InvalidArgument(_)
    ));
    assert_eq!(persistor.current_epoch_group(), Some(group));

    persistor.end_epoch_group(at(20)).unwrap();
    assert!(matches!(
        persistor.end_experiment(at(5)).unwrap_err(),
        PersistorError::InvalidArgument(_)
    ));
    assert_eq!(persistor.current_experiment(), Some(experiment));
}

#[test]
fn reject_policy_refuses_to_end_experiment_with_open_groups() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    let experiment = persistor.begin_experiment("strict", at(0)).unwrap();
    persistor.begin_epoch_group("g", &cell, at(1)).unwrap();

    assert!(matches!(
        persistor.end_experiment(at(2)).unwrap_err(),
        PersistorError::InvalidState(_)
    ));
    assert!(persistor.is_open(&experiment).unwrap());

    persistor.end_epoch_group(at(2)).unwrap();
    persistor.end_experiment(at(3)).unwrap();
}

#[test]
fn close_open_groups_policy_ends_groups_at_experiment_end() {
    let mut persistor = persistor_with(OpenGroupPolicy::CloseOpenGroups);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    persistor.begin_experiment("tidy", at(0)).unwrap();
    let outer = persistor.begin_epoch_group("outer", &cell, at(1)).unwrap();
    let inner = persistor.begin_epoch_group("inner", &cell, at(2)).unwrap();

    persistor.end_experiment(at(30)).unwrap();

    assert!(persistor.open_epoch_groups().is_empty());
    assert_eq!(persistor.end_time(&outer).unwrap(), Some(at(30)));
    assert_eq!(persistor.end_time(&inner).unwrap(), Some(at(30)));
}

#[test]
fn allow_policy_leaves_groups_open() {
    let mut persistor = persistor_with(OpenGroupPolicy::Allow);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    let experiment = persistor.begin_experiment("loose", at(0)).unwrap();
    let group = persistor.begin_epoch_group("g", &cell, at(1)).unwrap();

    persistor.end_experiment(at(5)).unwrap();

    assert!(!persistor.is_open(&experiment).unwrap());
    assert_eq!(persistor.current_epoch_group(), Some(group));
    assert_eq!(persistor.end_epoch_group(at(6)).unwrap(), group);
}

#[test]
fn close_open_groups_policy_checks_every_group_before_closing_any() {
    let mut persistor = persistor_with(OpenGroupPolicy::CloseOpenGroups);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    let experiment = persistor.begin_experiment("tidy", at(0)).unwrap();
    let outer = persistor.begin_epoch_group("outer", &cell, at(1)).unwrap();
    let inner = persistor.begin_epoch_group("inner", &cell, at(10)).unwrap();

    assert!(matches!(
        persistor.end_experiment(at(5)).unwrap_err(),
        PersistorError::InvalidArgument(_)
    ));
    assert_eq!(persistor.open_epoch_groups(), &[outer, inner]);
    assert!(persistor.is_open(&outer).unwrap());
    assert!(persistor.is_open(&inner).unwrap());
    assert_eq!(persistor.current_experiment(), Some(experiment));

    persistor.end_experiment(at(10)).unwrap();
    assert_eq!(persistor.end_time(&outer).unwrap(), Some(at(10)));
}

#[test]
fn groups_left_open_by_allow_policy_block_the_next_experiment() {
    let mut persistor = persistor_with(OpenGroupPolicy::Allow);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    persistor.begin_experiment("first", at(0)).unwrap();
    let leftover = persistor.begin_epoch_group("g", &cell, at(1)).unwrap();
    persistor.end_experiment(at(5)).unwrap();

    assert!(matches!(
        persistor.begin_experiment("second", at(10)).unwrap_err(),
        PersistorError::InvalidState(_)
    ));
    assert_eq!(persistor.experiments().unwrap().len(), 1);

    persistor.end_epoch_group(at(6)).unwrap();
    let second = persistor.begin_experiment("second", at(10)).unwrap();
    let group = persistor.begin_epoch_group("h", &cell, at(11)).unwrap();
    assert_eq!(
        persistor.experiment_epoch_groups(&second).unwrap(),
        vec![group]
    );
    assert!(persistor.child_epoch_groups(&leftover).unwrap().is_empty());
}

#[test]
fn times_finer_than_a_tick_are_rejected_before_writing() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let cell = persistor.add_source("Cell 1", None).unwrap();
    let fine = start() + Duration::nanoseconds(123_456_789);
    let exact = start() + Duration::nanoseconds(123_456_700);

    assert!(matches!(
        persistor.begin_experiment("fine", fine).unwrap_err(),
        PersistorError::InvalidArgument(_)
    ));
    assert!(persistor.experiments().unwrap().is_empty());
    assert_eq!(persistor.current_experiment(), None);

    let experiment = persistor.begin_experiment("exact", exact).unwrap();
    assert_eq!(persistor.start_time(&experiment).unwrap(), exact);

    assert!(matches!(
        persistor.begin_epoch_group("fine", &cell, fine).unwrap_err(),
        PersistorError::InvalidArgument(_)
    ));
    assert!(persistor
        .experiment_epoch_groups(&experiment)
        .unwrap()
        .is_empty());
    assert!(persistor.source_epoch_groups(&cell).unwrap().is_empty());

    assert!(matches!(
        persistor
            .end_experiment(exact + Duration::nanoseconds(50))
            .unwrap_err(),
        PersistorError::InvalidArgument(_)
    ));
    assert!(persistor.is_open(&experiment).unwrap());
}

#[test]
fn epoch_groups_are_indexed_by_source_in_begin_order() {
    let mut persistor = persistor_with(OpenGroupPolicy::Reject);
    let left = persistor.add_source("left", None).unwrap();
    let right = persistor.add_source("right", None).unwrap();
    persistor.begin_experiment("two cells", at(0)).unwrap();

    let a = persistor.begin_epoch_group("a", &left, at(1)).unwrap();
    persistor.end_epoch_group(at(2)).unwrap();
    let b = persistor.begin_epoch_group("b", &right, at(3)).unwrap();
    persistor.end_epoch_group(at(4)).unwrap();
    let c = persistor.begin_epoch_group("c", &left, at(5)).unwrap();
    persistor.end_epoch_group(at(6)).unwrap();

    assert_eq!(persistor.source_epoch_groups(&left).unwrap(), vec![a, c]);
    assert_eq!(persistor.source_epoch_groups(&right).unwrap(), vec![b]);
    assert_eq!(persistor.epoch_group_source(&b).unwrap(), right);
    assert_eq!(persistor.label(&c).unwrap(), "c");
    assert_ne!(a.id(), c.id());
}
