use crate::interval::RidSet;
use crate::model::job::{timesharing_compatible, JobAssignment, JobBuilder, TimeSharingType};
use crate::scheduler::slotset::SlotSet;

#[test]
fn test_time_sharing_resources_stay_visible_to_compatible_jobs() {
    let mut slot_set = SlotSet::new(RidSet::from_iter([1u32..=16]), 0, 1000);

    let running = JobBuilder::new(1)
        .user("toto".into())
        .time_sharing(TimeSharingType::UserAll)
        .assign(JobAssignment::new(0, 499, RidSet::from_iter([1u32..=8]), 0))
        .build();
    slot_set.place_job(&running, None);

    // Same user, timesharing: the occupied resources are still offered.
    let same_user = JobBuilder::new(2)
        .user("toto".into())
        .time_sharing(TimeSharingType::UserAll)
        .build();
    assert_eq!(slot_set.free_itvs_for_job(&same_user, 0, 499), RidSet::from_iter([1u32..=16]));

    // Other user, timesharing: only the free resources remain.
    let other_user = JobBuilder::new(3)
        .user("titi".into())
        .time_sharing(TimeSharingType::UserAll)
        .build();
    assert_eq!(slot_set.free_itvs_for_job(&other_user, 0, 499), RidSet::from_iter([9u32..=16]));

    // No timesharing tag at all: only the free resources remain.
    let plain = JobBuilder::new(4).user("toto".into()).build();
    assert_eq!(slot_set.free_itvs_for_job(&plain, 0, 499), RidSet::from_iter([9u32..=16]));

    // Outside the job window everything is free.
    assert_eq!(slot_set.free_itvs_for_job(&plain, 500, 1000), RidSet::from_iter([1u32..=16]));
}

#[test]
fn test_all_all_sharing_is_open_to_everyone() {
    let mut slot_set = SlotSet::new(RidSet::from_iter([1u32..=8]), 0, 1000);
    let running = JobBuilder::new(1)
        .user("toto".into())
        .time_sharing(TimeSharingType::AllAll)
        .assign(JobAssignment::new(0, 999, RidSet::from_iter([1u32..=8]), 0))
        .build();
    slot_set.place_job(&running, None);

    let other = JobBuilder::new(2)
        .user("titi".into())
        .time_sharing(TimeSharingType::UserAll)
        .build();
    assert_eq!(slot_set.free_itvs_for_job(&other, 0, 999), RidSet::from_iter([1u32..=8]));
}

#[test]
fn test_timesharing_compatibility_predicate() {
    let make = |user: &str, name: &str, ts: Option<TimeSharingType>| {
        let mut builder = JobBuilder::new(0).user(user.into()).name(name.into());
        if let Some(ts) = ts {
            builder = builder.time_sharing(ts);
        }
        builder.build()
    };

    // Both wildcard: always compatible.
    assert!(timesharing_compatible(
        &make("a", "x", Some(TimeSharingType::AllAll)),
        &make("b", "y", Some(TimeSharingType::AllAll)),
    ));
    // User-keyed: compatible only for the same user.
    assert!(timesharing_compatible(
        &make("a", "x", Some(TimeSharingType::UserAll)),
        &make("a", "y", Some(TimeSharingType::UserAll)),
    ));
    assert!(!timesharing_compatible(
        &make("a", "x", Some(TimeSharingType::UserAll)),
        &make("b", "x", Some(TimeSharingType::UserAll)),
    ));
    // Name-keyed: compatible only for the same name.
    assert!(timesharing_compatible(
        &make("a", "x", Some(TimeSharingType::AllName)),
        &make("b", "x", Some(TimeSharingType::AllName)),
    ));
    assert!(!timesharing_compatible(
        &make("a", "x", Some(TimeSharingType::UserName)),
        &make("a", "y", Some(TimeSharingType::UserName)),
    ));
    // A wildcard on one side opens that axis.
    assert!(timesharing_compatible(
        &make("a", "x", Some(TimeSharingType::AllAll)),
        &make("b", "y", Some(TimeSharingType::UserName)),
    ));
    // A job without the tag never shares.
    assert!(!timesharing_compatible(
        &make("a", "x", Some(TimeSharingType::AllAll)),
        &make("a", "x", None),
    ));
}
