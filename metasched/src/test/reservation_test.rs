/*
 * Copyright (c) 2025 Clément GRENNERAT
 *
 * This program is free software: you can redistribute it and/or modify it under the terms of the
 * GNU General Public License as published by the Free Software Foundation, version 3.
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
 * even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
 * See the GNU General Public License for more details.
 * You should have received a copy of the GNU General Public License along with this program.
 * If not, see https://www.gnu.org/licenses/.
 *
 */

use crate::meta_schedule::meta_schedule;
use crate::platform::Platform;
use crate::test::{insert_resources, setup_for_tests, write_policy};
use metasched_core::interval::RidSet;
use metasched_db::model::gantt::{get_gantt_job_start_time, get_gantt_moldable_resources, save_assigns};
use metasched_db::model::jobs::{get_job_state_info, NewJob};
use metasched_db::model::queues::Queue;
use std::sync::atomic::AtomicBool;

fn default_queue(session: &metasched_db::Session, policy: &str) {
    Queue {
        queue_name: "default".to_string(),
        priority: 2,
        scheduler_policy: policy.to_string(),
        state: "Active".to_string(),
    }
    .insert(session)
    .unwrap();
}

#[test]
fn test_fresh_reservation_is_accepted() {
    let (session, mut config) = setup_for_tests();
    let policy_dir = tempfile::tempdir().unwrap();
    write_policy(policy_dir.path(), "ok_policy", "#!/bin/sh\nexit 0\n");
    config.policy_dir = Some(policy_dir.path().to_string_lossy().to_string());

    insert_resources(&session, 10, 5);
    default_queue(&session, "ok_policy");

    let now = session.get_now();
    let (jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(600, vec![("resource_id=4".to_string(), "".to_string())])],
        reservation: "toSchedule".to_string(),
        start_time: now + 3600,
        message: "R=4,W=0:10:00".to_string(),
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);

    let (state, reservation, _message) = get_job_state_info(platform.session(), jid).unwrap();
    assert_eq!(state, "toAckReservation");
    assert_eq!(reservation, "Scheduled");
    // Default resource order picks the four lowest resource ids.
    assert_eq!(get_gantt_moldable_resources(platform.session(), moldable_ids[0]).unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(get_gantt_job_start_time(platform.session(), moldable_ids[0]).unwrap(), Some(now + 3600));
}

#[test]
fn test_accepted_reservation_expired() {
    let (session, mut config) = setup_for_tests();
    let policy_dir = tempfile::tempdir().unwrap();
    write_policy(policy_dir.path(), "ok_policy", "#!/bin/sh\nexit 0\n");
    config.policy_dir = Some(policy_dir.path().to_string_lossy().to_string());

    insert_resources(&session, 10, 5);
    default_queue(&session, "ok_policy");

    let now = session.get_now();
    let (jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(600, vec![("resource_id=4".to_string(), "".to_string())])],
        reservation: "Scheduled".to_string(),
        state: "Waiting".to_string(),
        start_time: now - 10000,
        message: "R=4,W=0:10:00".to_string(),
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    save_assigns(
        platform.session(),
        vec![(moldable_ids[0], now - 10000, RidSet::from_iter([1u32..=4]))],
    )
    .unwrap();

    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);

    let (state, _reservation, message) = get_job_state_info(platform.session(), jid).unwrap();
    assert_eq!(state, "Error");
    assert!(message.contains("Reservation expired"), "unexpected message: {}", message);
}

#[test]
fn test_reservation_too_old_at_exact_expiry() {
    let (session, mut config) = setup_for_tests();
    let policy_dir = tempfile::tempdir().unwrap();
    write_policy(policy_dir.path(), "ok_policy", "#!/bin/sh\nexit 0\n");
    config.policy_dir = Some(policy_dir.path().to_string_lossy().to_string());

    insert_resources(&session, 10, 5);
    default_queue(&session, "ok_policy");

    let now = session.get_now();
    // start + walltime == now: the reservation is treated as expired.
    let (jid, _moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(600, vec![("resource_id=4".to_string(), "".to_string())])],
        reservation: "toSchedule".to_string(),
        start_time: now - 600,
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);

    let (state, _reservation, message) = get_job_state_info(platform.session(), jid).unwrap();
    // toError jobs are turned into Error at the end of the same iteration.
    assert_eq!(state, "Error");
    assert_eq!(message, "Reservation too old");
}

#[test]
fn test_reservation_without_enough_resources_is_refused() {
    let (session, mut config) = setup_for_tests();
    let policy_dir = tempfile::tempdir().unwrap();
    write_policy(policy_dir.path(), "ok_policy", "#!/bin/sh\nexit 0\n");
    config.policy_dir = Some(policy_dir.path().to_string_lossy().to_string());

    insert_resources(&session, 10, 5);
    default_queue(&session, "ok_policy");

    let now = session.get_now();
    let (jid, _moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(600, vec![("resource_id=11".to_string(), "".to_string())])],
        reservation: "toSchedule".to_string(),
        start_time: now + 3600,
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);

    let (state, _reservation, message) = get_job_state_info(platform.session(), jid).unwrap();
    assert_eq!(state, "Error");
    assert_eq!(message, "This advance reservation cannot run");
}

#[test]
fn test_late_reservation_with_missing_resources_is_delayed() {
    let (session, mut config) = setup_for_tests();
    let policy_dir = tempfile::tempdir().unwrap();
    write_policy(policy_dir.path(), "ok_policy", "#!/bin/sh\nexit 0\n");
    config.policy_dir = Some(policy_dir.path().to_string_lossy().to_string());

    insert_resources(&session, 10, 5);
    // An Absent resource that the reservation was granted.
    metasched_db::model::resources::NewResource {
        network_address: "node3".to_string(),
        r#type: "default".to_string(),
        state: "Absent".to_string(),
        available_upto: None,
        labels: indexmap::IndexMap::new(),
    }
    .insert(&session)
    .unwrap();
    default_queue(&session, "ok_policy");

    let now = session.get_now();
    let (jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(600, vec![("resource_id=2".to_string(), "".to_string())])],
        reservation: "Scheduled".to_string(),
        state: "Waiting".to_string(),
        start_time: now - 10,
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    let now = platform.get_now();
    // rid 11 is the Absent resource: the reservation waits for it.
    save_assigns(
        platform.session(),
        vec![(moldable_ids[0], now - 10, RidSet::from_iter([1u32..=1, 11..=11]))],
    )
    .unwrap();

    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);

    let (state, _reservation, _message) = get_job_state_info(platform.session(), jid).unwrap();
    assert_eq!(state, "Waiting");
    // The start time was pushed forward, within the waiting window.
    assert_eq!(get_gantt_job_start_time(platform.session(), moldable_ids[0]).unwrap(), Some(now + 1));
}
