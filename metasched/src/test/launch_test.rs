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
use metasched_core::model::configuration::Configuration;
use metasched_db::model::events::get_job_events;
use metasched_db::model::gantt::save_assigns;
use metasched_db::model::jobs::{
    get_frag_date, get_gantt_jobs_to_launch, get_job_state_info, prepare_job_to_be_launched, set_job_state, NewJob,
};
use metasched_db::model::queues::Queue;
use metasched_db::Session;
use std::sync::atomic::AtomicBool;

fn setup_with_policy() -> (Session, Configuration, tempfile::TempDir) {
    let (session, mut config) = setup_for_tests();
    let policy_dir = tempfile::tempdir().unwrap();
    write_policy(policy_dir.path(), "ok_policy", "#!/bin/sh\nexit 0\n");
    config.policy_dir = Some(policy_dir.path().to_string_lossy().to_string());
    insert_resources(&session, 10, 5);
    Queue {
        queue_name: "default".to_string(),
        priority: 2,
        scheduler_policy: "ok_policy".to_string(),
        state: "Active".to_string(),
    }
    .insert(&session)
    .unwrap();
    (session, config, policy_dir)
}

/// Inserts a running besteffort job holding the given rids.
fn running_besteffort_job(platform: &Platform, checkpoint: i64, rids: RidSet) -> i64 {
    let (jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        types: vec!["besteffort".to_string()],
        checkpoint,
        res: vec![(300, vec![("resource_id=1".to_string(), "".to_string())])],
        ..Default::default()
    }
    .insert(platform.session())
    .unwrap();
    let start = platform.get_now() - 1000;
    save_assigns(platform.session(), vec![(moldable_ids[0], start, rids)]).unwrap();
    prepare_job_to_be_launched(platform.session(), jid, moldable_ids[0], start).unwrap();
    set_job_state(platform.session(), jid, "Running").unwrap();
    jid
}

/// Inserts an accepted reservation scheduled on the given rids at `start`.
fn accepted_reservation(platform: &Platform, start: i64, walltime: i64, rids: RidSet) -> (i64, i64) {
    let (jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(walltime, vec![("resource_id=1".to_string(), "".to_string())])],
        reservation: "Scheduled".to_string(),
        state: "Waiting".to_string(),
        start_time: start,
        ..Default::default()
    }
    .insert(platform.session())
    .unwrap();
    save_assigns(platform.session(), vec![(moldable_ids[0], start, rids)]).unwrap();
    (jid, moldable_ids[0])
}

#[test]
fn test_besteffort_preemption_without_checkpoint() {
    let (session, config, _policy_dir) = setup_with_policy();
    let platform = Platform::from_database(session, config);
    let now = platform.get_now();

    let besteffort_jid = running_besteffort_job(&platform, 0, RidSet::from_iter([5u32..=5]));
    let (launch_jid, _) = accepted_reservation(&platform, now, 600, RidSet::from_iter([5u32..=5]));

    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 2);

    // The besteffort job was fragged with a BESTEFFORT_KILL event.
    let events = get_job_events(platform.session(), besteffort_jid).unwrap();
    assert!(events.iter().any(|e| e.ev_type == "BESTEFFORT_KILL"));
    assert!(get_frag_date(platform.session(), besteffort_jid).unwrap().is_some());

    // The launch is deferred to a later iteration.
    let (state, _, _) = get_job_state_info(platform.session(), launch_jid).unwrap();
    assert_eq!(state, "Waiting");
}

#[test]
fn test_besteffort_preemption_with_checkpoint_grace() {
    let (session, config, _policy_dir) = setup_with_policy();
    let platform = Platform::from_database(session, config);
    let now = platform.get_now();

    let besteffort_jid = running_besteffort_job(&platform, 60, RidSet::from_iter([5u32..=5]));
    let (launch_jid, _) = accepted_reservation(&platform, now, 600, RidSet::from_iter([5u32..=5]));

    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 2);

    // A checkpoint signal was recorded instead of a kill.
    let events = get_job_events(platform.session(), besteffort_jid).unwrap();
    assert!(events.iter().any(|e| e.ev_type == "CHECKPOINT"));
    assert!(!events.iter().any(|e| e.ev_type == "BESTEFFORT_KILL"));
    assert!(get_frag_date(platform.session(), besteffort_jid).unwrap().is_none());

    let (state, _, _) = get_job_state_info(platform.session(), launch_jid).unwrap();
    assert_eq!(state, "Waiting");
}

#[test]
fn test_job_with_reached_start_time_is_launched() {
    let (session, config, _policy_dir) = setup_with_policy();
    let platform = Platform::from_database(session, config);
    let now = platform.get_now();

    let (jid, _moldable_id) = accepted_reservation(&platform, now, 600, RidSet::from_iter([1u32..=2]));

    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);

    let (state, _, _) = get_job_state_info(platform.session(), jid).unwrap();
    assert_eq!(state, "toLaunch");
}

#[test]
fn test_late_reservation_walltime_is_shrunk_at_launch() {
    let (session, config, _policy_dir) = setup_with_policy();
    let platform = Platform::from_database(session, config);
    let now = platform.get_now();

    let (jid, _moldable_id) = accepted_reservation(&platform, now - 100, 600, RidSet::from_iter([1u32..=2]));
    metasched_db::model::jobs::set_job_message(platform.session(), jid, "R=2,W=0:10:00").unwrap();

    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);

    let (state, _, message) = get_job_state_info(platform.session(), jid).unwrap();
    assert_eq!(state, "toLaunch");

    // 100 elapsed seconds were removed from the walltime and the message.
    let events = get_job_events(platform.session(), jid).unwrap();
    assert!(events.iter().any(|e| e.ev_type == "REDUCE_RESERVATION_WALLTIME"));
    assert_eq!(message, "R=2,W=0:08:20");
}

#[test]
fn test_launch_set_boundaries() {
    let (session, config, _policy_dir) = setup_with_policy();
    let platform = Platform::from_database(session, config);
    let now = platform.get_now();

    let (jid_now, _) = accepted_reservation(&platform, now, 600, RidSet::from_iter([1u32..=1]));
    let (jid_delayed, _) = accepted_reservation(&platform, now + 1, 600, RidSet::from_iter([2u32..=2]));
    let (jid_future, _) = accepted_reservation(&platform, now + 3600, 600, RidSet::from_iter([3u32..=3]));

    let (jobs, rid_to_jid) = get_gantt_jobs_to_launch(platform.session(), now, 60).unwrap();
    assert!(jobs.contains_key(&jid_now));
    assert!(!jobs.contains_key(&jid_delayed));
    assert!(!jobs.contains_key(&jid_future));
    assert_eq!(rid_to_jid.get(&1), Some(&jid_now));
}

#[test]
fn test_empty_launch_set_returns_zero() {
    let (session, config, _policy_dir) = setup_with_policy();
    let platform = Platform::from_database(session, config);

    let exit_code = meta_schedule(&platform, &AtomicBool::new(false));
    assert_eq!(exit_code, 0);
}
