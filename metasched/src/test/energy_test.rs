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

use crate::energy::node_energy_saving;
use crate::platform::Platform;
use crate::test::setup_for_tests;
use indexmap::IndexMap;
use metasched_core::interval::RidSet;
use metasched_db::model::events::get_last_wake_up_date_of_node;
use metasched_db::model::gantt::save_assigns;
use metasched_db::model::jobs::NewJob;
use metasched_db::model::resources::NewResource;

fn insert_node(session: &metasched_db::Session, name: &str, state: &str, available_upto: Option<i64>) {
    for _ in 0..2 {
        NewResource {
            network_address: name.to_string(),
            r#type: "default".to_string(),
            state: state.to_string(),
            available_upto,
            labels: IndexMap::new(),
        }
        .insert(session)
        .unwrap();
    }
}

#[test]
fn test_idle_node_is_halted_through_the_external_command() {
    let (session, mut config) = setup_for_tests();
    let now = session.get_now();
    // An idle, energy-manageable node, and one that is always available.
    insert_node(&session, "node1", "Alive", Some(now + 100_000));
    insert_node(&session, "node2", "Alive", None);

    let out_dir = tempfile::tempdir().unwrap();
    let halt_file = out_dir.path().join("halted");
    config.scheduler_node_manager_sleep_cmd = Some(format!("cat > {}", halt_file.display()));
    config.scheduler_node_manager_idle_time = Some(600);
    config.scheduler_node_manager_sleep_time = Some(3600);

    let platform = Platform::from_database(session, config);
    node_energy_saving(&platform, platform.get_now()).unwrap();

    let halted = std::fs::read_to_string(&halt_file).unwrap();
    assert_eq!(halted, "node1\n");
}

#[test]
fn test_node_with_upcoming_job_is_not_halted() {
    let (session, mut config) = setup_for_tests();
    let now = session.get_now();
    insert_node(&session, "node1", "Alive", Some(now + 100_000));

    let (_jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(600, vec![("resource_id=1".to_string(), "".to_string())])],
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let halt_file = out_dir.path().join("halted");
    config.scheduler_node_manager_sleep_cmd = Some(format!("cat > {}", halt_file.display()));
    config.scheduler_node_manager_idle_time = Some(600);
    config.scheduler_node_manager_sleep_time = Some(3600);

    let platform = Platform::from_database(session, config);
    let now = platform.get_now();
    // A job is scheduled on the node within the sleep window.
    save_assigns(platform.session(), vec![(moldable_ids[0], now + 120, RidSet::from_iter([1u32..=1]))]).unwrap();

    node_energy_saving(&platform, now).unwrap();

    // The command was never spawned.
    assert!(!halt_file.exists());
}

#[test]
fn test_absent_node_needed_soon_is_woken_up() {
    let (session, mut config) = setup_for_tests();
    let now = session.get_now();
    insert_node(&session, "node1", "Absent", Some(now + 100_000));

    let (_jid, moldable_ids) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(600, vec![("resource_id=1".to_string(), "".to_string())])],
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let wake_file = out_dir.path().join("woken");
    config.scheduler_node_manager_sleep_cmd = Some("true".to_string());
    config.scheduler_node_manager_wake_up_cmd = Some(format!("cat > {}", wake_file.display()));

    let platform = Platform::from_database(session, config);
    let now = platform.get_now();
    save_assigns(platform.session(), vec![(moldable_ids[0], now, RidSet::from_iter([1u32..=1]))]).unwrap();

    node_energy_saving(&platform, now).unwrap();

    let woken = std::fs::read_to_string(&wake_file).unwrap();
    assert_eq!(woken, "node1\n");
    // The wake-up request is recorded so the node is not halted right away.
    assert!(get_last_wake_up_date_of_node(platform.session(), "node1").unwrap().is_some());
}
