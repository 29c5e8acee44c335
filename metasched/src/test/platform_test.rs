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

use crate::platform::{gantt_init_with_running_jobs, Platform};
use crate::test::{insert_resources, setup_for_tests};
use indexmap::IndexMap;
use metasched_core::interval::RidSet;
use metasched_db::model::gantt::save_assigns;
use metasched_db::model::jobs::{prepare_job_to_be_launched, set_job_state, NewJob};
use metasched_db::model::resources::NewResource;

#[test]
fn test_resource_set_from_database() {
    let (session, config) = setup_for_tests();
    insert_resources(&session, 8, 4);
    NewResource {
        network_address: "node3".to_string(),
        r#type: "default".to_string(),
        state: "Absent".to_string(),
        available_upto: Some(session.get_now() + 5000),
        labels: IndexMap::new(),
    }
    .insert(&session)
    .unwrap();
    NewResource {
        network_address: "node3".to_string(),
        r#type: "default".to_string(),
        state: "Dead".to_string(),
        available_upto: None,
        labels: IndexMap::new(),
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    let resource_set = &platform.get_platform_config().resource_set;

    // Alive and Absent resources are usable, Dead ones are not.
    assert_eq!(resource_set.default_itvs, RidSet::from_iter([1u32..=9]));
    assert_eq!(resource_set.alive_itvs, RidSet::from_iter([1u32..=8]));

    // The Absent resource carries its availability window.
    assert_eq!(resource_set.available_upto.len(), 1);
    assert_eq!(resource_set.available_upto[0].1, RidSet::from_iter([9u32..=9]));

    // Hierarchy: resource_id is the unit level, network_address groups hosts.
    let request = metasched_core::scheduler::hierarchy::HierarchyRequests::new_single(
        RidSet::from_iter([1u32..=9]),
        vec![("network_address".into(), 1)],
    );
    assert_eq!(
        resource_set.hierarchy.find_resource_hierarchies_job(&RidSet::from_iter([1u32..=9]), &request),
        Some(RidSet::from_iter([1u32..=4]))
    );
}

#[test]
fn test_custom_hierarchy_levels() {
    let (session, mut config) = setup_for_tests();
    config.hierarchy_labels = Some("resource_id,network_address,cpu".to_string());

    // 2 hosts, 2 cpus per host, 2 cores per cpu.
    for i in 0..8u32 {
        NewResource {
            network_address: format!("node{}", i / 4 + 1),
            r#type: "default".to_string(),
            state: "Alive".to_string(),
            available_upto: None,
            labels: IndexMap::from([(
                "cpu".to_string(),
                metasched_db::model::resources::ResourceLabelValue::Integer((i / 2 + 1) as i64),
            )]),
        }
        .insert(&session)
        .unwrap();
    }

    let platform = Platform::from_database(session, config);
    let hierarchy = &platform.get_platform_config().resource_set.hierarchy;

    let request = metasched_core::scheduler::hierarchy::HierarchyRequests::new_single(
        RidSet::from_iter([1u32..=8]),
        vec![("network_address".into(), 1), ("cpu".into(), 1), ("resource_id".into(), 1)],
    );
    assert_eq!(
        hierarchy.find_resource_hierarchies_job(&RidSet::from_iter([1u32..=8]), &request),
        Some(RidSet::from_iter([1u32..=1]))
    );
}

#[test]
fn test_gantt_init_places_running_jobs_and_filters_besteffort() {
    let (session, config) = setup_for_tests();
    insert_resources(&session, 10, 5);

    // A running job on rids {1, 2}.
    let (running_jid, running_moldables) = NewJob {
        queue_name: "default".to_string(),
        res: vec![(1000, vec![("resource_id=2".to_string(), "".to_string())])],
        ..Default::default()
    }
    .insert(&session)
    .unwrap();
    // A running besteffort job on rid 5.
    let (besteffort_jid, besteffort_moldables) = NewJob {
        queue_name: "besteffort".to_string(),
        types: vec!["besteffort".to_string()],
        res: vec![(300, vec![("resource_id=1".to_string(), "".to_string())])],
        ..Default::default()
    }
    .insert(&session)
    .unwrap();

    let platform = Platform::from_database(session, config);
    let now = platform.get_now();
    for (jid, moldable_id, rids) in [
        (running_jid, running_moldables[0], RidSet::from_iter([1u32..=2])),
        (besteffort_jid, besteffort_moldables[0], RidSet::from_iter([5u32..=5])),
    ] {
        save_assigns(platform.session(), vec![(moldable_id, now, rids)]).unwrap();
        prepare_job_to_be_launched(platform.session(), jid, moldable_id, now).unwrap();
        set_job_state(platform.session(), jid, "Running").unwrap();
    }

    let (slot_sets, besteffort_rid_to_job) = gantt_init_with_running_jobs(&platform).unwrap();

    // The besteffort job's resources are tracked for preemption decisions.
    assert_eq!(besteffort_rid_to_job.len(), 1);
    assert_eq!(besteffort_rid_to_job.get(&5).unwrap().id, besteffort_jid);

    // The default slot set hides the running job's resources during its
    // occupancy, but keeps the besteffort resources visible.
    let slot_set = slot_sets.get(&Box::from("default")).unwrap();
    let first_slot = slot_set.slot_at(now).unwrap();
    assert_eq!(first_slot.itvs, RidSet::from_iter([3u32..=10]));
    // After the running job's window, everything is free again.
    let last_slot = slot_set.slot_at(now + 2000).unwrap();
    assert_eq!(last_slot.itvs, RidSet::from_iter([1u32..=10]));
}
