use crate::interval::RidSet;
use crate::scheduler::hierarchy::{Hierarchy, HierarchyRequests};

/// 32 cores: 4 nodes of 2 cpus, 4 cores per cpu.
fn cluster_hierarchy() -> Hierarchy {
    let nodes = (0..4u32).map(|i| RidSet::from_iter([i * 8 + 1..=i * 8 + 8])).collect::<Vec<_>>();
    let cpus = (0..8u32).map(|i| RidSet::from_iter([i * 4 + 1..=i * 4 + 4])).collect::<Vec<_>>();
    Hierarchy::new()
        .with_level("network_address".into(), nodes.into_boxed_slice())
        .with_level("cpu".into(), cpus.into_boxed_slice())
        .with_unit_level("core".into())
}

fn all_rids() -> RidSet {
    RidSet::from_iter([1u32..=32])
}

#[test]
fn test_single_level_request() {
    let hierarchy = cluster_hierarchy();
    let request = HierarchyRequests::new_single(all_rids(), vec![("network_address".into(), 2)]);
    let itvs = hierarchy.find_resource_hierarchies_job(&all_rids(), &request);
    assert_eq!(itvs, Some(RidSet::from_iter([1u32..=16])));
}

#[test]
fn test_nested_request_shape() {
    let hierarchy = cluster_hierarchy();
    // 2 nodes, and on each node 1 cpu with 2 cores.
    let request = HierarchyRequests::new_single(
        all_rids(),
        vec![("network_address".into(), 2), ("cpu".into(), 1), ("core".into(), 2)],
    );
    let itvs = hierarchy.find_resource_hierarchies_job(&all_rids(), &request).unwrap();
    assert_eq!(itvs, RidSet::from_iter([1u32..=2, 9..=10]));
}

#[test]
fn test_request_skips_partially_used_entities() {
    let hierarchy = cluster_hierarchy();
    // Node 1 is partially taken: a whole-node request must skip it.
    let available = all_rids() - RidSet::from_iter([3u32..=3]);
    let request = HierarchyRequests::new_single(all_rids(), vec![("network_address".into(), 2)]);
    let itvs = hierarchy.find_resource_hierarchies_job(&available, &request);
    assert_eq!(itvs, Some(RidSet::from_iter([9u32..=24])));

    // But a core-level request can still use the remaining cores of node 1.
    let request = HierarchyRequests::new_single(all_rids(), vec![("core".into(), 4)]);
    let itvs = hierarchy.find_resource_hierarchies_job(&available, &request);
    assert_eq!(itvs, Some(RidSet::from_iter([1u32..=2, 4..=5])));
}

#[test]
fn test_infeasible_request_returns_none() {
    let hierarchy = cluster_hierarchy();
    let request = HierarchyRequests::new_single(all_rids(), vec![("network_address".into(), 5)]);
    assert_eq!(hierarchy.find_resource_hierarchies_job(&all_rids(), &request), None);

    let available = RidSet::from_iter([1u32..=7]);
    let request = HierarchyRequests::new_single(all_rids(), vec![("network_address".into(), 1)]);
    assert_eq!(hierarchy.find_resource_hierarchies_job(&available, &request), None);
}

#[test]
fn test_request_filter_restricts_candidates() {
    let hierarchy = cluster_hierarchy();
    // Only the second half of the cluster passes the filter.
    let request = HierarchyRequests::new_single(RidSet::from_iter([17u32..=32]), vec![("network_address".into(), 1)]);
    let itvs = hierarchy.find_resource_hierarchies_job(&all_rids(), &request);
    assert_eq!(itvs, Some(RidSet::from_iter([17u32..=24])));
}

#[test]
fn test_assignment_is_deterministic() {
    let hierarchy = cluster_hierarchy();
    let available = all_rids() - RidSet::from_iter([6u32..=6, 20..=20]);
    let request = HierarchyRequests::new_single(all_rids(), vec![("cpu".into(), 3), ("core".into(), 2)]);
    let first = hierarchy.find_resource_hierarchies_job(&available, &request);
    assert!(first.is_some());
    for _ in 0..20 {
        assert_eq!(hierarchy.find_resource_hierarchies_job(&available, &request), first);
    }
}
