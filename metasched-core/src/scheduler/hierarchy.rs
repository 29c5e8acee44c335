use crate::interval::{RidSet, RidSetOps};
use log::warn;
use std::collections::HashMap;

/// The full hierarchical request of one moldable: one [`HierarchyRequest`]
/// per resource group, all of which must be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRequests(pub Box<[HierarchyRequest]>);

impl HierarchyRequests {
    pub fn from_requests(requests: Vec<HierarchyRequest>) -> Self {
        HierarchyRequests(requests.into_boxed_slice())
    }
    pub fn new_single(filter: RidSet, levels: Vec<(Box<str>, u32)>) -> Self {
        HierarchyRequests::from_requests(vec![HierarchyRequest::new(filter, levels)])
    }
    pub fn groups(&self) -> impl Iterator<Item = &HierarchyRequest> {
        self.0.iter()
    }
}

/// One resource group: a candidate filter and how many entities are wanted at
/// each hierarchy level, outermost level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRequest {
    pub filter: RidSet,
    pub levels: Box<[(Box<str>, u32)]>,
}

impl HierarchyRequest {
    pub fn new(filter: RidSet, levels: Vec<(Box<str>, u32)>) -> Self {
        HierarchyRequest {
            filter,
            levels: levels.into_boxed_slice(),
        }
    }
}

/// The static nesting of resources. Each named level owns its entities as rid
/// sets, listed in the configured resource order; an optional unit level
/// stands for single-rid entities and needs no materialized list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    levels: HashMap<Box<str>, Box<[RidSet]>>,
    unit_level: Option<Box<str>>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Hierarchy {
            levels: HashMap::new(),
            unit_level: None,
        }
    }
    pub fn with_level(mut self, name: Box<str>, entities: Box<[RidSet]>) -> Self {
        if self.has_level(&name) {
            panic!("Hierarchy level {} is declared twice", name);
        }
        self.levels.insert(name, entities);
        self
    }
    pub fn with_unit_level(mut self, name: Box<str>) -> Self {
        if self.has_level(&name) {
            panic!("Hierarchy level {} is declared twice", name);
        }
        if let Some(unit) = &self.unit_level {
            panic!("Hierarchy already has {} as its unit level", unit);
        }
        self.unit_level = Some(name);
        self
    }
    pub fn has_level(&self, name: &str) -> bool {
        self.levels.contains_key(name) || self.unit_level.as_deref() == Some(name)
    }

    /// Assigns resources of exactly the requested shape out of
    /// `available_itvs`, or None when the request cannot be satisfied.
    /// Entities are tried in the configured order and unit rids claimed
    /// lowest-first, so the same inputs always give the same assignment.
    pub fn find_resource_hierarchies_job(&self, available_itvs: &RidSet, requests: &HierarchyRequests) -> Option<RidSet> {
        let mut assigned = RidSet::new();
        for group in requests.groups() {
            assigned |= self.descend(&(available_itvs & &group.filter), &group.levels)?;
        }
        Some(assigned)
    }

    /// One level of the request: walks this level's entities and keeps the
    /// first ones whose intersection with the pool satisfies the rest of the
    /// request, until enough entities are found.
    fn descend(&self, pool: &RidSet, levels: &[(Box<str>, u32)]) -> Option<RidSet> {
        let (level, wanted) = &levels[0];
        if self.unit_level.as_ref() == Some(level) {
            return pool.claim_rids(*wanted);
        }
        let Some(entities) = self.levels.get(level) else {
            warn!("Unknown hierarchy level {} in a request", level);
            return None;
        };

        let mut picked = RidSet::new();
        let mut found: u32 = 0;
        for entity in entities.iter() {
            if found == *wanted {
                break;
            }
            let matched = if levels.len() > 1 {
                self.descend(&(entity & pool), &levels[1..])
            } else if entity.is_subset(pool) {
                Some(entity.clone())
            } else {
                None
            };
            if let Some(matched) = matched {
                picked |= matched;
                found += 1;
            }
        }
        (found == *wanted).then_some(picked)
    }
}
