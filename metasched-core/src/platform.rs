use crate::interval::RidSet;
use crate::model::configuration::Configuration;
use crate::scheduler::hierarchy::Hierarchy;

/// Configuration and resource snapshot shared by all scheduling components
/// during one iteration.
pub struct PlatformConfig {
    pub resource_set: ResourceSet,
    pub config: Configuration,
}

/// A static snapshot of all resources with the hierarchy index, valid for one
/// scheduling iteration.
#[derive(Debug, Clone)]
pub struct ResourceSet {
    /// All usable rids (Alive or Absent resources of the default type).
    pub default_itvs: RidSet,
    /// Rids of resources currently in the Alive state.
    pub alive_itvs: RidSet,
    /// Rids of the types that stay available while their job is suspended.
    pub suspendable_itvs: RidSet,
    /// For each instant, the rids becoming unusable at that instant.
    /// Integrated into the calendar through pseudo jobs.
    pub available_upto: Vec<(i64, RidSet)>,
    pub hierarchy: Hierarchy,
}

impl ResourceSet {
    pub fn empty() -> Self {
        ResourceSet {
            default_itvs: RidSet::new(),
            alive_itvs: RidSet::new(),
            suspendable_itvs: RidSet::new(),
            available_upto: Vec::new(),
            hierarchy: Hierarchy::new(),
        }
    }
}
