//! Diffs the facilities named in an export against the registry.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::domain::{Facility, NewFacility};

/// Registered facilities keyed by building code.
#[derive(Debug, Default)]
pub struct FacilityRegistry {
    by_code: HashMap<String, Facility>,
}

impl FacilityRegistry {
    pub fn new(facilities: Vec<Facility>) -> Self {
        let by_code = facilities
            .into_iter()
            .map(|facility| (facility.building_code.clone(), facility))
            .collect();
        FacilityRegistry { by_code }
    }

    pub fn get(&self, building_code: &str) -> Option<&Facility> {
        self.by_code.get(building_code)
    }

    pub fn contains(&self, building_code: &str) -> bool {
        self.by_code.contains_key(building_code)
    }
}

/// Collects facilities that appear in the file but not in the registry, in
/// order of first appearance. A repeated code keeps its position and takes the
/// latest name.
#[derive(Debug, Default)]
pub struct FacilityReconciler {
    pending: IndexMap<String, NewFacility>,
}

impl FacilityReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, registry: &FacilityRegistry, name: &str, building_code: &str) {
        if registry.contains(building_code) {
            return;
        }
        let facility = NewFacility {
            name: name.to_string(),
            building_code: building_code.to_string(),
        };
        self.pending.insert(building_code.to_string(), facility);
    }

    pub fn into_new_facilities(self) -> Vec<NewFacility> {
        self.pending.into_values().collect()
    }
}
