//! Optional feature groups.
//!
//! An entry with a `selected` flag seeds a feature; the feature then pulls in
//! every entry reachable through `depends` edges, restricted to names present
//! in the working set. Features are closed one at a time, so an entry may end
//! up in several features when two seeds share dependencies.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::entry::Entry;

/// A user-selectable group of entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feature {
    pub name: String,
    pub description: Option<String>,
    pub recommendation: Option<String>,
    pub selected: bool,
    /// Names of member entries, seed first
    pub entry_refs: Vec<String>,
}

impl Feature {
    pub fn contains(&self, name: &str) -> bool {
        self.entry_refs.iter().any(|n| n == name)
    }
}

/// Seed and close a feature for `entries[index]` if it carries a `selected`
/// flag and no feature of the same name exists yet.
pub fn seed_feature(index: usize, entries: &[Entry], features: &mut Vec<Feature>) {
    let entry = &entries[index];
    let Some(selected) = entry.selected else {
        return;
    };
    let Some(entry_name) = entry.name.clone() else {
        log::warn!("{} has a 'selected' flag but no name, not creating a feature", entry.label());
        return;
    };

    let name = entry.feature_name.clone().unwrap_or_else(|| entry_name.clone());
    if features.iter().any(|f| f.name == name) {
        return;
    }

    let mut feature = Feature {
        name,
        description: entry.description.clone(),
        recommendation: entry.recommendation.clone(),
        selected,
        entry_refs: vec![entry_name],
    };
    close_feature(&mut feature, entries);

    for other in features.iter() {
        let shared: Vec<&str> = feature
            .entry_refs
            .iter()
            .filter(|n| other.contains(n))
            .map(String::as_str)
            .collect();
        if !shared.is_empty() {
            log::warn!(
                "Features '{}' and '{}' both contain {}",
                other.name,
                feature.name,
                shared.join(", ")
            );
        }
    }

    log::debug!("Feature '{}': {}", feature.name, feature.entry_refs.join(", "));
    features.push(feature);
}

/// Grow `feature.entry_refs` until no member has a dependency that is present
/// in `entries` but not yet a member. Order is breadth-first from the seed.
pub fn close_feature(feature: &mut Feature, entries: &[Entry]) {
    let present: HashSet<&str> = entries.iter().filter_map(|e| e.name.as_deref()).collect();
    let mut processed: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = feature.entry_refs.iter().cloned().collect();

    while let Some(name) = queue.pop_front() {
        if !processed.insert(name.clone()) {
            continue;
        }
        let Some(entry) = entries.iter().find(|e| e.name.as_deref() == Some(name.as_str())) else {
            continue;
        };

        for dep in entry.dependency_names() {
            if present.contains(dep) && !feature.contains(dep) {
                feature.entry_refs.push(dep.to_string());
                queue.push_back(dep.to_string());
            }
        }
    }
}

/// Mark every member entry with its feature's name, unless it already names one
pub fn assign_feature_names(entries: &mut [Entry], features: &[Feature]) {
    for feature in features {
        for entry in entries.iter_mut() {
            let is_member = entry.name.as_deref().map_or(false, |n| feature.contains(n));
            if is_member && entry.feature_name.is_none() {
                entry.feature_name = Some(feature.name.clone());
            }
        }
    }
}
