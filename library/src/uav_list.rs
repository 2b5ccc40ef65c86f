use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

/// The parts of a UAV status report a list entry shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UavSummary {
    pub id: String,
    /// Milliseconds since the epoch of the last status report.
    #[serde(default)]
    pub last_updated: Option<u64>,
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Subscriptions to change after [`UavList::set_flock`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlockChange {
    pub unsubscribe: Option<String>,
    pub subscribe: Option<String>,
}

impl FlockChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unsubscribe.is_none() && self.subscribe.is_none()
    }
}

/// Known UAVs of one flock, merged from incremental update batches.
///
/// Entries keep the order in which their ids were first seen; an update for a
/// known id replaces its entry in place.
#[derive(Debug, Default)]
pub struct UavList {
    flock: Option<String>,
    uavs: Vec<UavSummary>,
    index: HashMap<String, usize>,
}

impl UavList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn flock(&self) -> Option<&str> {
        self.flock.as_deref()
    }

    /// Follow another flock, or none.
    ///
    /// Returns which update feed to leave and which to join. Setting the
    /// flock already followed changes nothing. Entries are kept.
    pub fn set_flock(&mut self, flock: Option<String>) -> FlockChange {
        if self.flock == flock {
            return FlockChange::default();
        }
        debug!("uav list follows flock {:?} instead of {:?}", flock, self.flock);
        let unsubscribe = std::mem::replace(&mut self.flock, flock.clone());
        FlockChange {
            unsubscribe,
            subscribe: flock,
        }
    }

    /// Merge a batch of updated UAVs.
    pub fn on_uavs_updated(&mut self, updated: &[UavSummary]) {
        for uav in updated {
            let known = self
                .index
                .get(&uav.id)
                .and_then(|&index| self.uavs.get_mut(index));
            match known {
                Some(entry) => *entry = uav.clone(),
                None => {
                    self.index.insert(uav.id.clone(), self.uavs.len());
                    self.uavs.push(uav.clone());
                }
            }
        }
    }

    /// Position of `id` in insertion order.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&UavSummary> {
        self.index_of(id).and_then(|index| self.uavs.get(index))
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn uavs(&self) -> &[UavSummary] {
        &self.uavs
    }

    /// Entries ordered by id, the order the list is shown in.
    #[must_use]
    pub fn sorted(&self) -> Vec<&UavSummary> {
        let mut sorted: Vec<_> = self.uavs.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.uavs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uavs.is_empty()
    }
}
