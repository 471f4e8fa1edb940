//! Component identities and battery/inverter pairing
//!
//! The pairing topology is discovered elsewhere (component graph); this
//! module only defines the identity type and the lookup seam the pool
//! uses to resolve each battery to its paired inverter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque identity of a microgrid component (battery or inverter)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ComponentId(pub u64);

impl ComponentId {
    /// Create a component id from its raw value
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw value of this id
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ComponentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Resolves the static battery-to-inverter pairing for a pool's lifetime
pub trait ComponentTopology: Send + Sync {
    /// The inverter paired with `battery`, if the topology knows one
    fn paired_inverter(&self, battery: ComponentId) -> Option<ComponentId>;
}

/// Map-backed topology for pools whose pairing is known up front
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    pairs: HashMap<ComponentId, ComponentId>,
}

impl StaticTopology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a battery/inverter pair
    pub fn with_pair(
        mut self,
        battery: impl Into<ComponentId>,
        inverter: impl Into<ComponentId>,
    ) -> Self {
        self.pairs.insert(battery.into(), inverter.into());
        self
    }
}

impl ComponentTopology for StaticTopology {
    fn paired_inverter(&self, battery: ComponentId) -> Option<ComponentId> {
        self.pairs.get(&battery).copied()
    }
}

impl FromIterator<(ComponentId, ComponentId)> for StaticTopology {
    fn from_iter<I: IntoIterator<Item = (ComponentId, ComponentId)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}
