//! Entity catalog and crafting recipes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::lang::Capability;

/// What the world knows about a kind of entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Entity name.
    pub name: String,
    /// Capabilities granted when equipped; empty for non-devices.
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Robots cannot enter a cell holding this entity.
    #[serde(default)]
    pub obstructs: bool,
}

impl EntityInfo {
    /// A plain, non-obstructing item.
    #[must_use]
    pub fn item(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: BTreeSet::new(),
            obstructs: false,
        }
    }

    /// A device granting the given capabilities.
    #[must_use]
    pub fn device(name: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
            obstructs: false,
        }
    }

    /// Whether equipping this entity grants anything.
    #[must_use]
    pub fn is_device(&self) -> bool {
        !self.capabilities.is_empty()
    }
}

/// A crafting recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Consumed items.
    pub inputs: BTreeMap<String, u32>,
    /// Produced items.
    pub outputs: BTreeMap<String, u32>,
}

impl Recipe {
    /// Whether this recipe produces `item`.
    #[must_use]
    pub fn produces(&self, item: &str) -> bool {
        self.outputs.get(item).is_some_and(|&n| n > 0)
    }
}
