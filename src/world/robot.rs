//! Robot bodies: the part of a robot that lives in the world.

use std::collections::{BTreeMap, BTreeSet};

use crate::lang::Direction;
use crate::world::Coord;

/// Unique identifier for a robot. Lower ids are scheduled first.
pub type RobotId = u64;

/// The physical state of one robot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Robot {
    /// Unique identifier.
    pub id: RobotId,
    /// Display name.
    pub name: String,
    /// Current cell.
    pub location: Coord,
    /// Current absolute heading.
    pub heading: Direction,
    /// Carried items by name.
    pub inventory: BTreeMap<String, u32>,
    /// Equipped devices by name.
    pub equipped: BTreeSet<String>,
    /// Robot that built this one.
    pub parent: Option<RobotId>,
    /// System robots are granted every capability and cannot be salvaged.
    pub system: bool,
}

impl Robot {
    /// Create a robot facing north with nothing carried or equipped.
    #[must_use]
    pub fn new(id: RobotId, name: impl Into<String>, location: Coord) -> Self {
        Self {
            id,
            name: name.into(),
            location,
            heading: Direction::North,
            inventory: BTreeMap::new(),
            equipped: BTreeSet::new(),
            parent: None,
            system: false,
        }
    }

    /// How many of `item` this robot carries.
    #[must_use]
    pub fn count(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    /// Add `n` of `item` to the inventory.
    pub fn add_item(&mut self, item: &str, n: u32) {
        if n == 0 {
            return;
        }
        let slot = self.inventory.entry(item.to_string()).or_insert(0);
        *slot = slot.saturating_add(n);
    }

    /// Remove `n` of `item`. Returns `false` and changes nothing if there are fewer.
    pub fn remove_item(&mut self, item: &str, n: u32) -> bool {
        let have = self.count(item);
        if have < n {
            return false;
        }
        if have == n {
            self.inventory.remove(item);
        } else {
            self.inventory.insert(item.to_string(), have - n);
        }
        true
    }

    /// Whether the device is equipped.
    #[must_use]
    pub fn has_equipped(&self, device: &str) -> bool {
        self.equipped.contains(device)
    }
}
