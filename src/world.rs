//! Shared world state.
//!
//! The execution core only reads the world through [`WorldView`] and only
//! changes it by handing an [`Effect`] to [`World::apply`]. The scheduler is
//! the single writer: it applies each effect right after the step that
//! proposed it, in ascending robot-id order.

mod effect;
mod entity;
mod grid;
mod robot;

pub use effect::{Effect, Spawn};
pub use entity::{EntityInfo, Recipe};
pub use grid::{Cell, Coord, Grid, Terrain};
pub use robot::{Robot, RobotId};

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::lang::Capability;

/// Errors applying an effect or editing the world.
///
/// Effects are validated by the machine against the same state they are
/// applied to, so these indicate a robot acting on stale assumptions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// The robot does not exist.
    #[error("no robot with id {0}")]
    NoSuchRobot(RobotId),
    /// The coordinate is off the grid.
    #[error("coordinate ({}, {}) is off the grid", .0.x, .0.y)]
    OutOfBounds(Coord),
    /// The cell cannot be entered or filled.
    #[error("cell ({}, {}) is not free", .0.x, .0.y)]
    CellNotFree(Coord),
    /// The robot does not carry the item.
    #[error("robot {robot} does not carry '{item}'")]
    MissingItem {
        /// Robot.
        robot: RobotId,
        /// Item name.
        item: String,
    },
    /// The id is already taken.
    #[error("robot id {0} is already in use")]
    DuplicateRobot(RobotId),
}

/// A broadcast message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Tick the message was sent.
    pub tick: u64,
    /// Sender.
    pub from: RobotId,
    /// Text.
    pub text: String,
}

/// Read-only view of the world used while stepping a machine.
pub trait WorldView {
    /// Current tick.
    fn tick(&self) -> u64;
    /// Seed for deterministic randomness.
    fn seed(&self) -> u64;
    /// The grid.
    fn grid(&self) -> &Grid;
    /// A robot body by id.
    fn robot(&self, id: RobotId) -> Option<&Robot>;
    /// The robot standing in a cell.
    fn robot_at(&self, at: Coord) -> Option<RobotId>;
    /// Catalog entry for an entity name.
    fn entity(&self, name: &str) -> Option<&EntityInfo>;
    /// Known recipes.
    fn recipes(&self) -> &[Recipe];
    /// Id the next built robot will receive.
    fn next_robot_id(&self) -> RobotId;

    /// Capabilities granted to a robot by its equipped devices.
    fn capabilities_of(&self, id: RobotId) -> BTreeSet<Capability> {
        let Some(robot) = self.robot(id) else {
            return BTreeSet::new();
        };
        if robot.system {
            return Capability::ALL.into_iter().collect();
        }
        robot
            .equipped
            .iter()
            .filter_map(|device| self.entity(device))
            .flat_map(|info| info.capabilities.iter().copied())
            .collect()
    }

    /// Whether a robot could step into `at`.
    fn is_blocked(&self, at: Coord) -> bool {
        let Some(cell) = self.grid().get(at) else {
            return true;
        };
        if !cell.terrain.is_passable() || self.robot_at(at).is_some() {
            return true;
        }
        cell.entity
            .as_deref()
            .and_then(|name| self.entity(name))
            .is_some_and(|info| info.obstructs)
    }
}

/// The complete shared world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct World {
    /// Current tick (0-indexed).
    pub tick: u64,
    /// Seed for deterministic randomness.
    pub seed: u64,
    /// The grid.
    pub grid: Grid,
    /// Broadcast messages, oldest first.
    pub messages: Vec<Message>,
    entities: BTreeMap<String, EntityInfo>,
    recipes: Vec<Recipe>,
    robots: BTreeMap<RobotId, Robot>,
    next_id: RobotId,
}

impl World {
    /// Create an empty world on a grid.
    #[must_use]
    pub fn new(grid: Grid, seed: u64) -> Self {
        Self {
            tick: 0,
            seed,
            grid,
            messages: Vec::new(),
            entities: BTreeMap::new(),
            recipes: Vec::new(),
            robots: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register an entity kind.
    pub fn add_entity(&mut self, info: EntityInfo) {
        self.entities.insert(info.name.clone(), info);
    }

    /// Register a recipe.
    pub fn add_recipe(&mut self, recipe: Recipe) {
        self.recipes.push(recipe);
    }

    /// Insert a robot body, taking its id from `robot.id`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateRobot`] if the id is taken and
    /// [`WorldError::OutOfBounds`] if its location is off the grid.
    pub fn add_robot(&mut self, robot: Robot) -> Result<RobotId, WorldError> {
        if self.robots.contains_key(&robot.id) {
            return Err(WorldError::DuplicateRobot(robot.id));
        }
        if !self.grid.in_bounds(robot.location) {
            return Err(WorldError::OutOfBounds(robot.location));
        }
        let id = robot.id;
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.robots.insert(id, robot);
        Ok(id)
    }

    /// All robot bodies in id order.
    pub fn robots(&self) -> impl Iterator<Item = &Robot> {
        self.robots.values()
    }

    /// Mutable access to a robot body.
    #[must_use]
    pub fn robot_mut(&mut self, id: RobotId) -> Option<&mut Robot> {
        self.robots.get_mut(&id)
    }

    /// Remove a robot body.
    pub fn remove_robot(&mut self, id: RobotId) -> Option<Robot> {
        self.robots.remove(&id)
    }

    /// Advance to the next tick.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    fn body_mut(&mut self, id: RobotId) -> Result<&mut Robot, WorldError> {
        self.robots.get_mut(&id).ok_or(WorldError::NoSuchRobot(id))
    }

    fn take_item(&mut self, id: RobotId, item: &str, n: u32) -> Result<(), WorldError> {
        if self.body_mut(id)?.remove_item(item, n) {
            Ok(())
        } else {
            Err(WorldError::MissingItem {
                robot: id,
                item: item.to_string(),
            })
        }
    }

    /// Apply one effect.
    ///
    /// `Log` effects belong to the robot's execution context and are ignored here.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the world unchanged, if the effect no longer
    /// fits the current state.
    pub fn apply(&mut self, effect: &Effect) -> Result<(), WorldError> {
        match effect {
            Effect::Move { robot, to } => {
                self.body_mut(*robot)?;
                if self.is_blocked(*to) {
                    return Err(WorldError::CellNotFree(*to));
                }
                self.body_mut(*robot)?.location = *to;
            }
            Effect::Turn { robot, heading } => {
                self.body_mut(*robot)?.heading = *heading;
            }
            Effect::Grab { robot, at, entity } => {
                self.body_mut(*robot)?;
                let cell = self.grid.get_mut(*at).ok_or(WorldError::OutOfBounds(*at))?;
                if cell.entity.as_deref() != Some(entity.as_str()) {
                    return Err(WorldError::CellNotFree(*at));
                }
                cell.entity = None;
                self.body_mut(*robot)?.add_item(entity, 1);
            }
            Effect::Place { robot, at, entity } => {
                let free = self.grid.get(*at).ok_or(WorldError::OutOfBounds(*at))?;
                if free.entity.is_some() {
                    return Err(WorldError::CellNotFree(*at));
                }
                self.take_item(*robot, entity, 1)?;
                if let Some(cell) = self.grid.get_mut(*at) {
                    cell.entity = Some(entity.clone());
                }
            }
            Effect::Give { from, to, item } => {
                self.body_mut(*to)?;
                self.take_item(*from, item, 1)?;
                self.body_mut(*to)?.add_item(item, 1);
            }
            Effect::Equip { robot, device } => {
                self.take_item(*robot, device, 1)?;
                self.body_mut(*robot)?.equipped.insert(device.clone());
            }
            Effect::Unequip { robot, device } => {
                let body = self.body_mut(*robot)?;
                if !body.equipped.remove(device) {
                    return Err(WorldError::MissingItem {
                        robot: *robot,
                        item: device.clone(),
                    });
                }
                body.add_item(device, 1);
            }
            Effect::Craft { robot, recipe } => {
                let body = self.body_mut(*robot)?;
                if let Some((item, _)) = recipe.inputs.iter().find(|(i, n)| body.count(i) < **n) {
                    return Err(WorldError::MissingItem {
                        robot: *robot,
                        item: item.clone(),
                    });
                }
                for (item, n) in &recipe.inputs {
                    body.remove_item(item, *n);
                }
                for (item, n) in &recipe.outputs {
                    body.add_item(item, *n);
                }
            }
            Effect::Build { builder, spawn } => {
                if self.robots.contains_key(&spawn.child) {
                    return Err(WorldError::DuplicateRobot(spawn.child));
                }
                let parent = self.body_mut(*builder)?;
                if let Some(device) = spawn.devices.iter().find(|d| parent.count(d) == 0) {
                    return Err(WorldError::MissingItem {
                        robot: *builder,
                        item: device.clone(),
                    });
                }
                for device in &spawn.devices {
                    parent.remove_item(device, 1);
                }
                let mut child = Robot::new(spawn.child, spawn.name.clone(), parent.location);
                child.heading = parent.heading;
                child.parent = Some(*builder);
                child.equipped = spawn.devices.iter().cloned().collect();
                child.system = spawn.system;
                self.add_robot(child)?;
            }
            Effect::Salvage { robot, target } => {
                self.body_mut(*robot)?;
                let salvaged = self
                    .robots
                    .remove(target)
                    .ok_or(WorldError::NoSuchRobot(*target))?;
                let body = self.body_mut(*robot)?;
                for (item, n) in &salvaged.inventory {
                    body.add_item(item, *n);
                }
                for device in &salvaged.equipped {
                    body.add_item(device, 1);
                }
            }
            Effect::Say { robot, message } => {
                self.body_mut(*robot)?;
                self.messages.push(Message {
                    tick: self.tick,
                    from: *robot,
                    text: message.clone(),
                });
            }
            Effect::Log { .. } => {}
            Effect::SelfDestruct { robot } => {
                self.robots
                    .remove(robot)
                    .ok_or(WorldError::NoSuchRobot(*robot))?;
            }
        }
        Ok(())
    }
}

impl WorldView for World {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn seed(&self) -> u64 {
        self.seed
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn robot(&self, id: RobotId) -> Option<&Robot> {
        self.robots.get(&id)
    }

    fn robot_at(&self, at: Coord) -> Option<RobotId> {
        self.robots
            .values()
            .find(|r| r.location == at)
            .map(|r| r.id)
    }

    fn entity(&self, name: &str) -> Option<&EntityInfo> {
        self.entities.get(name)
    }

    fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    fn next_robot_id(&self) -> RobotId {
        self.next_id
    }
}

/// Deterministic 64-bit mix of a seed and an index.
#[must_use]
pub fn mix(seed: u64, index: u64) -> u64 {
    let mut x = seed.wrapping_add(index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}
