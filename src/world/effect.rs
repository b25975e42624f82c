//! World effects proposed by the machine and applied by the scheduler.

use std::sync::Arc;

use crate::lang::{Direction, Term};
use crate::machine::{Env, Store};
use crate::world::{Coord, Recipe, RobotId};

/// A side effect a step wants applied to the shared world.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Move a robot to an adjacent cell.
    Move {
        /// Moving robot.
        robot: RobotId,
        /// Destination.
        to: Coord,
    },
    /// Change a robot's heading.
    Turn {
        /// Turning robot.
        robot: RobotId,
        /// New absolute heading.
        heading: Direction,
    },
    /// Pick up the entity in a cell.
    Grab {
        /// Grabbing robot.
        robot: RobotId,
        /// Cell emptied.
        at: Coord,
        /// Entity picked up.
        entity: String,
    },
    /// Drop an inventory item into an empty cell.
    Place {
        /// Placing robot.
        robot: RobotId,
        /// Cell filled.
        at: Coord,
        /// Entity placed.
        entity: String,
    },
    /// Transfer one item between robots.
    Give {
        /// Giver.
        from: RobotId,
        /// Receiver.
        to: RobotId,
        /// Item.
        item: String,
    },
    /// Move a device from inventory to the equipped set.
    Equip {
        /// Robot.
        robot: RobotId,
        /// Device name.
        device: String,
    },
    /// Move a device from the equipped set back to inventory.
    Unequip {
        /// Robot.
        robot: RobotId,
        /// Device name.
        device: String,
    },
    /// Consume recipe inputs and add its outputs.
    Craft {
        /// Crafting robot.
        robot: RobotId,
        /// Recipe used.
        recipe: Recipe,
    },
    /// Create a new robot next to its builder.
    Build {
        /// Building robot.
        builder: RobotId,
        /// Body and program of the new robot.
        spawn: Box<Spawn>,
    },
    /// Dismantle another robot, taking its items and devices.
    Salvage {
        /// Salvaging robot.
        robot: RobotId,
        /// Dismantled robot.
        target: RobotId,
    },
    /// Broadcast a message.
    Say {
        /// Speaker.
        robot: RobotId,
        /// Message text.
        message: String,
    },
    /// Append to the robot's own log.
    Log {
        /// Logging robot.
        robot: RobotId,
        /// Log text.
        message: String,
    },
    /// Remove the robot from the world.
    SelfDestruct {
        /// Destroyed robot.
        robot: RobotId,
    },
}

/// Everything needed to bring a built robot to life.
#[derive(Debug, Clone, PartialEq)]
pub struct Spawn {
    /// Identifier reserved for the new robot.
    pub child: RobotId,
    /// Name of the new robot.
    pub name: String,
    /// Devices moved from the builder's inventory to the child's equipment.
    pub devices: Vec<String>,
    /// Program the child starts executing.
    pub program: Arc<Term>,
    /// Environment the program is closed over, addressing `store`.
    pub env: Env,
    /// The child's own store, transplanted from the builder's.
    pub store: Store,
    /// Children of system robots are system robots.
    pub system: bool,
}

impl Effect {
    /// The robot that proposed this effect.
    #[must_use]
    pub const fn actor(&self) -> RobotId {
        match self {
            Effect::Move { robot, .. }
            | Effect::Turn { robot, .. }
            | Effect::Grab { robot, .. }
            | Effect::Place { robot, .. }
            | Effect::Equip { robot, .. }
            | Effect::Unequip { robot, .. }
            | Effect::Craft { robot, .. }
            | Effect::Salvage { robot, .. }
            | Effect::Say { robot, .. }
            | Effect::Log { robot, .. }
            | Effect::SelfDestruct { robot } => *robot,
            Effect::Give { from, .. } => *from,
            Effect::Build { builder, .. } => *builder,
        }
    }
}
