//! Capabilities: the permissions a robot needs to perform classes of operation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A primitive ability a robot may be granted by its equipped devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Step forward one cell.
    Move,
    /// Change heading.
    Turn,
    /// Pick up the entity under the robot.
    Grab,
    /// Put an entity down.
    Place,
    /// Hand an item to an adjacent robot.
    Give,
    /// Equip a device from inventory.
    Equip,
    /// Return an equipped device to inventory.
    Unequip,
    /// Craft items from recipes.
    Make,
    /// Count inventory items.
    Count,
    /// Construct new robots.
    Build,
    /// Dismantle another robot.
    Salvage,
    /// Destroy oneself.
    Selfdestruct,
    /// Broadcast messages to other robots.
    Broadcast,
    /// Write to the robot's own log.
    Log,
    /// Identify adjacent entities.
    Scan,
    /// Check whether the cell ahead is blocked.
    Sensefront,
    /// Check what lies under the robot.
    Sensehere,
    /// Know the robot's coordinates.
    Senseloc,
    /// Know the robot's heading.
    Orient,
    /// Read the global clock.
    Time,
    /// Sleep for a number of ticks.
    Wait,
    /// Draw random numbers.
    Random,
    /// Know the robot's own name.
    Whoami,
    /// Construct closures.
    Lambda,
    /// Write self-referential definitions.
    Recursion,
    /// Use recursive type annotations.
    RecursiveTypes,
    /// Make top-level definitions.
    Env,
    /// Branch on booleans.
    Cond,
    /// Pattern match with `case`.
    Case,
    /// Build sum values.
    Sum,
    /// Build and project pairs.
    Product,
    /// Integer arithmetic.
    Arith,
    /// Compare values.
    Compare,
    /// Boolean connectives.
    Logic,
    /// Manipulate text.
    Text,
    /// Catch exceptions.
    Try,
    /// Run command blocks atomically.
    Atomic,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 37] = [
        Capability::Move,
        Capability::Turn,
        Capability::Grab,
        Capability::Place,
        Capability::Give,
        Capability::Equip,
        Capability::Unequip,
        Capability::Make,
        Capability::Count,
        Capability::Build,
        Capability::Salvage,
        Capability::Selfdestruct,
        Capability::Broadcast,
        Capability::Log,
        Capability::Scan,
        Capability::Sensefront,
        Capability::Sensehere,
        Capability::Senseloc,
        Capability::Orient,
        Capability::Time,
        Capability::Wait,
        Capability::Random,
        Capability::Whoami,
        Capability::Lambda,
        Capability::Recursion,
        Capability::RecursiveTypes,
        Capability::Env,
        Capability::Cond,
        Capability::Case,
        Capability::Sum,
        Capability::Product,
        Capability::Arith,
        Capability::Compare,
        Capability::Logic,
        Capability::Text,
        Capability::Try,
        Capability::Atomic,
    ];

    /// Lower-case name used in diagnostics and session files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Capability::Move => "move",
            Capability::Turn => "turn",
            Capability::Grab => "grab",
            Capability::Place => "place",
            Capability::Give => "give",
            Capability::Equip => "equip",
            Capability::Unequip => "unequip",
            Capability::Make => "make",
            Capability::Count => "count",
            Capability::Build => "build",
            Capability::Salvage => "salvage",
            Capability::Selfdestruct => "selfdestruct",
            Capability::Broadcast => "broadcast",
            Capability::Log => "log",
            Capability::Scan => "scan",
            Capability::Sensefront => "sensefront",
            Capability::Sensehere => "sensehere",
            Capability::Senseloc => "senseloc",
            Capability::Orient => "orient",
            Capability::Time => "time",
            Capability::Wait => "wait",
            Capability::Random => "random",
            Capability::Whoami => "whoami",
            Capability::Lambda => "lambda",
            Capability::Recursion => "recursion",
            Capability::RecursiveTypes => "recursive_types",
            Capability::Env => "env",
            Capability::Cond => "cond",
            Capability::Case => "case",
            Capability::Sum => "sum",
            Capability::Product => "product",
            Capability::Arith => "arith",
            Capability::Compare => "compare",
            Capability::Logic => "logic",
            Capability::Text => "text",
            Capability::Try => "try",
            Capability::Atomic => "atomic",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
