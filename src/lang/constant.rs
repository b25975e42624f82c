//! Built-in constants and the table describing them.
//!
//! Every primitive is described by one [`ConstInfo`] entry: its arity,
//! whether it is a pure function or a command, which capability it needs
//! and whether executing it ends the robot's quantum for the tick. The
//! requirements analyzer, the capability gate and the machine all consult
//! this one table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lang::Capability;

/// A built-in constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Const {
    // Commands.
    /// Do nothing.
    Noop,
    /// Sleep for a number of ticks.
    Wait,
    /// Destroy the executing robot.
    Selfdestruct,
    /// Step one cell along the current heading.
    Move,
    /// Turn to an absolute or relative direction.
    Turn,
    /// Pick up the entity in the current cell.
    Grab,
    /// Put an inventory item in the current cell.
    Place,
    /// Give an item to another robot.
    Give,
    /// Equip a device from inventory.
    Equip,
    /// Move an equipped device back to inventory.
    Unequip,
    /// Craft an item.
    Make,
    /// Whether the robot carries at least one of an item.
    Has,
    /// How many of an item the robot carries.
    Count,
    /// Build a new robot running the given delayed program.
    Build,
    /// Dismantle the robot in front.
    Salvage,
    /// Broadcast a message.
    Say,
    /// Append to the robot's log.
    Log,
    /// Identify the entity in an adjacent cell.
    Scan,
    /// Whether the cell ahead is blocked.
    Blocked,
    /// Whether the named entity is in the current cell.
    Ishere,
    /// Current coordinates.
    Whereami,
    /// Current heading.
    Heading,
    /// Current tick.
    Time,
    /// Random integer in `[0, n)`.
    Random,
    /// Own name.
    Whoami,
    /// Reference to the executing robot.
    #[serde(rename = "self")]
    SelfRef,
    /// Reference to the robot's builder.
    Parent,
    /// Raise an exception with a message.
    Fail,
    /// Return a value as a command.
    Return,
    /// Run the first block, falling back to the second on exception.
    Try,
    /// Run a block without interleaving other robots.
    Atomic,

    // Functions.
    /// Force a delayed value.
    Force,
    /// Left injection.
    Inl,
    /// Right injection.
    Inr,
    /// First projection.
    Fst,
    /// Second projection.
    Snd,
    /// Boolean negation.
    Not,
    /// Boolean conjunction.
    And,
    /// Boolean disjunction.
    Or,
    /// Integer negation.
    Neg,
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Truncating division.
    Div,
    /// Exponentiation.
    Exp,
    /// Structural equality.
    Eq,
    /// Structural inequality.
    Neq,
    /// Less than.
    Lt,
    /// Greater than.
    Gt,
    /// Less than or equal.
    Leq,
    /// Greater than or equal.
    Geq,
    /// Render any value as text.
    Format,
    /// Concatenate two texts.
    Concat,
    /// Length of a text in characters.
    Chars,
}

/// Whether a constant computes a value or performs an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstKind {
    /// Applied as soon as it is saturated.
    Function,
    /// Saturated applications are command values, run only when executed.
    Command,
}

/// Static description of a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstInfo {
    /// Number of arguments before the constant is saturated.
    pub arity: usize,
    /// Function or command.
    pub kind: ConstKind,
    /// Capability required to use the constant.
    pub capability: Option<Capability>,
    /// Executing the command ends the robot's quantum for this tick.
    pub tangible: bool,
}

const fn command(arity: usize, capability: Option<Capability>, tangible: bool) -> ConstInfo {
    ConstInfo {
        arity,
        kind: ConstKind::Command,
        capability,
        tangible,
    }
}

const fn function(arity: usize, capability: Option<Capability>) -> ConstInfo {
    ConstInfo {
        arity,
        kind: ConstKind::Function,
        capability,
        tangible: false,
    }
}

impl Const {
    /// Look up this constant in the primitive table.
    #[must_use]
    pub const fn info(self) -> ConstInfo {
        use Capability as C;
        match self {
            Const::Noop => command(0, None, false),
            Const::Wait => command(1, Some(C::Wait), false),
            Const::Selfdestruct => command(0, Some(C::Selfdestruct), true),
            Const::Move => command(0, Some(C::Move), true),
            Const::Turn => command(1, Some(C::Turn), true),
            Const::Grab => command(0, Some(C::Grab), true),
            Const::Place => command(1, Some(C::Place), true),
            Const::Give => command(2, Some(C::Give), true),
            Const::Equip => command(1, Some(C::Equip), true),
            Const::Unequip => command(1, Some(C::Unequip), true),
            Const::Make => command(1, Some(C::Make), true),
            Const::Has => command(1, None, false),
            Const::Count => command(1, Some(C::Count), false),
            Const::Build => command(1, Some(C::Build), true),
            Const::Salvage => command(0, Some(C::Salvage), true),
            Const::Say => command(1, Some(C::Broadcast), true),
            Const::Log => command(1, Some(C::Log), false),
            Const::Scan => command(1, Some(C::Scan), false),
            Const::Blocked => command(0, Some(C::Sensefront), false),
            Const::Ishere => command(1, Some(C::Sensehere), false),
            Const::Whereami => command(0, Some(C::Senseloc), false),
            Const::Heading => command(0, Some(C::Orient), false),
            Const::Time => command(0, Some(C::Time), false),
            Const::Random => command(1, Some(C::Random), false),
            Const::Whoami => command(0, Some(C::Whoami), false),
            Const::SelfRef | Const::Parent => command(0, None, false),
            Const::Return | Const::Fail => command(1, None, false),
            Const::Try => command(2, Some(C::Try), false),
            Const::Atomic => command(1, Some(C::Atomic), false),

            Const::Force => function(1, None),
            Const::Inl | Const::Inr => function(1, Some(C::Sum)),
            Const::Fst | Const::Snd => function(1, Some(C::Product)),
            Const::Not => function(1, Some(C::Logic)),
            Const::And | Const::Or => function(2, Some(C::Logic)),
            Const::Neg => function(1, Some(C::Arith)),
            Const::Add | Const::Sub | Const::Mul | Const::Div | Const::Exp => {
                function(2, Some(C::Arith))
            }
            Const::Eq | Const::Neq | Const::Lt | Const::Gt | Const::Leq | Const::Geq => {
                function(2, Some(C::Compare))
            }
            Const::Format | Const::Chars => function(1, Some(C::Text)),
            Const::Concat => function(2, Some(C::Text)),
        }
    }

    /// Whether this constant is a command.
    #[must_use]
    pub const fn is_command(self) -> bool {
        matches!(self.info().kind, ConstKind::Command)
    }

    /// Surface name of the constant.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Const::Noop => "noop",
            Const::Wait => "wait",
            Const::Selfdestruct => "selfdestruct",
            Const::Move => "move",
            Const::Turn => "turn",
            Const::Grab => "grab",
            Const::Place => "place",
            Const::Give => "give",
            Const::Equip => "equip",
            Const::Unequip => "unequip",
            Const::Make => "make",
            Const::Has => "has",
            Const::Count => "count",
            Const::Build => "build",
            Const::Salvage => "salvage",
            Const::Say => "say",
            Const::Log => "log",
            Const::Scan => "scan",
            Const::Blocked => "blocked",
            Const::Ishere => "ishere",
            Const::Whereami => "whereami",
            Const::Heading => "heading",
            Const::Time => "time",
            Const::Random => "random",
            Const::Whoami => "whoami",
            Const::SelfRef => "self",
            Const::Parent => "parent",
            Const::Fail => "fail",
            Const::Return => "return",
            Const::Try => "try",
            Const::Atomic => "atomic",
            Const::Force => "force",
            Const::Inl => "inl",
            Const::Inr => "inr",
            Const::Fst => "fst",
            Const::Snd => "snd",
            Const::Not => "not",
            Const::And => "&&",
            Const::Or => "||",
            Const::Neg => "negate",
            Const::Add => "+",
            Const::Sub => "-",
            Const::Mul => "*",
            Const::Div => "/",
            Const::Exp => "^",
            Const::Eq => "==",
            Const::Neq => "!=",
            Const::Lt => "<",
            Const::Gt => ">",
            Const::Leq => "<=",
            Const::Geq => ">=",
            Const::Format => "format",
            Const::Concat => "++",
            Const::Chars => "chars",
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_is_tangible_command() {
        let info = Const::Move.info();
        assert_eq!(info.kind, ConstKind::Command);
        assert_eq!(info.arity, 0);
        assert_eq!(info.capability, Some(Capability::Move));
        assert!(info.tangible);
    }

    #[test]
    fn test_arithmetic_is_binary_function() {
        let info = Const::Add.info();
        assert_eq!(info.kind, ConstKind::Function);
        assert_eq!(info.arity, 2);
        assert!(!Const::Add.is_command());
    }

    #[test]
    fn test_return_arity() {
        assert_eq!(Const::Return.info().arity, 1);
        assert_eq!(Const::SelfRef.info().arity, 0);
        assert_eq!(Const::Parent.info().arity, 0);
    }

    #[test]
    fn test_self_serializes_as_keyword() {
        assert_eq!(serde_json::to_string(&Const::SelfRef).unwrap(), "\"self\"");
    }
}
