//! Exceptions raised by running programs.

use thiserror::Error;

use crate::lang::{Capability, Const};
use crate::world::{RobotId, WorldView};

/// An exception raised inside the machine.
///
/// Everything except [`Exn::Fatal`] can be caught by `try`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Exn {
    /// Raised by the `fail` command.
    #[error("{0}")]
    User(String),
    /// The robot lacks the capability a command needs.
    #[error("missing capability '{capability}' needed for '{command}'")]
    MissingCapability {
        /// Capability that was required.
        capability: Capability,
        /// Command that required it.
        command: Const,
    },
    /// Movement into a wall, an obstructing entity, another robot or off the map.
    #[error("the path is blocked")]
    Blocked,
    /// Nothing to grab in the current cell.
    #[error("there is nothing here")]
    NothingHere,
    /// Something already occupies the target cell.
    #[error("there is already something here")]
    CellOccupied,
    /// Not enough of an item.
    #[error("not enough '{item}': need {needed}, have {have}")]
    Insufficient {
        /// Item name.
        item: String,
        /// Amount required.
        needed: u32,
        /// Amount carried.
        have: u32,
    },
    /// The entity catalog does not know this name.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
    /// The entity grants no capabilities.
    #[error("'{0}' is not a device")]
    NotADevice(String),
    /// The device is not equipped.
    #[error("'{0}' is not equipped")]
    NotEquipped(String),
    /// No recipe produces this item.
    #[error("there is no recipe for '{0}'")]
    NoRecipe(String),
    /// No robot where one was expected.
    #[error("there is no robot there")]
    NoRobot,
    /// The target robot is out of reach.
    #[error("robot {0} is too far away")]
    TooFar(RobotId),
    /// The target robot cannot be salvaged.
    #[error("robot {0} cannot be salvaged")]
    CannotSalvage(RobotId),
    /// The builder does not carry devices for every capability the new robot needs.
    #[error("missing devices providing: {}", join(.0))]
    MissingDevices(Vec<Capability>),
    /// No `case` branch matched.
    #[error("no case branch matches {0}")]
    NoMatch(String),
    /// Arithmetic error.
    #[error("arithmetic error: {0}")]
    Arithmetic(&'static str),
    /// A recursive binding was demanded while it was being computed.
    #[error("infinite loop detected while evaluating '{0}'")]
    InfiniteLoop(String),
    /// `wait` inside an atomic block.
    #[error("cannot wait inside an atomic block")]
    WaitInAtomic,
    /// An atomic block ran past the configured step limit.
    #[error("atomic block exceeded {0} steps")]
    AtomicTooLong(u64),
    /// Internal invariant violation; never caught.
    #[error("fatal: {0}")]
    Fatal(String),
}

fn join(caps: &[Capability]) -> String {
    caps.iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Exn {
    /// Whether a `try` handler may intercept this exception.
    #[must_use]
    pub const fn is_catchable(&self) -> bool {
        !matches!(self, Exn::Fatal(_))
    }

    /// Human-readable message with robot ids resolved to names.
    #[must_use]
    pub fn describe(&self, world: &dyn WorldView) -> String {
        let name = |id: RobotId| {
            world
                .robot(id)
                .map_or_else(|| format!("#{id}"), |r| format!("'{}'", r.name))
        };
        match self {
            Exn::TooFar(id) => format!("robot {} is too far away", name(*id)),
            Exn::CannotSalvage(id) => format!("robot {} cannot be salvaged", name(*id)),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Exn::MissingCapability {
            capability: Capability::Move,
            command: Const::Move,
        };
        assert_eq!(
            e.to_string(),
            "missing capability 'move' needed for 'move'"
        );

        let e = Exn::MissingDevices(vec![Capability::Move, Capability::Log]);
        assert_eq!(e.to_string(), "missing devices providing: move, log");
    }

    #[test]
    fn test_fatal_is_not_catchable() {
        assert!(!Exn::Fatal("bad stack".into()).is_catchable());
        assert!(Exn::Blocked.is_catchable());
    }
}
