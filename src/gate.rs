//! Capability gate.
//!
//! Two checks against the capabilities a robot's equipped devices grant:
//! a static pre-check of a whole program's [`Requirements`] when it is
//! loaded, and a dynamic check before every command executes.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::Exn;
use crate::lang::{Capability, Const};
use crate::requirements::Requirements;
use crate::world::{RobotId, WorldView};

/// What a robot lacks to run a program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Missing {
    /// Capabilities no equipped device grants.
    pub capabilities: BTreeSet<Capability>,
    /// Devices the program uses that the robot neither carries nor has equipped.
    pub devices: BTreeSet<String>,
}

impl Missing {
    /// Check if nothing is missing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.devices.is_empty()
    }
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.capabilities.is_empty() {
            let names: Vec<&str> = self.capabilities.iter().map(|c| c.name()).collect();
            parts.push(format!("missing capabilities: {}", names.join(", ")));
        }
        if !self.devices.is_empty() {
            let names: Vec<&str> = self.devices.iter().map(String::as_str).collect();
            parts.push(format!("missing devices: {}", names.join(", ")));
        }
        f.write_str(&parts.join("; "))
    }
}

/// Compare a program's requirements against what the robot has right now.
#[must_use]
pub fn precheck(world: &dyn WorldView, robot: RobotId, reqs: &Requirements) -> Missing {
    let granted = world.capabilities_of(robot);
    let Some(body) = world.robot(robot) else {
        return Missing {
            capabilities: reqs.capabilities.clone(),
            devices: reqs.devices.clone(),
        };
    };
    if body.system {
        return Missing::default();
    }
    Missing {
        capabilities: reqs.capabilities.difference(&granted).copied().collect(),
        devices: reqs
            .devices
            .iter()
            .filter(|d| !body.has_equipped(d) && body.count(d) == 0)
            .cloned()
            .collect(),
    }
}

/// Check the capability a command needs immediately before it runs.
///
/// # Errors
///
/// Returns [`Exn::MissingCapability`] if none of the robot's equipped devices
/// grants it.
pub fn check_command(world: &dyn WorldView, robot: RobotId, command: Const) -> Result<(), Exn> {
    let Some(capability) = command.info().capability else {
        return Ok(());
    };
    if world.capabilities_of(robot).contains(&capability) {
        Ok(())
    } else {
        Err(Exn::MissingCapability {
            capability,
            command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Coord, EntityInfo, Grid, Robot, World};

    fn create_test_world() -> World {
        let mut world = World::new(Grid::new(4, 4).unwrap(), 0);
        world.add_entity(EntityInfo::device("treads", [Capability::Move, Capability::Turn]));
        world.add_entity(EntityInfo::device("logger", [Capability::Log]));
        let mut robot = Robot::new(1, "walker", Coord::new(0, 0));
        robot.equipped.insert("treads".into());
        robot.add_item("logger", 1);
        world.add_robot(robot).unwrap();
        world
    }

    #[test]
    fn test_dynamic_check() {
        let mut world = create_test_world();
        assert!(check_command(&world, 1, Const::Move).is_ok());
        assert!(check_command(&world, 1, Const::Noop).is_ok());
        assert_eq!(
            check_command(&world, 1, Const::Grab),
            Err(Exn::MissingCapability {
                capability: Capability::Grab,
                command: Const::Grab
            })
        );

        world.robot_mut(1).unwrap().equipped.clear();
        assert!(check_command(&world, 1, Const::Move).is_err());
    }

    #[test]
    fn test_precheck_reports_capabilities_and_devices() {
        let world = create_test_world();
        let reqs = Requirements {
            capabilities: [Capability::Move, Capability::Log, Capability::Build]
                .into_iter()
                .collect(),
            devices: ["logger".to_string(), "drill".to_string()].into_iter().collect(),
            ..Requirements::default()
        };
        let missing = precheck(&world, 1, &reqs);
        assert_eq!(
            missing.capabilities.into_iter().collect::<Vec<_>>(),
            vec![Capability::Build, Capability::Log]
        );
        assert_eq!(missing.devices.into_iter().collect::<Vec<_>>(), vec!["drill".to_string()]);
    }

    #[test]
    fn test_system_robot_lacks_nothing() {
        let mut world = create_test_world();
        world.robot_mut(1).unwrap().system = true;
        let reqs = Requirements {
            capabilities: Capability::ALL.into_iter().collect(),
            ..Requirements::default()
        };
        assert!(precheck(&world, 1, &reqs).is_empty());
    }

    #[test]
    fn test_missing_display() {
        let missing = Missing {
            capabilities: [Capability::Move].into_iter().collect(),
            devices: ["drill".to_string()].into_iter().collect(),
        };
        assert_eq!(missing.to_string(), "missing capabilities: move; missing devices: drill");
    }
}
