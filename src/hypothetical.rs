//! Hypothetical execution.
//!
//! Runs a program on a detached machine against a read-only snapshot of the
//! world. The hypothetical robot is not registered with any scheduler and is
//! invisible to live robots. Its effects are recorded but never applied, so
//! later steps of the same run observe the snapshot as it was.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::Program;
use crate::error::Exn;
use crate::machine::{Env, Machine, Store, Value};
use crate::world::{Coord, Effect, EntityInfo, Grid, Recipe, Robot, RobotId, WorldView};

/// Result of a hypothetical run.
#[derive(Debug, Clone, PartialEq)]
pub struct HypotheticalOutcome {
    /// Final result, or `None` if the run was cut short or is waiting.
    pub result: Option<Result<Value, Exn>>,
    /// Effects the program proposed, in order.
    pub effects: Vec<Effect>,
    /// Transitions taken.
    pub steps: u64,
}

/// A world snapshot with one hypothetical robot body laid over it.
pub struct Hypothetical<'w> {
    snapshot: &'w dyn WorldView,
    body: Robot,
}

impl<'w> Hypothetical<'w> {
    /// Overlay `body` on `snapshot`.
    ///
    /// If a live robot shares the body's id, the body stands in for it.
    #[must_use]
    pub fn new(snapshot: &'w dyn WorldView, body: Robot) -> Self {
        Self { snapshot, body }
    }

    /// Overlay a copy of an existing robot, or `None` if there is no such robot.
    #[must_use]
    pub fn for_robot(snapshot: &'w dyn WorldView, id: RobotId) -> Option<Self> {
        let body = snapshot.robot(id)?.clone();
        Some(Self::new(snapshot, body))
    }

    /// The hypothetical robot's body.
    #[must_use]
    pub const fn body(&self) -> &Robot {
        &self.body
    }

    /// Run `program` for at most `max_steps` transitions.
    #[must_use]
    pub fn run(&self, program: &Program, max_steps: u64) -> HypotheticalOutcome {
        let mut machine = Machine::program(Arc::clone(&program.term), Env::new(), Store::new());
        let effects = machine.run_detached(self.body.id, self, max_steps);
        debug!(
            robot = self.body.id,
            steps = machine.steps(),
            effects = effects.len(),
            "hypothetical run finished"
        );
        HypotheticalOutcome {
            result: machine.outcome().cloned(),
            effects,
            steps: machine.steps(),
        }
    }
}

impl fmt::Debug for Hypothetical<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hypothetical")
            .field("tick", &self.snapshot.tick())
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl WorldView for Hypothetical<'_> {
    fn tick(&self) -> u64 {
        self.snapshot.tick()
    }

    fn seed(&self) -> u64 {
        self.snapshot.seed()
    }

    fn grid(&self) -> &Grid {
        self.snapshot.grid()
    }

    fn robot(&self, id: RobotId) -> Option<&Robot> {
        if id == self.body.id {
            Some(&self.body)
        } else {
            self.snapshot.robot(id)
        }
    }

    fn robot_at(&self, at: Coord) -> Option<RobotId> {
        if at == self.body.location {
            return Some(self.body.id);
        }
        self.snapshot.robot_at(at).filter(|&id| id != self.body.id)
    }

    fn entity(&self, name: &str) -> Option<&EntityInfo> {
        self.snapshot.entity(name)
    }

    fn recipes(&self) -> &[Recipe] {
        self.snapshot.recipes()
    }

    fn next_robot_id(&self) -> RobotId {
        self.snapshot.next_robot_id().max(self.body.id.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{Capability, Const, Direction, Term};
    use crate::world::World;

    fn create_test_world() -> World {
        let mut world = World::new(Grid::new(4, 4).unwrap(), 3);
        world.add_entity(EntityInfo::device("treads", [Capability::Move, Capability::Turn]));
        let mut robot = Robot::new(1, "scout", Coord::new(1, 1));
        robot.equipped.insert("treads".into());
        world.add_robot(robot).unwrap();
        world
    }

    #[test]
    fn test_live_world_untouched() {
        let world = create_test_world();
        let before = world.clone();
        let hypo = Hypothetical::for_robot(&world, 1).unwrap();
        let outcome = hypo.run(
            &Program::new(Term::block([Term::Const(Const::Move), Term::Const(Const::Move)])),
            1_000,
        );

        assert_eq!(outcome.result, Some(Ok(Value::Unit)));
        assert_eq!(outcome.effects.len(), 2);
        assert!(matches!(
            outcome.effects[0],
            Effect::Move { robot: 1, to } if to == Coord::new(1, 0)
        ));
        assert_eq!(world, before);
    }

    #[test]
    fn test_body_overrides_live_robot() {
        let world = create_test_world();
        let mut body = world.robot(1).unwrap().clone();
        body.location = Coord::new(3, 3);
        body.heading = Direction::West;
        body.equipped.clear();
        let hypo = Hypothetical::new(&world, body);

        assert_eq!(hypo.robot_at(Coord::new(1, 1)), None);
        assert_eq!(hypo.robot_at(Coord::new(3, 3)), Some(1));
        assert!(hypo.capabilities_of(1).is_empty());

        let outcome = hypo.run(&Program::new(Term::Const(Const::Move)), 100);
        assert!(matches!(
            outcome.result,
            Some(Err(Exn::MissingCapability {
                capability: Capability::Move,
                ..
            }))
        ));
        assert!(outcome.effects.is_empty());
    }

    #[test]
    fn test_step_limit_cuts_run_short() {
        let world = create_test_world();
        let mut body = Robot::new(9, "ghost", Coord::new(0, 0));
        body.system = true;
        let hypo = Hypothetical::new(&world, body);
        let spin = Term::let_in(
            "spin",
            Term::lambda("u", Term::app(Term::var("spin"), Term::Unit)),
            Term::app(Term::var("spin"), Term::Unit),
        );
        let outcome = hypo.run(&Program::new(spin), 40);
        assert_eq!(outcome.result, None);
        assert_eq!(outcome.steps, 40);
        assert!(hypo.next_robot_id() >= 10);
    }

    #[test]
    fn test_next_robot_id_saturates() {
        let world = create_test_world();
        let hypo = Hypothetical::new(&world, Robot::new(RobotId::MAX, "last", Coord::new(0, 0)));
        assert_eq!(hypo.next_robot_id(), RobotId::MAX);
    }
}
