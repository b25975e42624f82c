//! Tick scheduler.
//!
//! Each tick visits every robot context in ascending id order and steps its
//! machine until the robot's fuel runs out, a tangible command ends its
//! quantum, it starts waiting, or it finishes. Effects are applied to the
//! world as soon as the step proposing them returns, so a robot visited
//! later in a tick sees everything earlier robots did.
//!
//! Robots built during a tick are registered immediately but first run on
//! the following tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::{Program, RobotContext, Status};
use crate::error::Exn;
use crate::gate::{self, Missing};
use crate::requirements::Requirements;
use crate::world::{Effect, Robot, RobotId, World, WorldError, WorldView};

/// Scheduler limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Machine transitions each robot may take per tick.
    pub fuel_per_tick: u64,
    /// Transitions an atomic block may take before it is aborted.
    pub max_atomic_steps: u64,
    /// Refuse to load programs whose requirements the robot cannot meet.
    pub strict_requirements: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fuel_per_tick: 256,
            max_atomic_steps: 10_000,
            strict_requirements: false,
        }
    }
}

/// Errors registering robots or loading programs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No context for this robot.
    #[error("no robot with id {0}")]
    NoSuchRobot(RobotId),
    /// The robot is still running a program.
    #[error("robot {0} is still running")]
    Busy(RobotId),
    /// The robot cannot meet the program's requirements.
    #[error("robot {robot} cannot run the program: {missing}")]
    Unsatisfied {
        /// Robot.
        robot: RobotId,
        /// What it lacks.
        missing: Missing,
    },
    /// The world rejected the robot.
    #[error(transparent)]
    World(#[from] WorldError),
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickReport {
    /// The tick that ran.
    pub tick: u64,
    /// Machine transitions taken, per robot.
    pub steps: BTreeMap<RobotId, u64>,
    /// Effects applied, in order, with the robot that proposed each.
    pub effects: Vec<Effect>,
    /// Effects the world refused.
    pub rejected: usize,
    /// Robots built this tick.
    pub spawned: Vec<RobotId>,
    /// Robots whose context was dropped: destroyed or salvaged.
    pub removed: Vec<RobotId>,
    /// Robots stopped by an unhandled exception.
    pub errored: Vec<RobotId>,
}

impl TickReport {
    /// Total transitions taken this tick.
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.steps.values().sum()
    }
}

/// Drives every robot's machine against one shared world.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
    contexts: BTreeMap<RobotId, RobotContext>,
}

impl Scheduler {
    /// Create a scheduler with no robots.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            contexts: BTreeMap::new(),
        }
    }

    /// Scheduler limits.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Context of one robot.
    #[must_use]
    pub fn context(&self, id: RobotId) -> Option<&RobotContext> {
        self.contexts.get(&id)
    }

    /// All contexts in id order.
    pub fn contexts(&self) -> impl Iterator<Item = &RobotContext> {
        self.contexts.values()
    }

    /// Check if no robot has anything left to do.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.contexts
            .values()
            .all(|ctx| matches!(ctx.status(), Status::Done | Status::Errored))
    }

    /// Add a robot body to the world and start running `program` on it.
    ///
    /// # Errors
    ///
    /// Fails if the world rejects the body, or if requirements are strict
    /// and the robot cannot meet them; the body is not added in that case.
    pub fn spawn(
        &mut self,
        world: &mut World,
        robot: Robot,
        program: Option<&Program>,
    ) -> Result<RobotId, SchedulerError> {
        let id = world.add_robot(robot)?;
        if let Err(e) = self.attach(world, id, program) {
            world.remove_robot(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Create a context for a robot already in the world.
    ///
    /// # Errors
    ///
    /// Fails if the body is missing or requirements are strict and unmet.
    pub fn attach(
        &mut self,
        world: &World,
        id: RobotId,
        program: Option<&Program>,
    ) -> Result<(), SchedulerError> {
        if world.robot(id).is_none() {
            return Err(SchedulerError::NoSuchRobot(id));
        }
        let ctx = match program {
            Some(program) => {
                let warning = self.precheck(world, id, &program.requirements)?;
                let mut ctx = RobotContext::new(id, program);
                if let Some(warning) = warning {
                    ctx.push_log(world.tick, warning);
                }
                ctx
            }
            None => RobotContext::idle(id),
        };
        info!(robot = id, "robot registered");
        self.contexts.insert(id, ctx);
        Ok(())
    }

    /// Run another program on an idle robot, keeping its earlier definitions.
    ///
    /// References to those definitions count toward the program's
    /// requirements.
    ///
    /// # Errors
    ///
    /// Fails if the robot is unknown, still running, or requirements are
    /// strict and unmet.
    pub fn submit(&mut self, world: &World, id: RobotId, program: &Program) -> Result<(), SchedulerError> {
        let ctx = self.contexts.get(&id).ok_or(SchedulerError::NoSuchRobot(id))?;
        if !matches!(ctx.status(), Status::Done | Status::Errored) {
            return Err(SchedulerError::Busy(id));
        }
        let needed = ctx.requirements_of(&program.term).union(&program.requirements);
        let warning = self.precheck(world, id, &needed)?;
        let ctx = self
            .contexts
            .get_mut(&id)
            .ok_or(SchedulerError::NoSuchRobot(id))?;
        if let Some(warning) = warning {
            ctx.push_log(world.tick, warning);
        }
        ctx.load(program);
        debug!(robot = id, "program submitted");
        Ok(())
    }

    fn precheck(&self, world: &World, id: RobotId, needed: &Requirements) -> Result<Option<String>, SchedulerError> {
        let missing = gate::precheck(world, id, needed);
        if missing.is_empty() {
            return Ok(None);
        }
        warn!(robot = id, %missing, "program requirements not met");
        if self.config.strict_requirements {
            return Err(SchedulerError::Unsatisfied { robot: id, missing });
        }
        Ok(Some(format!("warning: {missing}")))
    }

    /// Run one tick and advance the world's clock.
    pub fn run_tick(&mut self, world: &mut World) -> TickReport {
        let mut report = TickReport {
            tick: world.tick,
            ..TickReport::default()
        };

        // Robots built during this tick join the map below but are not in this list.
        let ids: Vec<RobotId> = self.contexts.keys().copied().collect();
        for id in ids {
            if world.robot(id).is_none() {
                debug!(robot = id, "body gone, dropping context");
                self.contexts.remove(&id);
                report.removed.push(id);
                continue;
            }
            self.run_quantum(world, id, &mut report);
        }

        world.advance_tick();
        report
    }

    /// Run `n` ticks.
    pub fn run_ticks(&mut self, world: &mut World, n: u64) -> Vec<TickReport> {
        (0..n).map(|_| self.run_tick(world)).collect()
    }

    /// Run ticks until every robot is done or `max_ticks` have passed.
    pub fn run_until_idle(&mut self, world: &mut World, max_ticks: u64) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for _ in 0..max_ticks {
            if self.is_idle() {
                break;
            }
            reports.push(self.run_tick(world));
        }
        reports
    }

    /// Step one robot for its share of the tick.
    fn run_quantum(&mut self, world: &mut World, id: RobotId, report: &mut TickReport) {
        let SchedulerConfig {
            fuel_per_tick,
            max_atomic_steps,
            ..
        } = self.config;
        let Some(ctx) = self.contexts.get_mut(&id) else {
            return;
        };
        match ctx.status() {
            Status::Done | Status::Errored => return,
            Status::Waiting(until) if until > world.tick => return,
            _ => {}
        }

        let mut fuel = fuel_per_tick;
        let mut atomic_steps = 0;
        let mut steps = 0;
        let mut born = Vec::new();
        let mut destroyed = false;

        loop {
            let machine = ctx.machine();
            if machine.is_done() || machine.waiting_until().is_some_and(|until| until > world.tick) {
                break;
            }
            // Atomic blocks keep the floor past fuel exhaustion, up to their own
            // limit. The count is not reset, so every enclosing block is
            // abandoned in turn once the limit is hit.
            if machine.state().in_atomic() {
                atomic_steps += 1;
                if atomic_steps > max_atomic_steps {
                    warn!(robot = id, max_atomic_steps, "atomic block too long");
                    ctx.machine_mut().abort_atomic(Exn::AtomicTooLong(max_atomic_steps));
                }
            } else if fuel == 0 {
                break;
            }

            let emitted = ctx.machine_mut().advance(id, &*world);
            ctx.count_step();
            fuel = fuel.saturating_sub(1);
            steps += 1;

            for effect in emitted.effects {
                match effect {
                    Effect::Log { message, .. } => {
                        debug!(robot = id, %message, "log");
                        ctx.push_log(world.tick, message);
                    }
                    effect => {
                        if let Err(e) = world.apply(&effect) {
                            warn!(robot = id, error = %e, ?effect, "effect rejected");
                            report.rejected += 1;
                            continue;
                        }
                        debug!(robot = id, ?effect, "effect applied");
                        match &effect {
                            Effect::Build { spawn, .. } => {
                                info!(robot = id, child = spawn.child, name = %spawn.name, "robot built");
                                report.spawned.push(spawn.child);
                                born.push(RobotContext::from_spawn((**spawn).clone()));
                            }
                            Effect::SelfDestruct { .. } => {
                                info!(robot = id, "robot self-destructed");
                                destroyed = true;
                            }
                            _ => {}
                        }
                        report.effects.push(effect);
                    }
                }
            }

            if destroyed || (emitted.yielded && !ctx.machine().state().in_atomic()) {
                break;
            }
        }

        report.steps.insert(id, steps);
        let dropped = ctx.maybe_collect();
        if dropped > 0 {
            debug!(robot = id, dropped, "store cells collected");
        }
        if destroyed {
            self.contexts.remove(&id);
            report.removed.push(id);
        } else if let Some(exn) = ctx.settle(&*world) {
            info!(robot = id, error = %exn.describe(&*world), "robot crashed");
            report.errored.push(id);
        }
        for child in born {
            self.contexts.insert(child.id(), child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{Capability, Const, Term};
    use crate::world::{Coord, EntityInfo, Grid};

    fn create_test_world() -> World {
        let mut world = World::new(Grid::new(6, 6).unwrap(), 5);
        world.add_entity(EntityInfo::device("treads", [Capability::Move, Capability::Turn]));
        world
    }

    fn system_robot(id: RobotId, at: Coord) -> Robot {
        let mut robot = Robot::new(id, format!("bot{id}"), at);
        robot.system = true;
        robot
    }

    fn forever(cmd: Term) -> Term {
        Term::let_in(
            "loop",
            Term::lambda("u", Term::seq(cmd, Term::app(Term::var("loop"), Term::Unit))),
            Term::app(Term::var("loop"), Term::Unit),
        )
    }

    #[test]
    fn test_fuel_bounds_each_tick() {
        let mut world = create_test_world();
        let mut scheduler = Scheduler::new(SchedulerConfig {
            fuel_per_tick: 50,
            ..SchedulerConfig::default()
        });
        let program = Program::new(forever(Term::Const(Const::Noop)));
        scheduler
            .spawn(&mut world, system_robot(1, Coord::new(0, 0)), Some(&program))
            .unwrap();

        for report in scheduler.run_ticks(&mut world, 3) {
            assert_eq!(report.steps.get(&1), Some(&50));
        }
        assert_eq!(scheduler.context(1).unwrap().status(), Status::Active);
        assert_eq!(world.tick, 3);
    }

    #[test]
    fn test_strict_requirements_refuse_load() {
        let mut world = create_test_world();
        let mut scheduler = Scheduler::new(SchedulerConfig {
            strict_requirements: true,
            ..SchedulerConfig::default()
        });
        let program = Program::new(Term::Const(Const::Move));
        let err = scheduler
            .spawn(&mut world, Robot::new(1, "plain", Coord::new(0, 0)), Some(&program))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Unsatisfied { robot: 1, .. }));
        assert!(world.robot(1).is_none());
    }

    #[test]
    fn test_lenient_requirements_log_warning() {
        let mut world = create_test_world();
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let program = Program::new(Term::Const(Const::Move));
        scheduler
            .spawn(&mut world, Robot::new(1, "plain", Coord::new(0, 0)), Some(&program))
            .unwrap();
        let log = scheduler.context(1).unwrap().log();
        assert_eq!(log[0].text, "warning: missing capabilities: move");
    }

    #[test]
    fn test_submit_requires_idle_robot() {
        let mut world = create_test_world();
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler
            .spawn(&mut world, system_robot(1, Coord::new(0, 0)), None)
            .unwrap();
        let wait = Program::new(Term::call(Const::Wait, [Term::Int(5)]));
        scheduler.submit(&world, 1, &wait).unwrap();
        scheduler.run_tick(&mut world);
        assert!(matches!(
            scheduler.submit(&world, 1, &wait),
            Err(SchedulerError::Busy(1))
        ));
        assert!(matches!(
            scheduler.submit(&world, 9, &wait),
            Err(SchedulerError::NoSuchRobot(9))
        ));
    }

    #[test]
    fn test_run_until_idle_stops_early() {
        let mut world = create_test_world();
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        let program = Program::new(Term::call(Const::Log, [Term::text("hello")]));
        scheduler
            .spawn(&mut world, system_robot(1, Coord::new(0, 0)), Some(&program))
            .unwrap();
        let reports = scheduler.run_until_idle(&mut world, 100);
        assert_eq!(reports.len(), 1);
        let ctx = scheduler.context(1).unwrap();
        assert_eq!(ctx.status(), Status::Done);
        assert_eq!(ctx.log()[0].text, "hello");
        assert!(reports[0].effects.is_empty());
    }
}
