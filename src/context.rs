//! Per-robot execution context.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Exn;
use crate::lang::{Capability, Term};
use crate::machine::{Env, Machine, MachineState, Store, Value};
use crate::requirements::{requirements, with_definitions, ReqCtx, Requirements};
use crate::world::{RobotId, Spawn, WorldView};

/// An elaborated program with its statically computed requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// The program term.
    pub term: Arc<Term>,
    /// What running it requires.
    pub requirements: Requirements,
}

impl Program {
    /// Wrap a term, analyzing its requirements in an empty context.
    #[must_use]
    pub fn new(term: Term) -> Self {
        let requirements = requirements(&ReqCtx::new(), &term);
        Self {
            term: Arc::new(term),
            requirements,
        }
    }

    /// Wrap a term whose requirements were computed elsewhere.
    #[must_use]
    pub const fn with_requirements(term: Arc<Term>, requirements: Requirements) -> Self {
        Self { term, requirements }
    }
}

/// Activity of a robot's machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Has work to do this tick.
    Active,
    /// Suspended until the given tick.
    Waiting(u64),
    /// Finished normally.
    Done,
    /// Stopped by an unhandled exception.
    Errored,
}

/// One line of a robot's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Tick the entry was written.
    pub tick: u64,
    /// Text.
    pub text: String,
}

/// A robot's machine and the bookkeeping around it.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotContext {
    id: RobotId,
    machine: Machine,
    running: Option<Arc<Term>>,
    defs: Env,
    def_reqs: ReqCtx,
    log: Vec<LogEntry>,
    total_steps: u64,
    settled: bool,
    gc_threshold: usize,
}

/// Store size below which a quantum never triggers a collection.
const MIN_GC_THRESHOLD: usize = 1024;

impl RobotContext {
    /// Context that starts running `program` on an empty store.
    #[must_use]
    pub fn new(id: RobotId, program: &Program) -> Self {
        let mut ctx = Self::with_machine(
            id,
            Machine::program(Arc::clone(&program.term), Env::new(), Store::new()),
        );
        ctx.running = Some(Arc::clone(&program.term));
        ctx
    }

    /// Context with nothing to run, waiting for a program to be submitted.
    #[must_use]
    pub fn idle(id: RobotId) -> Self {
        let mut ctx = Self::with_machine(id, Machine::idle());
        ctx.settled = true;
        ctx
    }

    /// Context for a freshly built robot.
    #[must_use]
    pub fn from_spawn(spawn: Spawn) -> Self {
        let Spawn {
            child,
            program,
            env,
            store,
            ..
        } = spawn;
        let mut ctx = Self::with_machine(child, Machine::program(Arc::clone(&program), env, store));
        ctx.running = Some(program);
        ctx
    }

    fn with_machine(id: RobotId, machine: Machine) -> Self {
        Self {
            id,
            machine,
            running: None,
            defs: Env::new(),
            def_reqs: ReqCtx::new(),
            log: Vec::new(),
            total_steps: 0,
            settled: false,
            gc_threshold: MIN_GC_THRESHOLD,
        }
    }

    /// Robot id.
    #[must_use]
    pub const fn id(&self) -> RobotId {
        self.id
    }

    /// The machine.
    #[must_use]
    pub const fn machine(&self) -> &Machine {
        &self.machine
    }

    pub(crate) const fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }

    /// Definitions made by earlier programs, visible to later ones.
    #[must_use]
    pub const fn defs(&self) -> &Env {
        &self.defs
    }

    /// Requirements of `term` when it runs after the definitions made so far.
    #[must_use]
    pub fn requirements_of(&self, term: &Term) -> Requirements {
        requirements(&self.def_reqs, term)
    }

    /// The robot's log, oldest first.
    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Transitions taken over the robot's lifetime.
    #[must_use]
    pub const fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub(crate) const fn count_step(&mut self) {
        self.total_steps += 1;
    }

    /// Current activity.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self.machine.state() {
            MachineState::Done { result: Ok(_), .. } => Status::Done,
            MachineState::Done { result: Err(_), .. } => Status::Errored,
            MachineState::Waiting { until, .. } => Status::Waiting(*until),
            _ => Status::Active,
        }
    }

    /// Capabilities the robot's equipped devices grant right now.
    #[must_use]
    pub fn granted(&self, world: &dyn WorldView) -> BTreeSet<Capability> {
        world.capabilities_of(self.id)
    }

    /// Append a log line.
    pub fn push_log(&mut self, tick: u64, text: impl Into<String>) {
        self.log.push(LogEntry {
            tick,
            text: text.into(),
        });
    }

    /// Start running another program on the existing store.
    ///
    /// Earlier definitions stay in scope.
    pub fn load(&mut self, program: &Program) {
        self.machine.load(Arc::clone(&program.term), self.defs.clone());
        self.running = Some(Arc::clone(&program.term));
        self.settled = false;
    }

    /// Drop unreachable store cells once the store has grown enough since
    /// the last collection.
    pub(crate) fn maybe_collect(&mut self) -> usize {
        if self.machine.state().store().len() < self.gc_threshold {
            return 0;
        }
        let dropped = self.machine.collect_garbage(&self.defs);
        self.gc_threshold = (self.machine.state().store().len() * 2).max(MIN_GC_THRESHOLD);
        dropped
    }

    /// Bookkeeping once the machine has finished.
    ///
    /// Definitions made at top level join the persistent environment. An
    /// unhandled exception is logged and returned. Does nothing if the
    /// machine is still running or was already settled.
    pub(crate) fn settle(&mut self, world: &dyn WorldView) -> Option<Exn> {
        if self.settled {
            return None;
        }
        let outcome = self.machine.outcome()?.clone();
        self.settled = true;
        match outcome {
            Ok(Value::Bound(env)) => {
                if let Some(term) = &self.running {
                    let scope = with_definitions(&self.def_reqs, term);
                    for name in env.keys() {
                        self.def_reqs = match scope.get(name) {
                            Some(reqs) => self.def_reqs.update(name.clone(), reqs.clone()),
                            None => self.def_reqs.without(name),
                        };
                    }
                }
                self.defs = env.union(self.defs.clone());
                None
            }
            Ok(_) => None,
            Err(exn) => {
                let message = exn.describe(world);
                self.push_log(world.tick(), format!("error: {message}"));
                Some(exn)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Const;
    use crate::world::{Coord, Grid, Robot, World};

    fn create_test_world() -> World {
        let mut world = World::new(Grid::new(3, 3).unwrap(), 0);
        let mut robot = Robot::new(1, "r", Coord::new(1, 1));
        robot.system = true;
        world.add_robot(robot).unwrap();
        world
    }

    fn run_to_end(ctx: &mut RobotContext, world: &World) {
        while !ctx.machine().is_done() {
            ctx.machine_mut().advance(1, world);
        }
    }

    #[test]
    fn test_status_follows_machine() {
        let world = create_test_world();
        let mut ctx = RobotContext::new(1, &Program::new(Term::Const(Const::Noop)));
        assert_eq!(ctx.status(), Status::Active);
        run_to_end(&mut ctx, &world);
        assert_eq!(ctx.status(), Status::Done);

        let mut ctx = RobotContext::new(1, &Program::new(Term::call(Const::Fail, [Term::text("x")])));
        run_to_end(&mut ctx, &world);
        assert_eq!(ctx.status(), Status::Errored);
        assert_eq!(ctx.settle(&world), Some(Exn::User("x".into())));
        assert_eq!(ctx.log().last().map(|e| e.text.as_str()), Some("error: x"));
        assert_eq!(ctx.settle(&world), None);
    }

    #[test]
    fn test_definitions_persist_across_programs() {
        let world = create_test_world();
        let mut ctx = RobotContext::idle(1);
        ctx.load(&Program::new(Term::def("answer", Term::Int(42))));
        run_to_end(&mut ctx, &world);
        assert_eq!(ctx.settle(&world), None);
        assert!(ctx.defs().contains_key("answer"));

        ctx.load(&Program::new(Term::call(Const::Return, [Term::var("answer")])));
        run_to_end(&mut ctx, &world);
        assert_eq!(ctx.machine().outcome(), Some(&Ok(Value::Int(42))));
    }

    #[test]
    fn test_definition_block_keeps_every_name() {
        let world = create_test_world();
        let mut ctx = RobotContext::idle(1);
        ctx.load(&Program::new(Term::block([
            Term::def("x", Term::Int(1)),
            Term::def("y", Term::Int(2)),
            Term::call(Const::Log, [Term::text("defined")]),
        ])));
        run_to_end(&mut ctx, &world);
        assert_eq!(ctx.settle(&world), None);
        assert_eq!(ctx.defs().keys().collect::<Vec<_>>(), vec!["x", "y"]);

        ctx.load(&Program::new(Term::call(Const::Return, [Term::var("x")])));
        run_to_end(&mut ctx, &world);
        assert_eq!(ctx.machine().outcome(), Some(&Ok(Value::Int(1))));
    }

    #[test]
    fn test_later_program_inherits_definition_requirements() {
        let world = create_test_world();
        let mut ctx = RobotContext::idle(1);
        ctx.load(&Program::new(Term::def("m", Term::Const(Const::Move))));
        run_to_end(&mut ctx, &world);
        assert_eq!(ctx.settle(&world), None);

        let reqs = ctx.requirements_of(&Term::var("m"));
        assert!(reqs.capabilities.contains(&Capability::Move));
    }

    #[test]
    fn test_collection_waits_for_threshold() {
        let mut ctx = RobotContext::new(1, &Program::new(Term::Const(Const::Noop)));
        assert_eq!(ctx.maybe_collect(), 0);
    }

    #[test]
    fn test_program_requirements() {
        let program = Program::new(Term::Const(Const::Move));
        assert!(program.requirements.capabilities.contains(&Capability::Move));
    }
}
