//! Small-step CESK abstract machine.
//!
//! A machine state is a control (a term to evaluate, a value to return or an
//! exception to raise), an environment, a per-robot [`Store`] and an explicit
//! continuation stack of [`Frame`]s. [`step`] performs exactly one transition.
//! It reads the world through a [`WorldView`] and never changes it: world
//! changes come back as [`Effect`]s for the scheduler to apply.

mod frame;
mod primitive;
mod step;
mod store;
mod value;

pub use frame::Frame;
pub use step::step;
pub use store::{Addr, Slot, Store};
pub use value::{Env, Value};

use std::fmt;
use std::sync::Arc;

use crate::error::Exn;
use crate::lang::Term;
use crate::world::{Effect, RobotId, WorldView};

/// The complete state of one machine.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineState {
    /// Evaluate a term.
    Evaluating {
        /// Term under evaluation.
        term: Arc<Term>,
        /// Its environment.
        env: Env,
        /// The store.
        store: Store,
        /// Continuation stack.
        kont: Vec<Frame>,
    },
    /// Hand a value to the innermost frame.
    Returning {
        /// Computed value.
        value: Value,
        /// The store.
        store: Store,
        /// Continuation stack.
        kont: Vec<Frame>,
    },
    /// Unwind toward the nearest handler.
    Raising {
        /// Raised exception.
        exn: Exn,
        /// The store.
        store: Store,
        /// Continuation stack.
        kont: Vec<Frame>,
    },
    /// Suspended by `wait` until the given tick.
    Waiting {
        /// First tick at which the machine may continue.
        until: u64,
        /// The store.
        store: Store,
        /// Continuation stack.
        kont: Vec<Frame>,
    },
    /// Finished.
    Done {
        /// Final value, or the exception that escaped every handler.
        result: Result<Value, Exn>,
        /// The store.
        store: Store,
    },
}

impl MachineState {
    /// The store, in any state.
    #[must_use]
    pub const fn store(&self) -> &Store {
        match self {
            MachineState::Evaluating { store, .. }
            | MachineState::Returning { store, .. }
            | MachineState::Raising { store, .. }
            | MachineState::Waiting { store, .. }
            | MachineState::Done { store, .. } => store,
        }
    }

    /// The continuation stack; empty once done.
    #[must_use]
    pub fn kont(&self) -> &[Frame] {
        match self {
            MachineState::Evaluating { kont, .. }
            | MachineState::Returning { kont, .. }
            | MachineState::Raising { kont, .. }
            | MachineState::Waiting { kont, .. } => kont,
            MachineState::Done { .. } => &[],
        }
    }

    /// Check if the machine has finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, MachineState::Done { .. })
    }

    /// Check if an atomic block is in progress.
    #[must_use]
    pub fn in_atomic(&self) -> bool {
        self.kont().iter().any(|f| matches!(f, Frame::Atomic))
    }

    /// Store addresses the control and continuation refer to.
    fn roots(&self, out: &mut Vec<Addr>) {
        match self {
            MachineState::Evaluating { env, .. } => out.extend(env.values().copied()),
            MachineState::Returning { value, .. } | MachineState::Done { result: Ok(value), .. } => {
                value.addresses(out);
            }
            MachineState::Raising { .. } | MachineState::Waiting { .. } | MachineState::Done { .. } => {}
        }
        for frame in self.kont() {
            frame.addresses(out);
        }
    }

    const fn store_mut(&mut self) -> &mut Store {
        match self {
            MachineState::Evaluating { store, .. }
            | MachineState::Returning { store, .. }
            | MachineState::Raising { store, .. }
            | MachineState::Waiting { store, .. }
            | MachineState::Done { store, .. } => store,
        }
    }

    fn into_parts(self) -> (Store, Vec<Frame>) {
        match self {
            MachineState::Evaluating { store, kont, .. }
            | MachineState::Returning { store, kont, .. }
            | MachineState::Raising { store, kont, .. }
            | MachineState::Waiting { store, kont, .. } => (store, kont),
            MachineState::Done { store, .. } => (store, Vec::new()),
        }
    }
}

/// Read-only facts a transition may consult.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Robot running the machine.
    pub robot: RobotId,
    /// The world as it is right now.
    pub world: &'a dyn WorldView,
    /// Transitions this machine has taken so far, mixed into `random`.
    pub step: u64,
}

impl<'a> StepContext<'a> {
    /// Context for `robot`'s machine at transition `step`.
    #[must_use]
    pub fn new(robot: RobotId, world: &'a dyn WorldView, step: u64) -> Self {
        Self { robot, world, step }
    }
}

impl fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("robot", &self.robot)
            .field("tick", &self.world.tick())
            .field("step", &self.step)
            .finish()
    }
}

/// Result of one transition.
#[derive(Debug)]
pub struct Step {
    /// Next state.
    pub state: MachineState,
    /// World changes requested by this transition.
    pub effects: Vec<Effect>,
    /// A tangible command ran or `wait` suspended the machine: the robot's
    /// quantum for this tick is over.
    pub yielded: bool,
}

impl Step {
    pub(crate) const fn to(state: MachineState) -> Self {
        Self {
            state,
            effects: Vec::new(),
            yielded: false,
        }
    }
}

/// Start evaluating `term` with an empty continuation.
#[must_use]
pub const fn init_machine(term: Arc<Term>, env: Env, store: Store) -> MachineState {
    MachineState::Evaluating {
        term,
        env,
        store,
        kont: Vec::new(),
    }
}

/// Start evaluating `term` and execute the resulting command.
#[must_use]
pub fn init_program(term: Arc<Term>, env: Env, store: Store) -> MachineState {
    MachineState::Evaluating {
        term,
        env,
        store,
        kont: vec![Frame::Exec],
    }
}

/// The value a finished machine produced.
#[must_use]
pub const fn final_value(state: &MachineState) -> Option<&Value> {
    match state {
        MachineState::Done { result: Ok(v), .. } => Some(v),
        _ => None,
    }
}

/// What a single [`Machine::advance`] produced besides the new state.
#[derive(Debug, Default)]
pub struct Emitted {
    /// Requested world changes.
    pub effects: Vec<Effect>,
    /// The robot's quantum is over.
    pub yielded: bool,
}

/// A machine state together with its transition counter.
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    state: MachineState,
    steps: u64,
}

impl Machine {
    /// Wrap a state.
    #[must_use]
    pub const fn new(state: MachineState) -> Self {
        Self { state, steps: 0 }
    }

    /// A machine that will execute `term` as a command.
    #[must_use]
    pub fn program(term: Arc<Term>, env: Env, store: Store) -> Self {
        Self::new(init_program(term, env, store))
    }

    /// A finished machine holding an empty store.
    #[must_use]
    pub const fn idle() -> Self {
        Self::new(MachineState::Done {
            result: Ok(Value::Unit),
            store: Store::new(),
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &MachineState {
        &self.state
    }

    /// Transitions taken so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Check if the machine has finished.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Tick the machine is waiting for, if suspended by `wait`.
    #[must_use]
    pub const fn waiting_until(&self) -> Option<u64> {
        match self.state {
            MachineState::Waiting { until, .. } => Some(until),
            _ => None,
        }
    }

    /// The final result, once done.
    #[must_use]
    pub const fn outcome(&self) -> Option<&Result<Value, Exn>> {
        match &self.state {
            MachineState::Done { result, .. } => Some(result),
            _ => None,
        }
    }

    /// The final value and the number of transitions it took.
    #[must_use]
    pub const fn final_value(&self) -> Option<(&Value, u64)> {
        match final_value(&self.state) {
            Some(v) => Some((v, self.steps)),
            None => None,
        }
    }

    /// Take one transition on behalf of `robot`.
    pub fn advance(&mut self, robot: RobotId, world: &dyn WorldView) -> Emitted {
        let ctx = StepContext::new(robot, world, self.steps);
        let state = std::mem::replace(&mut self.state, Self::idle().state);
        let Step {
            state,
            effects,
            yielded,
        } = step(state, &ctx);
        self.state = state;
        self.steps += 1;
        Emitted { effects, yielded }
    }

    /// Raise `exn` at the current point, as if the running code had raised it.
    pub fn raise(&mut self, exn: Exn) {
        if self.is_done() {
            return;
        }
        let state = std::mem::replace(&mut self.state, Self::idle().state);
        let (store, kont) = state.into_parts();
        self.state = MachineState::Raising { exn, store, kont };
    }

    /// Leave the innermost atomic block by raising `exn` just outside it.
    ///
    /// Handlers inside the block do not see the exception.
    pub fn abort_atomic(&mut self, exn: Exn) {
        if self.is_done() {
            return;
        }
        let state = std::mem::replace(&mut self.state, Self::idle().state);
        let (store, kont) = state.into_parts();
        self.state = step::abort_atomic(exn, store, kont);
    }

    /// Drop store cells that neither the machine nor `defs` can reach.
    /// Returns how many were dropped.
    pub fn collect_garbage(&mut self, defs: &Env) -> usize {
        let mut roots: Vec<Addr> = defs.values().copied().collect();
        self.state.roots(&mut roots);
        self.state.store_mut().retain_reachable(roots)
    }

    /// Replace the control with a new program, keeping the store.
    ///
    /// Any pending continuation is discarded.
    pub fn load(&mut self, term: Arc<Term>, env: Env) {
        let state = std::mem::replace(&mut self.state, Self::idle().state);
        let (store, _) = state.into_parts();
        self.state = init_program(term, env, store);
    }

    /// Step until done or `max_steps` transitions, collecting effects without
    /// applying them. Waiting machines are resumed as soon as the world's
    /// tick allows, so a `wait` in a detached run stalls the machine.
    pub fn run_detached(&mut self, robot: RobotId, world: &dyn WorldView, max_steps: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        for _ in 0..max_steps {
            if self.is_done() {
                break;
            }
            if self.waiting_until().is_some_and(|until| until > world.tick()) {
                break;
            }
            effects.extend(self.advance(robot, world).effects);
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{Capability, Const, Direction, Pattern};
    use crate::world::{Coord, Grid, Robot, World};

    fn create_test_world() -> World {
        let mut world = World::new(Grid::new(5, 5).unwrap(), 11);
        let mut robot = Robot::new(1, "tester", Coord::new(2, 2));
        robot.system = true;
        world.add_robot(robot).unwrap();
        world
    }

    fn eval(term: Term) -> Result<Value, Exn> {
        let world = create_test_world();
        let mut machine = Machine::new(init_machine(Arc::new(term), Env::new(), Store::new()));
        machine.run_detached(1, &world, 10_000);
        machine.outcome().cloned().unwrap()
    }

    fn exec(term: Term) -> (Result<Value, Exn>, Vec<Effect>) {
        let world = create_test_world();
        let mut machine = Machine::program(Arc::new(term), Env::new(), Store::new());
        let effects = machine.run_detached(1, &world, 10_000);
        (machine.outcome().cloned().unwrap(), effects)
    }

    fn int(n: i64) -> Term {
        Term::Int(n)
    }

    #[test]
    fn test_literal_returns_immediately() {
        let mut machine = Machine::new(init_machine(Arc::new(int(5)), Env::new(), Store::new()));
        let world = create_test_world();
        machine.advance(1, &world);
        assert!(matches!(machine.state(), MachineState::Returning { value: Value::Int(5), .. }));
        machine.advance(1, &world);
        assert_eq!(machine.final_value(), Some((&Value::Int(5), 2)));
    }

    #[test]
    fn test_arithmetic() {
        let t = Term::call(Const::Add, [int(2), Term::call(Const::Mul, [int(3), int(4)])]);
        assert_eq!(eval(t), Ok(Value::Int(14)));
    }

    #[test]
    fn test_division_by_zero_raises() {
        let t = Term::call(Const::Div, [int(1), int(0)]);
        assert!(matches!(eval(t), Err(Exn::Arithmetic(_))));
    }

    #[test]
    fn test_closure_application() {
        let add_one = Term::lambda("x", Term::call(Const::Add, [Term::var("x"), int(1)]));
        assert_eq!(eval(Term::app(add_one, int(41))), Ok(Value::Int(42)));
    }

    #[test]
    fn test_partial_application_is_a_value() {
        let t = Term::call(Const::Add, [int(1)]);
        assert_eq!(
            eval(t),
            Ok(Value::Const {
                op: Const::Add,
                args: vec![Value::Int(1)]
            })
        );
    }

    #[test]
    fn test_recursive_let() {
        // let fact = \n. if n == 0 then 1 else n * fact (n - 1) in fact 5
        let body = Term::if_then_else(
            Term::call(Const::Eq, [Term::var("n"), int(0)]),
            int(1),
            Term::call(
                Const::Mul,
                [
                    Term::var("n"),
                    Term::app(Term::var("fact"), Term::call(Const::Sub, [Term::var("n"), int(1)])),
                ],
            ),
        );
        let t = Term::let_in("fact", Term::lambda("n", body), Term::app(Term::var("fact"), int(5)));
        assert_eq!(eval(t), Ok(Value::Int(120)));
    }

    #[test]
    fn test_let_black_hole() {
        let t = Term::let_in("x", Term::call(Const::Add, [Term::var("x"), int(1)]), Term::var("x"));
        assert_eq!(eval(t), Err(Exn::InfiniteLoop("x".into())));
    }

    #[test]
    fn test_case_first_match_wins() {
        let t = Term::case(
            Term::app(Term::Const(Const::Inr), int(3)),
            [
                (Pattern::Inl(Box::new(Pattern::Wildcard)), int(0)),
                (Pattern::Inr(Box::new(Pattern::Var("n".into()))), Term::var("n")),
                (Pattern::Wildcard, int(99)),
            ],
        );
        assert_eq!(eval(t), Ok(Value::Int(3)));
    }

    #[test]
    fn test_case_without_match_raises() {
        let t = Term::case(int(1), [(Pattern::Int(2), Term::Unit)]);
        assert!(matches!(eval(t), Err(Exn::NoMatch(_))));
    }

    #[test]
    fn test_bind_threads_result() {
        // x <- return 4; return (x + 1)
        let t = Term::bind(
            "x",
            Term::call(Const::Return, [int(4)]),
            Term::call(Const::Return, [Term::call(Const::Add, [Term::var("x"), int(1)])]),
        );
        assert_eq!(exec(t).0, Ok(Value::Int(5)));
    }

    #[test]
    fn test_def_is_visible_in_rest_of_block() {
        let t = Term::block([Term::def("five", int(5)), Term::call(Const::Return, [Term::var("five")])]);
        assert_eq!(exec(t).0, Ok(Value::Int(5)));
    }

    #[test]
    fn test_try_catches_fail() {
        let t = Term::try_catch(
            Term::call(Const::Fail, [Term::text("boom")]),
            Term::call(Const::Return, [int(7)]),
        );
        assert_eq!(exec(t).0, Ok(Value::Int(7)));
    }

    #[test]
    fn test_unhandled_fail() {
        let t = Term::call(Const::Fail, [Term::text("boom")]);
        assert_eq!(exec(t).0, Err(Exn::User("boom".into())));
    }

    #[test]
    fn test_log_and_move_effects() {
        let t = Term::block([Term::call(Const::Log, [Term::text("hi")]), Term::Const(Const::Move)]);
        let (result, effects) = exec(t);
        assert_eq!(result, Ok(Value::Unit));
        assert_eq!(
            effects,
            vec![
                Effect::Log {
                    robot: 1,
                    message: "hi".into()
                },
                Effect::Move {
                    robot: 1,
                    to: Coord::new(2, 1)
                },
            ]
        );
    }

    #[test]
    fn test_tangible_command_yields() {
        let world = create_test_world();
        let mut machine = Machine::program(
            Arc::new(Term::call(Const::Turn, [Term::Dir(Direction::East)])),
            Env::new(),
            Store::new(),
        );
        let mut yielded = false;
        while !machine.is_done() {
            yielded |= machine.advance(1, &world).yielded;
        }
        assert!(yielded);
    }

    #[test]
    fn test_missing_capability_is_raised_at_execution() {
        let mut world = create_test_world();
        world.robot_mut(1).unwrap().system = false;
        let mut machine = Machine::program(Arc::new(Term::Const(Const::Move)), Env::new(), Store::new());
        let effects = machine.run_detached(1, &world, 100);
        assert!(effects.is_empty());
        assert_eq!(
            machine.outcome(),
            Some(&Err(Exn::MissingCapability {
                capability: Capability::Move,
                command: Const::Move
            }))
        );
    }

    #[test]
    fn test_wait_suspends() {
        let world = create_test_world();
        let mut machine = Machine::program(Arc::new(Term::call(Const::Wait, [int(3)])), Env::new(), Store::new());
        machine.run_detached(1, &world, 100);
        assert_eq!(machine.waiting_until(), Some(3));
    }

    #[test]
    fn test_raise_unwinds_to_done() {
        let world = create_test_world();
        let mut machine = Machine::program(Arc::new(Term::call(Const::Wait, [int(3)])), Env::new(), Store::new());
        machine.run_detached(1, &world, 100);
        machine.raise(Exn::AtomicTooLong(5));
        machine.advance(1, &world);
        assert_eq!(machine.outcome(), Some(&Err(Exn::AtomicTooLong(5))));
    }

    #[test]
    fn test_abort_atomic_bypasses_inner_handler() {
        let world = create_test_world();
        let spin = Term::let_in(
            "spin",
            Term::lambda("u", Term::app(Term::var("spin"), Term::Unit)),
            Term::call(Const::Return, [Term::app(Term::var("spin"), Term::Unit)]),
        );
        let body = Term::atomic(Term::try_catch(spin, Term::Const(Const::Noop)));
        let mut machine = Machine::program(Arc::new(body), Env::new(), Store::new());
        machine.run_detached(1, &world, 200);
        assert!(machine.state().in_atomic());

        machine.abort_atomic(Exn::AtomicTooLong(200));
        assert!(!machine.state().in_atomic());
        machine.run_detached(1, &world, 10);
        assert_eq!(machine.outcome(), Some(&Err(Exn::AtomicTooLong(200))));
    }

    #[test]
    fn test_collect_garbage_keeps_live_cells() {
        let world = create_test_world();
        let count = Term::let_in(
            "count",
            Term::lambda(
                "n",
                Term::if_then_else(
                    Term::call(Const::Eq, [Term::var("n"), int(0)]),
                    int(7),
                    Term::app(Term::var("count"), Term::call(Const::Sub, [Term::var("n"), int(1)])),
                ),
            ),
            Term::app(Term::var("count"), int(500)),
        );
        let mut machine = Machine::new(init_machine(Arc::new(count), Env::new(), Store::new()));
        machine.run_detached(1, &world, 2_000);
        let before = machine.state().store().len();
        let dropped = machine.collect_garbage(&Env::new());
        assert!(dropped > 0);
        assert_eq!(machine.state().store().len(), before - dropped);

        machine.run_detached(1, &world, 100_000);
        assert_eq!(machine.outcome(), Some(&Ok(Value::Int(7))));
    }

    #[test]
    fn test_load_keeps_store() {
        let world = create_test_world();
        let mut machine = Machine::program(Arc::new(Term::def("x", int(1))), Env::new(), Store::new());
        machine.run_detached(1, &world, 100);
        let Some(Ok(Value::Bound(env))) = machine.outcome().cloned() else {
            panic!("definition did not produce bindings");
        };
        machine.load(Arc::new(Term::call(Const::Return, [Term::var("x")])), env);
        machine.run_detached(1, &world, 100);
        assert_eq!(machine.outcome(), Some(&Ok(Value::Int(1))));
    }
}
