#![no_main]

//! Scheduler fuzzer.
//!
//! Builds well-typed programs from fuzzer input, runs them on a handful of
//! robots for a few ticks and checks that:
//! 1. Nothing panics (a fatal machine error panics in debug builds)
//! 2. A second run from the same input ends in the same world

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use swarm::lang::{Capability, Const, Direction, Term};
use swarm::world::{EntityInfo, Grid};
use swarm::{Coord, Program, Robot, Scheduler, SchedulerConfig, World};

/// A fuzzer-generated command tree.
#[derive(Arbitrary, Debug, Clone)]
enum FuzzCommand {
    Move,
    Turn(u8),
    Grab,
    Place(bool),
    Wait(u8),
    Log(u8),
    Random(u8),
    Build(Box<FuzzCommand>),
    Salvage,
    SelfDestruct,
    Block(Vec<FuzzCommand>),
    Try(Box<FuzzCommand>, Box<FuzzCommand>),
    Atomic(Box<FuzzCommand>),
    Repeat(u8, Box<FuzzCommand>),
}

/// Structured input for scheduler fuzzing.
#[derive(Arbitrary, Debug)]
struct SchedulerInput {
    /// Program for each robot.
    programs: Vec<FuzzCommand>,
    /// Which robots are system robots.
    system: Vec<bool>,
    /// World seed.
    seed: u64,
    /// Fuel per tick.
    fuel: u8,
    /// Number of ticks to simulate.
    num_ticks: u8,
}

const DIRECTIONS: [Direction; 4] = [Direction::Left, Direction::Right, Direction::Back, Direction::North];

fn to_term(cmd: &FuzzCommand, depth: u8) -> Term {
    if depth > 6 {
        return Term::Const(Const::Noop);
    }
    let next = depth + 1;
    match cmd {
        FuzzCommand::Move => Term::Const(Const::Move),
        FuzzCommand::Turn(d) => Term::call(Const::Turn, [Term::Dir(DIRECTIONS[usize::from(*d % 4)])]),
        FuzzCommand::Grab => Term::Const(Const::Grab),
        FuzzCommand::Place(rock) => {
            let item = if *rock { "rock" } else { "treads" };
            Term::call(Const::Place, [Term::text(item)])
        }
        FuzzCommand::Wait(n) => Term::call(Const::Wait, [Term::Int(i64::from(*n % 4))]),
        FuzzCommand::Log(n) => Term::call(Const::Log, [Term::text(format!("m{n}"))]),
        FuzzCommand::Random(n) => Term::call(Const::Random, [Term::Int(i64::from(*n) + 1)]),
        FuzzCommand::Build(body) => Term::call(Const::Build, [Term::delay(to_term(body, next))]),
        FuzzCommand::Salvage => Term::Const(Const::Salvage),
        FuzzCommand::SelfDestruct => Term::Const(Const::Selfdestruct),
        FuzzCommand::Block(cmds) => Term::block(cmds.iter().take(8).map(|c| to_term(c, next))),
        FuzzCommand::Try(body, handler) => Term::try_catch(to_term(body, next), to_term(handler, next)),
        FuzzCommand::Atomic(body) => Term::atomic(to_term(body, next)),
        FuzzCommand::Repeat(n, body) => {
            // let rep = \k. if k <= 0 then noop else (body; rep (k - 1)) in rep n
            let again = Term::app(
                Term::var("rep"),
                Term::call(Const::Sub, [Term::var("k"), Term::Int(1)]),
            );
            let rep = Term::lambda(
                "k",
                Term::if_then_else(
                    Term::call(Const::Leq, [Term::var("k"), Term::Int(0)]),
                    Term::Const(Const::Noop),
                    Term::seq(to_term(body, next), again),
                ),
            );
            Term::let_in(
                "rep",
                rep,
                Term::app(Term::var("rep"), Term::Int(i64::from(*n % 16))),
            )
        }
    }
}

fn run(input: &SchedulerInput, programs: &[Program], ticks: u64) -> World {
    let mut world = World::new(Grid::new(12, 12).unwrap(), input.seed);
    world.add_entity(EntityInfo::device("treads", [Capability::Move, Capability::Turn]));
    world.add_entity(EntityInfo::device("claw", [Capability::Grab, Capability::Place]));
    world.add_entity(EntityInfo::item("rock"));
    let fuel = u64::from(input.fuel.max(1));
    let mut scheduler = Scheduler::new(SchedulerConfig {
        fuel_per_tick: fuel,
        max_atomic_steps: 500,
        ..SchedulerConfig::default()
    });

    for (i, program) in programs.iter().enumerate() {
        let id = i as u64 + 1;
        let mut robot = Robot::new(id, format!("bot{id}"), Coord::new(i as u16 * 2, 6));
        robot.system = input.system.get(i).copied().unwrap_or(false);
        robot.equipped.insert("treads".into());
        robot.add_item("rock", 3);
        robot.add_item("treads", 1);
        let _ = scheduler.spawn(&mut world, robot, Some(program));
    }

    scheduler.run_ticks(&mut world, ticks);
    world
}

fuzz_target!(|input: SchedulerInput| {
    // Cap values to avoid excessive runtime
    let ticks = u64::from(input.num_ticks % 20);
    let programs: Vec<Program> = input
        .programs
        .iter()
        .take(5)
        .map(|cmd| Program::new(to_term(cmd, 0)))
        .collect();

    let first = run(&input, &programs, ticks);
    let second = run(&input, &programs, ticks);
    assert_eq!(first, second, "same input produced different worlds");
});
