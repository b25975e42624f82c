//! Benchmarks for the tick scheduler.
//!
//! This benchmarks the full tick loop with many robots sharing one world.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use swarm::lang::{Const, Direction, Term};
use swarm::world::Grid;
use swarm::{Coord, Program, Robot, Scheduler, SchedulerConfig, World};

/// Wander forever: roll a number, then try to move or turn right.
fn wander() -> Program {
    let step = Term::block([
        Term::bind(
            "n",
            Term::call(Const::Random, [Term::Int(4)]),
            Term::call(Const::Return, [Term::var("n")]),
        ),
        Term::try_catch(
            Term::Const(Const::Move),
            Term::call(Const::Turn, [Term::Dir(Direction::Right)]),
        ),
    ]);
    Program::new(Term::let_in(
        "loop",
        Term::lambda("u", Term::seq(step, Term::app(Term::var("loop"), Term::Unit))),
        Term::app(Term::var("loop"), Term::Unit),
    ))
}

fn populate(robots: u16, config: SchedulerConfig) -> (World, Scheduler) {
    let mut world = World::new(Grid::new(64, 64).unwrap(), 7);
    let mut scheduler = Scheduler::new(config);
    let program = wander();
    for i in 0..robots {
        let mut robot = Robot::new(u64::from(i) + 1, "wanderer", Coord::new(i % 64, i / 64 * 2));
        robot.system = true;
        scheduler.spawn(&mut world, robot, Some(&program)).unwrap();
    }
    (world, scheduler)
}

fn bench_ticks(c: &mut Criterion) {
    let (world, scheduler) = populate(100, SchedulerConfig::default());

    c.bench_function("scheduler_100_robots_10_ticks", |b| {
        b.iter(|| {
            let mut world = world.clone();
            let mut scheduler = scheduler.clone();
            let reports = scheduler.run_ticks(&mut world, black_box(10));
            black_box(reports.len())
        });
    });
}

fn bench_low_fuel(c: &mut Criterion) {
    // Low fuel forces robots to suspend mid-computation every tick
    let config = SchedulerConfig {
        fuel_per_tick: 8,
        ..SchedulerConfig::default()
    };
    let (world, scheduler) = populate(100, config);

    c.bench_function("scheduler_100_robots_low_fuel", |b| {
        b.iter(|| {
            let mut world = world.clone();
            let mut scheduler = scheduler.clone();
            let reports = scheduler.run_ticks(&mut world, black_box(10));
            black_box(reports.len())
        });
    });
}

criterion_group!(benches, bench_ticks, bench_low_fuel);
criterion_main!(benches);
