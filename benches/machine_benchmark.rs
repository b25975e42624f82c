//! Benchmarks for the abstract machine.
//!
//! These measure raw step throughput on pure computation, where the
//! continuation stack and environment sharing dominate.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use swarm::lang::{Const, Term};
use swarm::machine::{Env, Store};
use swarm::requirements::{ReqCtx, requirements};
use swarm::world::Grid;
use swarm::{Coord, Machine, Robot, World};

fn create_world() -> World {
    let mut world = World::new(Grid::new(4, 4).unwrap(), 1);
    let mut robot = Robot::new(1, "bench", Coord::new(0, 0));
    robot.system = true;
    world.add_robot(robot).unwrap();
    world
}

/// `let fib = \n. if n < 2 then n else fib (n - 1) + fib (n - 2) in return (fib n)`
fn fib_program(n: i64) -> Term {
    let call = |k: i64| {
        Term::app(
            Term::var("fib"),
            Term::call(Const::Sub, [Term::var("n"), Term::Int(k)]),
        )
    };
    let fib = Term::lambda(
        "n",
        Term::if_then_else(
            Term::call(Const::Lt, [Term::var("n"), Term::Int(2)]),
            Term::var("n"),
            Term::call(Const::Add, [call(1), call(2)]),
        ),
    );
    Term::call(
        Const::Return,
        [Term::let_in("fib", fib, Term::app(Term::var("fib"), Term::Int(n)))],
    )
}

fn bench_fib(c: &mut Criterion) {
    let world = create_world();
    let program = Arc::new(fib_program(15));

    c.bench_function("machine_fib_15", |b| {
        b.iter(|| {
            let mut machine = Machine::program(Arc::clone(&program), Env::new(), Store::new());
            machine.run_detached(1, &world, u64::MAX);
            black_box(machine.final_value().map(|(_, steps)| steps))
        });
    });
}

fn bench_command_loop(c: &mut Criterion) {
    let world = create_world();
    let body = Term::seq(
        Term::call(Const::Log, [Term::text("tick")]),
        Term::app(Term::var("loop"), Term::Unit),
    );
    let program = Arc::new(Term::let_in(
        "loop",
        Term::lambda("u", body),
        Term::app(Term::var("loop"), Term::Unit),
    ));

    c.bench_function("machine_command_loop_10k_steps", |b| {
        b.iter(|| {
            let mut machine = Machine::program(Arc::clone(&program), Env::new(), Store::new());
            let effects = machine.run_detached(1, &world, black_box(10_000));
            black_box(effects.len())
        });
    });
}

fn bench_requirements(c: &mut Criterion) {
    let program = fib_program(20);

    c.bench_function("requirements_fib", |b| {
        b.iter(|| black_box(requirements(&ReqCtx::new(), black_box(&program))));
    });
}

criterion_group!(benches, bench_fib, bench_command_loop, bench_requirements);
criterion_main!(benches);
