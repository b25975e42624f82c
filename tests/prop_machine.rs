//! Property-based tests for the requirements analyzer and the scheduler.
//!
//! Run with: cargo test --release prop_machine

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use swarm::lang::{Const, Direction, Term};
use swarm::requirements::{requirements, ReqCtx};
use swarm::world::Grid;
use swarm::{Coord, Program, Robot, Scheduler, SchedulerConfig, World};

/// Small commands a generated program is assembled from.
fn arb_command() -> impl Strategy<Value = Term> {
    prop_oneof![
        Just(Term::Const(Const::Move)),
        Just(Term::Const(Const::Noop)),
        Just(Term::call(Const::Turn, [Term::Dir(Direction::Left)])),
        Just(Term::call(Const::Turn, [Term::Dir(Direction::Right)])),
        (0i64..3).prop_map(|n| Term::call(Const::Wait, [Term::Int(n)])),
        "[a-z]{1,6}".prop_map(|s| Term::call(Const::Log, [Term::text(s)])),
        "[a-z]{1,6}".prop_map(|s| Term::call(Const::Place, [Term::text(s)])),
        Just(Term::bind(
            "r",
            Term::call(Const::Random, [Term::Int(10)]),
            Term::call(Const::Return, [Term::var("r")]),
        )),
    ]
}

/// Programs built from commands with sequencing, handlers and definitions.
fn arb_program() -> impl Strategy<Value = Term> {
    arb_command().prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Term::block),
            (inner.clone(), inner.clone()).prop_map(|(body, handler)| Term::try_catch(body, handler)),
            (inner.clone(), inner.clone()).prop_map(|(value, rest)| {
                Term::seq(Term::def("d", Term::delay(value)), rest)
            }),
            inner.prop_map(|body| Term::app(Term::lambda("x", body), Term::Unit)),
        ]
    })
}

fn run_session(seed: u64, fuel: u64, programs: &[Term], ticks: u64) -> (World, Vec<String>) {
    let mut world = World::new(Grid::new(8, 8).unwrap(), seed);
    let mut scheduler = Scheduler::new(SchedulerConfig {
        fuel_per_tick: fuel,
        ..SchedulerConfig::default()
    });
    for (id, term) in (1..).zip(programs) {
        let mut robot = Robot::new(id, "bot", Coord::new(u16::try_from(id).unwrap(), 4));
        robot.system = true;
        robot.add_item("rock", 2);
        scheduler
            .spawn(&mut world, robot, Some(&Program::new(term.clone())))
            .unwrap();
    }
    scheduler.run_ticks(&mut world, ticks);
    let logs = scheduler
        .contexts()
        .flat_map(|ctx| {
            ctx.log()
                .iter()
                .map(move |entry| format!("{}:{}:{}", ctx.id(), entry.tick, entry.text))
        })
        .collect();
    (world, logs)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Analyzing a program twice gives the same answer.
    #[test]
    fn prop_requirements_deterministic(term in arb_program()) {
        let ctx = ReqCtx::new();
        prop_assert_eq!(requirements(&ctx, &term), requirements(&ctx, &term));
    }

    /// Merging requirements with themselves changes nothing.
    #[test]
    fn prop_requirements_merge_idempotent(term in arb_program()) {
        let reqs = requirements(&ReqCtx::new(), &term);
        prop_assert_eq!(reqs.clone().union(&reqs), reqs);
    }

    /// Wrapping a program in a handler only adds the try capability.
    #[test]
    fn prop_requirements_monotone_under_try(term in arb_program()) {
        let plain = requirements(&ReqCtx::new(), &term);
        let wrapped = requirements(&ReqCtx::new(), &Term::try_catch(term, Term::Const(Const::Noop)));
        prop_assert!(plain.capabilities.is_subset(&wrapped.capabilities));
        prop_assert_eq!(plain.inventory, wrapped.inventory);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Same world, seed and programs: same final world and logs.
    #[test]
    fn prop_scheduler_deterministic(
        seed in any::<u64>(),
        fuel in 1u64..64,
        programs in prop::collection::vec(arb_program(), 1..4),
    ) {
        let first = run_session(seed, fuel, &programs, 12);
        let second = run_session(seed, fuel, &programs, 12);
        prop_assert_eq!(first, second);
    }

    /// No robot ever takes more steps in a tick than its fuel allows.
    #[test]
    fn prop_fuel_bound(
        fuel in 1u64..32,
        programs in prop::collection::vec(arb_program(), 1..4),
    ) {
        let mut world = World::new(Grid::new(8, 8).unwrap(), 1);
        let mut scheduler = Scheduler::new(SchedulerConfig {
            fuel_per_tick: fuel,
            ..SchedulerConfig::default()
        });
        for (id, term) in (1..).zip(&programs) {
            let mut robot = Robot::new(id, "bot", Coord::new(u16::try_from(id).unwrap(), 1));
            robot.system = true;
            scheduler.spawn(&mut world, robot, Some(&Program::new(term.clone()))).unwrap();
        }
        for report in scheduler.run_ticks(&mut world, 8) {
            prop_assert!(report.steps.values().all(|&steps| steps <= fuel));
        }
    }
}
