//! Built-in functions and commands.
//!
//! Functions are applied as soon as they are saturated. Commands are only
//! run when a saturated command value reaches an `Exec` frame; they read
//! the world, propose at most one effect and return a value.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::Exn;
use crate::gate;
use crate::lang::{Capability, Const, Term};
use crate::machine::step::{fatal, force_value, raising, returning};
use crate::machine::{Env, Frame, MachineState, Slot, Step, StepContext, Store, Value};
use crate::requirements::{requirements, ReqCtx, Requirements};
use crate::world::{mix, Coord, Effect, Robot, Spawn, WorldView};

/// Execute a value under an `Exec` frame.
pub(crate) fn exec(value: Value, mut store: Store, mut kont: Vec<Frame>, ctx: &StepContext<'_>) -> Step {
    match value {
        Value::Const { op, args } if op.is_command() && args.len() == op.info().arity => {
            run_command(op, args, store, kont, ctx)
        }
        Value::Bind {
            var,
            cmd,
            rest,
            env,
        } => {
            kont.push(match var {
                Some(var) => Frame::Bind {
                    var,
                    rest,
                    env: env.clone(),
                },
                None => Frame::Seq {
                    rest,
                    env: env.clone(),
                },
            });
            kont.push(Frame::Exec);
            Step::to(MachineState::Evaluating {
                term: cmd,
                env,
                store,
                kont,
            })
        }
        Value::Define { name, body, env } => {
            let addr = store.alloc(Slot::Forcing);
            let env = env.update(name.clone(), addr);
            store.set(addr, Slot::Delayed { term: body, env });
            Step::to(returning(Value::Bound(Env::unit(name, addr)), store, kont))
        }
        other => Step::to(returning(other, store, kont)),
    }
}

/// Apply a saturated function.
pub(crate) fn call_function(op: Const, args: Vec<Value>, store: Store, kont: Vec<Frame>) -> MachineState {
    if op == Const::Force {
        return match args.into_iter().next() {
            Some(v) => force_value(v, store, kont),
            None => fatal("force without argument".to_string(), store, kont),
        };
    }
    match function(op, args) {
        Ok(v) => returning(v, store, kont),
        Err(Exn::Fatal(message)) => fatal(message, store, kont),
        Err(exn) => raising(exn, store, kont),
    }
}

fn ill_typed(op: Const, args: &[Value]) -> Exn {
    let shown: Vec<String> = args.iter().map(ToString::to_string).collect();
    Exn::Fatal(format!("ill-typed arguments to '{op}': {}", shown.join(", ")))
}

fn arith(result: Option<i64>) -> Result<Value, Exn> {
    result.map(Value::Int).ok_or(Exn::Arithmetic("integer overflow"))
}

fn function(op: Const, args: Vec<Value>) -> Result<Value, Exn> {
    use Value::{Bool, Int, Text};
    match (op, args.as_slice()) {
        (Const::Inl, [v]) => Ok(Value::Inl(Box::new(v.clone()))),
        (Const::Inr, [v]) => Ok(Value::Inr(Box::new(v.clone()))),
        (Const::Fst, [Value::Pair(a, _)]) => Ok((**a).clone()),
        (Const::Snd, [Value::Pair(_, b)]) => Ok((**b).clone()),
        (Const::Not, [Bool(b)]) => Ok(Bool(!b)),
        (Const::And, [Bool(a), Bool(b)]) => Ok(Bool(*a && *b)),
        (Const::Or, [Bool(a), Bool(b)]) => Ok(Bool(*a || *b)),
        (Const::Neg, [Int(n)]) => arith(n.checked_neg()),
        (Const::Add, [Int(a), Int(b)]) => arith(a.checked_add(*b)),
        (Const::Sub, [Int(a), Int(b)]) => arith(a.checked_sub(*b)),
        (Const::Mul, [Int(a), Int(b)]) => arith(a.checked_mul(*b)),
        (Const::Div, [Int(_), Int(0)]) => Err(Exn::Arithmetic("division by zero")),
        (Const::Div, [Int(a), Int(b)]) => arith(a.checked_div(*b)),
        (Const::Exp, [Int(a), Int(b)]) => {
            let exp = u32::try_from(*b).map_err(|_| Exn::Arithmetic("negative or huge exponent"))?;
            arith(a.checked_pow(exp))
        }
        (Const::Eq, [a, b]) => Ok(Bool(a == b)),
        (Const::Neq, [a, b]) => Ok(Bool(a != b)),
        (Const::Lt | Const::Gt | Const::Leq | Const::Geq, [a, b]) => {
            let ordering = match (a, b) {
                (Int(x), Int(y)) => x.cmp(y),
                (Text(x), Text(y)) => x.cmp(y),
                (Bool(x), Bool(y)) => x.cmp(y),
                _ => return Err(ill_typed(op, &args)),
            };
            Ok(Bool(match op {
                Const::Lt => ordering.is_lt(),
                Const::Gt => ordering.is_gt(),
                Const::Leq => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        (Const::Format, [Text(s)]) => Ok(Text(s.clone())),
        (Const::Format, [v]) => Ok(Text(v.to_string())),
        (Const::Concat, [Text(a), Text(b)]) => Ok(Text(format!("{a}{b}"))),
        (Const::Chars, [Text(s)]) => Ok(Int(i64::try_from(s.chars().count()).unwrap_or(i64::MAX))),
        _ => Err(ill_typed(op, &args)),
    }
}

fn run_command(op: Const, args: Vec<Value>, store: Store, mut kont: Vec<Frame>, ctx: &StepContext<'_>) -> Step {
    if let Err(exn) = gate::check_command(ctx.world, ctx.robot, op) {
        return Step::to(raising(exn, store, kont));
    }
    let Some(me) = ctx.world.robot(ctx.robot) else {
        return Step::to(raising(Exn::NoRobot, store, kont));
    };

    match (op, args.as_slice()) {
        (Const::Wait, [Value::Int(n)]) => {
            if kont.iter().any(|f| matches!(f, Frame::Atomic)) {
                return Step::to(raising(Exn::WaitInAtomic, store, kont));
            }
            let until = ctx.world.tick().saturating_add((*n).max(0).unsigned_abs());
            Step {
                state: MachineState::Waiting { until, store, kont },
                effects: Vec::new(),
                yielded: true,
            }
        }
        (Const::Selfdestruct, []) => Step {
            state: MachineState::Done {
                result: Ok(Value::Unit),
                store: Store::new(),
            },
            effects: vec![Effect::SelfDestruct { robot: ctx.robot }],
            yielded: true,
        },
        (Const::Try, [body, handler]) => {
            let body = body.clone();
            kont.push(Frame::Try {
                handler: handler.clone(),
            });
            kont.push(Frame::Exec);
            Step::to(force_value(body, store, kont))
        }
        (Const::Atomic, [body]) => {
            let body = body.clone();
            kont.push(Frame::Atomic);
            kont.push(Frame::Exec);
            Step::to(force_value(body, store, kont))
        }
        (Const::Build, [program]) => build(program, me, store, kont, ctx),
        _ => match command(op, &args, me, ctx) {
            Ok((value, effect)) => Step {
                state: returning(value, store, kont),
                yielded: op.info().tangible,
                effects: effect.into_iter().collect(),
            },
            Err(Exn::Fatal(message)) => Step::to(fatal(message, store, kont)),
            Err(exn) => Step::to(raising(exn, store, kont)),
        },
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn coord_value(at: Coord) -> Value {
    Value::Pair(
        Box::new(Value::Int(i64::from(at.x))),
        Box::new(Value::Int(i64::from(at.y))),
    )
}

fn ahead(me: &Robot, world: &dyn WorldView) -> Option<Coord> {
    world.grid().step(me.location, me.heading)
}

fn require_item(me: &Robot, item: &str) -> Result<(), Exn> {
    if me.count(item) == 0 {
        return Err(Exn::Insufficient {
            item: item.to_string(),
            needed: 1,
            have: 0,
        });
    }
    Ok(())
}

/// Commands that return a value and propose at most one effect.
fn command(op: Const, args: &[Value], me: &Robot, ctx: &StepContext<'_>) -> Result<(Value, Option<Effect>), Exn> {
    let world = ctx.world;
    let robot = ctx.robot;
    let here = world.grid().get(me.location).and_then(|c| c.entity.as_deref());
    let done = |effect: Effect| Ok((Value::Unit, Some(effect)));

    match (op, args) {
        (Const::Noop, []) => Ok((Value::Unit, None)),
        (Const::Return, [v]) => Ok((v.clone(), None)),
        (Const::Fail, [Value::Text(message)]) => Err(Exn::User(message.clone())),
        (Const::Move, []) => {
            let to = ahead(me, world).ok_or(Exn::Blocked)?;
            if world.is_blocked(to) {
                return Err(Exn::Blocked);
            }
            done(Effect::Move { robot, to })
        }
        (Const::Turn, [Value::Dir(d)]) => done(Effect::Turn {
            robot,
            heading: d.resolve(me.heading),
        }),
        (Const::Grab, []) => {
            let entity = here.ok_or(Exn::NothingHere)?.to_string();
            Ok((
                text(&entity),
                Some(Effect::Grab {
                    robot,
                    at: me.location,
                    entity,
                }),
            ))
        }
        (Const::Place, [Value::Text(item)]) => {
            require_item(me, item)?;
            if here.is_some() {
                return Err(Exn::CellOccupied);
            }
            done(Effect::Place {
                robot,
                at: me.location,
                entity: item.clone(),
            })
        }
        (Const::Give, [Value::Robot(to), Value::Text(item)]) => {
            let target = world.robot(*to).ok_or(Exn::NoRobot)?;
            if !me.location.within_reach(target.location) {
                return Err(Exn::TooFar(*to));
            }
            require_item(me, item)?;
            done(Effect::Give {
                from: robot,
                to: *to,
                item: item.clone(),
            })
        }
        (Const::Equip, [Value::Text(device)]) => {
            let info = world
                .entity(device)
                .ok_or_else(|| Exn::UnknownEntity(device.clone()))?;
            if !info.is_device() {
                return Err(Exn::NotADevice(device.clone()));
            }
            if me.has_equipped(device) {
                return Ok((Value::Unit, None));
            }
            require_item(me, device)?;
            done(Effect::Equip {
                robot,
                device: device.clone(),
            })
        }
        (Const::Unequip, [Value::Text(device)]) => {
            if !me.has_equipped(device) {
                return Err(Exn::NotEquipped(device.clone()));
            }
            done(Effect::Unequip {
                robot,
                device: device.clone(),
            })
        }
        (Const::Make, [Value::Text(item)]) => {
            let recipe = world
                .recipes()
                .iter()
                .find(|r| r.produces(item))
                .ok_or_else(|| Exn::NoRecipe(item.clone()))?;
            if let Some((input, needed)) = recipe.inputs.iter().find(|(i, n)| me.count(i) < **n) {
                return Err(Exn::Insufficient {
                    item: input.clone(),
                    needed: *needed,
                    have: me.count(input),
                });
            }
            done(Effect::Craft {
                robot,
                recipe: recipe.clone(),
            })
        }
        (Const::Has, [Value::Text(item)]) => Ok((Value::Bool(me.count(item) > 0), None)),
        (Const::Count, [Value::Text(item)]) => Ok((Value::Int(i64::from(me.count(item))), None)),
        (Const::Salvage, []) => {
            let target = ahead(me, world)
                .and_then(|at| world.robot_at(at))
                .ok_or(Exn::NoRobot)?;
            if world.robot(target).is_some_and(|r| r.system) {
                return Err(Exn::CannotSalvage(target));
            }
            done(Effect::Salvage { robot, target })
        }
        (Const::Say, [Value::Text(message)]) => done(Effect::Say {
            robot,
            message: message.clone(),
        }),
        (Const::Log, [Value::Text(message)]) => done(Effect::Log {
            robot,
            message: message.clone(),
        }),
        (Const::Scan, [Value::Dir(d)]) => {
            let seen = world
                .grid()
                .step(me.location, d.resolve(me.heading))
                .and_then(|at| world.grid().get(at))
                .and_then(|cell| cell.entity.as_deref());
            let value = match seen {
                Some(entity) => Value::Inr(Box::new(text(entity))),
                None => Value::Inl(Box::new(Value::Unit)),
            };
            Ok((value, None))
        }
        (Const::Blocked, []) => {
            let blocked = ahead(me, world).is_none_or(|at| world.is_blocked(at));
            Ok((Value::Bool(blocked), None))
        }
        (Const::Ishere, [Value::Text(item)]) => Ok((Value::Bool(here == Some(item.as_str())), None)),
        (Const::Whereami, []) => Ok((coord_value(me.location), None)),
        (Const::Heading, []) => Ok((Value::Dir(me.heading), None)),
        (Const::Time, []) => Ok((
            Value::Int(i64::try_from(world.tick()).unwrap_or(i64::MAX)),
            None,
        )),
        (Const::Random, [Value::Int(bound)]) => {
            if *bound <= 0 {
                return Err(Exn::Arithmetic("random bound must be positive"));
            }
            let draw = mix(mix(mix(world.seed(), world.tick()), robot), ctx.step);
            let n = draw % bound.unsigned_abs();
            Ok((Value::Int(i64::try_from(n).unwrap_or(0)), None))
        }
        (Const::Whoami, []) => Ok((text(&me.name), None)),
        (Const::SelfRef, []) => Ok((Value::Robot(robot), None)),
        (Const::Parent, []) => Ok((Value::Robot(me.parent.unwrap_or(robot)), None)),
        _ => Err(ill_typed(op, args)),
    }
}

/// `build {p}`: reserve an id, pick devices covering what `p` needs and hand
/// the child a transplanted copy of every cell `p` can reach.
fn build(program: &Value, me: &Robot, store: Store, kont: Vec<Frame>, ctx: &StepContext<'_>) -> Step {
    let (body, env) = match program {
        Value::Delay { body, env } => (Arc::clone(body), env.clone()),
        Value::Ref(addr) => match store.get(*addr) {
            Some(Slot::Delayed { term, env }) => (Arc::clone(term), env.clone()),
            _ => return Step::to(fatal(format!("build of forced delay at {addr}"), store, kont)),
        },
        other => return Step::to(fatal(format!("build of non-delay {other}"), store, kont)),
    };

    let needed = program_requirements(&body, &env, &store);
    let devices = if me.system {
        Vec::new()
    } else {
        match choose_devices(me, &needed.capabilities, ctx.world) {
            Ok(devices) => devices,
            Err(exn) => return Step::to(raising(exn, store, kont)),
        }
    };

    let child = ctx.world.next_robot_id();
    let (env, child_store) = store.transplant(&env);
    let spawn = Spawn {
        child,
        name: format!("{}-{child}", me.name),
        devices,
        program: body,
        env,
        store: child_store,
        system: me.system,
    };
    Step {
        state: returning(Value::Robot(child), store, kont),
        effects: vec![Effect::Build {
            builder: ctx.robot,
            spawn: Box::new(spawn),
        }],
        yielded: true,
    }
}

/// Requirements of a closed program, following references into the store.
fn program_requirements(body: &Arc<Term>, env: &Env, store: &Store) -> Requirements {
    let ctx = ReqCtx::new();
    let mut reqs = requirements(&ctx, body);
    let mut seen = BTreeSet::new();
    let mut pending = vec![(Arc::clone(body), env.clone())];
    while let Some((term, env)) = pending.pop() {
        for (name, addr) in &env {
            if !term.occurs_free(name) || !seen.insert(*addr) {
                continue;
            }
            let next = match store.get(*addr) {
                Some(Slot::Delayed { term, env }) => Some((Arc::clone(term), env.clone())),
                Some(Slot::Value(Value::Delay { body, env })) => Some((Arc::clone(body), env.clone())),
                Some(Slot::Value(Value::Closure { body, env, .. })) => {
                    reqs.capabilities.insert(Capability::Lambda);
                    Some((Arc::clone(body), env.clone()))
                }
                _ => None,
            };
            if let Some((term, env)) = next {
                reqs.merge(&requirements(&ctx, &term));
                pending.push((term, env));
            }
        }
    }
    reqs
}

/// Pick one carried device per uncovered capability, in inventory order.
fn choose_devices(
    me: &Robot,
    needed: &BTreeSet<Capability>,
    world: &dyn WorldView,
) -> Result<Vec<String>, Exn> {
    let mut chosen: Vec<String> = Vec::new();
    let mut covered = BTreeSet::new();
    let mut missing = Vec::new();
    for cap in needed {
        if covered.contains(cap) {
            continue;
        }
        let found = me
            .inventory
            .keys()
            .filter(|name| !chosen.contains(*name))
            .find_map(|name| {
                world
                    .entity(name)
                    .filter(|info| info.capabilities.contains(cap))
                    .map(|info| (name, info))
            });
        match found {
            Some((name, info)) => {
                covered.extend(info.capabilities.iter().copied());
                chosen.push(name.clone());
            }
            None => missing.push(*cap),
        }
    }
    if missing.is_empty() {
        Ok(chosen)
    } else {
        Err(Exn::MissingDevices(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Cell, EntityInfo, Grid, Recipe, World};

    fn create_test_world() -> World {
        let mut world = World::new(Grid::new(5, 5).unwrap(), 3);
        world.add_entity(EntityInfo::device("treads", [Capability::Move, Capability::Turn]));
        world.add_entity(EntityInfo::device("logger", [Capability::Log]));
        world.add_entity(EntityInfo::item("rock"));
        world.add_recipe(Recipe {
            inputs: [("rock".to_string(), 2)].into_iter().collect(),
            outputs: [("gravel".to_string(), 1)].into_iter().collect(),
        });
        let mut robot = Robot::new(1, "base", Coord::new(2, 2));
        robot.system = true;
        world.add_robot(robot).unwrap();
        world
    }

    fn run(world: &World, op: Const, args: Vec<Value>) -> Result<(Value, Option<Effect>), Exn> {
        let ctx = StepContext::new(1, world, 0);
        let me = world.robot(1).unwrap();
        command(op, &args, me, &ctx)
    }

    #[test]
    fn test_functions() {
        assert_eq!(function(Const::Sub, vec![Value::Int(5), Value::Int(7)]), Ok(Value::Int(-2)));
        assert_eq!(
            function(Const::Exp, vec![Value::Int(2), Value::Int(10)]),
            Ok(Value::Int(1024))
        );
        assert_eq!(
            function(Const::Lt, vec![Value::Text("a".into()), Value::Text("b".into())]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            function(Const::Concat, vec![Value::Text("ab".into()), Value::Text("cd".into())]),
            Ok(Value::Text("abcd".into()))
        );
        assert_eq!(
            function(Const::Format, vec![Value::Int(3)]),
            Ok(Value::Text("3".into()))
        );
        assert_eq!(
            function(Const::Add, vec![Value::Int(i64::MAX), Value::Int(1)]),
            Err(Exn::Arithmetic("integer overflow"))
        );
        assert!(matches!(
            function(Const::Add, vec![Value::Bool(true), Value::Int(1)]),
            Err(Exn::Fatal(_))
        ));
    }

    #[test]
    fn test_grab_needs_an_entity() {
        let mut world = create_test_world();
        assert_eq!(run(&world, Const::Grab, vec![]), Err(Exn::NothingHere));

        world.grid.set(Coord::new(2, 2), Cell::with_entity("rock"));
        let (value, effect) = run(&world, Const::Grab, vec![]).unwrap();
        assert_eq!(value, Value::Text("rock".into()));
        assert!(matches!(effect, Some(Effect::Grab { .. })));
    }

    #[test]
    fn test_make_checks_inputs() {
        let mut world = create_test_world();
        world.robot_mut(1).unwrap().add_item("rock", 1);
        assert_eq!(
            run(&world, Const::Make, vec![Value::Text("gravel".into())]),
            Err(Exn::Insufficient {
                item: "rock".into(),
                needed: 2,
                have: 1
            })
        );
        assert_eq!(
            run(&world, Const::Make, vec![Value::Text("gold".into())]),
            Err(Exn::NoRecipe("gold".into()))
        );

        world.robot_mut(1).unwrap().add_item("rock", 1);
        assert!(matches!(
            run(&world, Const::Make, vec![Value::Text("gravel".into())]),
            Ok((Value::Unit, Some(Effect::Craft { .. })))
        ));
    }

    #[test]
    fn test_equip_rejects_non_devices() {
        let world = create_test_world();
        assert_eq!(
            run(&world, Const::Equip, vec![Value::Text("rock".into())]),
            Err(Exn::NotADevice("rock".into()))
        );
        assert_eq!(
            run(&world, Const::Equip, vec![Value::Text("laser".into())]),
            Err(Exn::UnknownEntity("laser".into()))
        );
        assert_eq!(
            run(&world, Const::Unequip, vec![Value::Text("treads".into())]),
            Err(Exn::NotEquipped("treads".into()))
        );
    }

    #[test]
    fn test_scan_and_sensing() {
        let mut world = create_test_world();
        world.grid.set(Coord::new(3, 2), Cell::with_entity("rock"));
        assert_eq!(
            run(&world, Const::Scan, vec![Value::Dir(crate::lang::Direction::East)]),
            Ok((Value::Inr(Box::new(Value::Text("rock".into()))), None))
        );
        assert_eq!(
            run(&world, Const::Scan, vec![Value::Dir(crate::lang::Direction::West)]),
            Ok((Value::Inl(Box::new(Value::Unit)), None))
        );
        assert_eq!(
            run(&world, Const::Whereami, vec![]),
            Ok((coord_value(Coord::new(2, 2)), None))
        );
        assert_eq!(run(&world, Const::Blocked, vec![]), Ok((Value::Bool(false), None)));
    }

    #[test]
    fn test_random_is_bounded_and_deterministic() {
        let world = create_test_world();
        let a = run(&world, Const::Random, vec![Value::Int(6)]).unwrap();
        let b = run(&world, Const::Random, vec![Value::Int(6)]).unwrap();
        assert_eq!(a, b);
        let Value::Int(n) = a.0 else {
            panic!("random returned {}", a.0);
        };
        assert!((0..6).contains(&n));
        assert!(matches!(
            run(&world, Const::Random, vec![Value::Int(0)]),
            Err(Exn::Arithmetic(_))
        ));
    }

    #[test]
    fn test_choose_devices() {
        let mut world = create_test_world();
        let me = world.robot_mut(1).unwrap();
        me.add_item("treads", 1);
        me.add_item("logger", 1);
        let me = world.robot(1).unwrap().clone();

        let needed: BTreeSet<Capability> = [Capability::Move, Capability::Turn, Capability::Log]
            .into_iter()
            .collect();
        assert_eq!(
            choose_devices(&me, &needed, &world),
            Ok(vec!["treads".to_string(), "logger".to_string()])
        );

        let needed: BTreeSet<Capability> = [Capability::Grab].into_iter().collect();
        assert_eq!(
            choose_devices(&me, &needed, &world),
            Err(Exn::MissingDevices(vec![Capability::Grab]))
        );
    }

    #[test]
    fn test_program_requirements_follow_definitions() {
        let mut store = Store::new();
        let addr = store.alloc(Slot::Delayed {
            term: Arc::new(Term::Const(Const::Move)),
            env: Env::new(),
        });
        let env = Env::unit("go".to_string(), addr);
        let reqs = program_requirements(&Arc::new(Term::var("go")), &env, &store);
        assert!(reqs.capabilities.contains(&Capability::Move));
    }
}
