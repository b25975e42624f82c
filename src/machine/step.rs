//! The transition function.

use std::sync::Arc;

use tracing::error;

use crate::error::Exn;
use crate::lang::{ConstKind, Term, Var};
use crate::machine::primitive;
use crate::machine::{Addr, Env, Frame, MachineState, Slot, Step, StepContext, Store, Value};

/// Take one transition.
///
/// `Done` is a fixed point. A `Waiting` state resumes with `()` once the
/// world's tick reaches its target and otherwise stays put.
#[must_use]
pub fn step(state: MachineState, ctx: &StepContext<'_>) -> Step {
    match state {
        MachineState::Evaluating {
            term,
            env,
            store,
            kont,
        } => Step::to(eval(&term, env, store, kont)),
        MachineState::Returning { value, store, kont } => ret(value, store, kont, ctx),
        MachineState::Raising { exn, store, kont } => Step::to(unwind(exn, store, kont)),
        MachineState::Waiting { until, store, kont } => {
            if ctx.world.tick() >= until {
                Step::to(MachineState::Returning {
                    value: Value::Unit,
                    store,
                    kont,
                })
            } else {
                Step::to(MachineState::Waiting { until, store, kont })
            }
        }
        done @ MachineState::Done { .. } => Step::to(done),
    }
}

/// Raise an internal invariant violation.
///
/// Well-typed programs never reach this. Debug builds stop immediately.
pub(crate) fn fatal(message: String, store: Store, kont: Vec<Frame>) -> MachineState {
    error!(%message, "machine invariant violated");
    if cfg!(debug_assertions) {
        panic!("machine invariant violated: {message}");
    }
    MachineState::Raising {
        exn: Exn::Fatal(message),
        store,
        kont,
    }
}

pub(crate) const fn returning(value: Value, store: Store, kont: Vec<Frame>) -> MachineState {
    MachineState::Returning { value, store, kont }
}

pub(crate) const fn raising(exn: Exn, store: Store, kont: Vec<Frame>) -> MachineState {
    MachineState::Raising { exn, store, kont }
}

fn evaluating(term: &Arc<Term>, env: Env, store: Store, kont: Vec<Frame>) -> MachineState {
    MachineState::Evaluating {
        term: Arc::clone(term),
        env,
        store,
        kont,
    }
}

fn eval(term: &Arc<Term>, env: Env, mut store: Store, mut kont: Vec<Frame>) -> MachineState {
    match &**term {
        Term::Unit => returning(Value::Unit, store, kont),
        Term::Int(n) => returning(Value::Int(*n), store, kont),
        Term::Text(s) => returning(Value::Text(s.clone()), store, kont),
        Term::Bool(b) => returning(Value::Bool(*b), store, kont),
        Term::Dir(d) => returning(Value::Dir(*d), store, kont),
        Term::Const(op) => returning(
            Value::Const {
                op: *op,
                args: Vec::new(),
            },
            store,
            kont,
        ),
        Term::Var(x) => lookup(x, &env, store, kont),
        Term::Pair(a, b) => {
            kont.push(Frame::PairSnd {
                snd: Arc::clone(b),
                env: env.clone(),
            });
            evaluating(a, env, store, kont)
        }
        Term::Lambda { param, body, .. } => returning(
            Value::Closure {
                param: param.clone(),
                body: Arc::clone(body),
                env,
            },
            store,
            kont,
        ),
        Term::App(f, a) => {
            kont.push(Frame::AppArg {
                arg: Arc::clone(a),
                env: env.clone(),
            });
            evaluating(f, env, store, kont)
        }
        Term::Let {
            name, value, body, ..
        } => {
            let addr = store.alloc(Slot::Forcing);
            let env = env.update(name.clone(), addr);
            kont.push(Frame::Let {
                addr,
                body: Arc::clone(body),
                env: env.clone(),
            });
            evaluating(value, env, store, kont)
        }
        Term::Def { name, value, .. } => returning(
            Value::Define {
                name: name.clone(),
                body: Arc::clone(value),
                env,
            },
            store,
            kont,
        ),
        Term::Bind { var, cmd, rest } => returning(
            Value::Bind {
                var: var.clone(),
                cmd: Arc::clone(cmd),
                rest: Arc::clone(rest),
                env,
            },
            store,
            kont,
        ),
        Term::Delay {
            body,
            memoized: false,
        } => returning(
            Value::Delay {
                body: Arc::clone(body),
                env,
            },
            store,
            kont,
        ),
        Term::Delay {
            body,
            memoized: true,
        } => {
            let addr = store.alloc(Slot::Delayed {
                term: Arc::clone(body),
                env,
            });
            returning(Value::Ref(addr), store, kont)
        }
        Term::If {
            cond,
            then,
            otherwise,
        } => {
            kont.push(Frame::If {
                then: Arc::clone(then),
                otherwise: Arc::clone(otherwise),
                env: env.clone(),
            });
            evaluating(cond, env, store, kont)
        }
        Term::Case { scrutinee, .. } => {
            kont.push(Frame::Case {
                case: Arc::clone(term),
                env: env.clone(),
            });
            evaluating(scrutinee, env, store, kont)
        }
    }
}

fn lookup(x: &Var, env: &Env, store: Store, kont: Vec<Frame>) -> MachineState {
    match env.get(x) {
        Some(&addr) => force_cell(addr, x, store, kont),
        None => fatal(format!("unbound variable '{x}'"), store, kont),
    }
}

/// Read a cell, starting to compute it if it is still delayed.
pub(crate) fn force_cell(addr: Addr, label: &str, mut store: Store, mut kont: Vec<Frame>) -> MachineState {
    match store.get(addr) {
        Some(Slot::Value(v)) => {
            let v = v.clone();
            returning(v, store, kont)
        }
        Some(Slot::Forcing) => raising(Exn::InfiniteLoop(label.to_string()), store, kont),
        Some(Slot::Delayed { .. }) => match store.begin_forcing(addr) {
            Some(Slot::Delayed { term, env }) => {
                kont.push(Frame::Update {
                    addr,
                    term: Arc::clone(&term),
                    env: env.clone(),
                });
                evaluating(&term, env, store, kont)
            }
            _ => fatal(format!("cell {addr} changed while forcing"), store, kont),
        },
        None => fatal(format!("dangling address {addr}"), store, kont),
    }
}

/// Evaluate a delayed value.
pub(crate) fn force_value(value: Value, store: Store, kont: Vec<Frame>) -> MachineState {
    match value {
        Value::Delay { body, env } => evaluating(&body, env, store, kont),
        Value::Ref(addr) => force_cell(addr, "delayed expression", store, kont),
        other => returning(other, store, kont),
    }
}

fn ret(value: Value, mut store: Store, mut kont: Vec<Frame>, ctx: &StepContext<'_>) -> Step {
    let Some(frame) = kont.pop() else {
        return Step::to(MachineState::Done {
            result: Ok(value),
            store,
        });
    };
    let next = match frame {
        Frame::AppArg { arg, env } => {
            kont.push(Frame::AppFun { fun: value });
            evaluating(&arg, env, store, kont)
        }
        Frame::AppFun { fun } => apply(fun, value, store, kont),
        Frame::PairSnd { snd, env } => {
            kont.push(Frame::PairFst { fst: value });
            evaluating(&snd, env, store, kont)
        }
        Frame::PairFst { fst } => returning(Value::Pair(Box::new(fst), Box::new(value)), store, kont),
        Frame::Let { addr, body, env } => {
            store.set(addr, Slot::Value(value));
            evaluating(&body, env, store, kont)
        }
        Frame::Seq { rest, env } => {
            let env = match value {
                Value::Bound(defs) => {
                    kont.push(Frame::Merge { defs: defs.clone() });
                    defs.union(env)
                }
                _ => env,
            };
            kont.push(Frame::Exec);
            evaluating(&rest, env, store, kont)
        }
        Frame::Bind { var, rest, env } => {
            let (value, env) = match value {
                Value::Bound(defs) => {
                    kont.push(Frame::Merge { defs: defs.clone() });
                    (Value::Unit, defs.union(env))
                }
                v => (v, env),
            };
            let addr = store.alloc_value(value);
            kont.push(Frame::Exec);
            evaluating(&rest, env.update(var, addr), store, kont)
        }
        Frame::Merge { defs } => match value {
            Value::Bound(later) => returning(Value::Bound(later.union(defs)), store, kont),
            Value::Unit => returning(Value::Bound(defs), store, kont),
            other => returning(other, store, kont),
        },
        Frame::Exec => return primitive::exec(value, store, kont, ctx),
        Frame::If {
            then,
            otherwise,
            env,
        } => match value {
            Value::Bool(true) => evaluating(&then, env, store, kont),
            Value::Bool(false) => evaluating(&otherwise, env, store, kont),
            other => fatal(format!("if on non-boolean {other}"), store, kont),
        },
        Frame::Case { case, env } => select_branch(&case, &value, env, store, kont),
        Frame::Update { addr, .. } => {
            store.set(addr, Slot::Value(value.clone()));
            returning(value, store, kont)
        }
        Frame::Try { .. } | Frame::Atomic => returning(value, store, kont),
    };
    Step::to(next)
}

fn apply(fun: Value, arg: Value, mut store: Store, kont: Vec<Frame>) -> MachineState {
    match fun {
        Value::Closure { param, body, env } => {
            let addr = store.alloc_value(arg);
            evaluating(&body, env.update(param, addr), store, kont)
        }
        Value::Const { op, mut args } => {
            args.push(arg);
            let info = op.info();
            if args.len() < info.arity || info.kind == ConstKind::Command {
                returning(Value::Const { op, args }, store, kont)
            } else {
                primitive::call_function(op, args, store, kont)
            }
        }
        other => fatal(format!("cannot apply {other}"), store, kont),
    }
}

fn select_branch(case: &Term, value: &Value, env: Env, mut store: Store, kont: Vec<Frame>) -> MachineState {
    let Term::Case { branches, .. } = case else {
        return fatal("case frame without a case term".to_string(), store, kont);
    };
    let mut bindings = Vec::new();
    for branch in branches {
        bindings.clear();
        if value.matches(&branch.pattern, &mut bindings) {
            let env = bindings.drain(..).fold(env, |env, (x, v)| {
                let addr = store.alloc_value(v);
                env.update(x, addr)
            });
            return evaluating(&branch.body, env, store, kont);
        }
    }
    raising(Exn::NoMatch(value.to_string()), store, kont)
}

/// Unwind to the innermost handler in one transition.
fn unwind(exn: Exn, mut store: Store, mut kont: Vec<Frame>) -> MachineState {
    while let Some(frame) = kont.pop() {
        match frame {
            Frame::Update { addr, term, env } => {
                store.set(addr, Slot::Delayed { term, env });
            }
            Frame::Try { handler } if exn.is_catchable() => {
                kont.push(Frame::Exec);
                return force_value(handler, store, kont);
            }
            _ => {}
        }
    }
    MachineState::Done {
        result: Err(exn),
        store,
    }
}

/// Leave the innermost atomic block with `exn`.
///
/// Handlers installed inside the block are dropped, so the exception is
/// raised from just outside it.
pub(crate) fn abort_atomic(exn: Exn, mut store: Store, mut kont: Vec<Frame>) -> MachineState {
    while let Some(frame) = kont.pop() {
        match frame {
            Frame::Update { addr, term, env } => {
                store.set(addr, Slot::Delayed { term, env });
            }
            Frame::Atomic => break,
            _ => {}
        }
    }
    raising(exn, store, kont)
}
