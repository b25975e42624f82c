//! Runtime values and environments.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::lang::{Const, Direction, Pattern, Term, Var};
use crate::machine::Addr;
use crate::world::RobotId;

/// Persistent map from variable to store address.
///
/// Extension returns a new map sharing structure with the old one, so a
/// closure and the scope it was created in can both hold an environment
/// without copying.
pub type Env = im::OrdMap<Var, Addr>;

/// A fully evaluated value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `()`
    Unit,
    /// Integer.
    Int(i64),
    /// Text.
    Text(String),
    /// Boolean.
    Bool(bool),
    /// Direction.
    Dir(Direction),
    /// Reference to a robot.
    Robot(RobotId),
    /// Left injection.
    Inl(Box<Value>),
    /// Right injection.
    Inr(Box<Value>),
    /// Pair.
    Pair(Box<Value>, Box<Value>),
    /// Function closed over its defining environment.
    Closure {
        /// Parameter.
        param: Var,
        /// Body.
        body: Arc<Term>,
        /// Captured environment.
        env: Env,
    },
    /// Suspended computation.
    Delay {
        /// Suspended term.
        body: Arc<Term>,
        /// Captured environment.
        env: Env,
    },
    /// Store cell holding a memoized delay.
    Ref(Addr),
    /// Built-in constant with the arguments collected so far.
    Const {
        /// The constant.
        op: Const,
        /// Arguments, in application order.
        args: Vec<Value>,
    },
    /// Suspended `var <- cmd; rest` command.
    Bind {
        /// Bound variable, absent for plain sequencing.
        var: Option<Var>,
        /// First command.
        cmd: Arc<Term>,
        /// Remaining commands.
        rest: Arc<Term>,
        /// Captured environment.
        env: Env,
    },
    /// Suspended `def` command.
    Define {
        /// Defined name.
        name: Var,
        /// Defined term.
        body: Arc<Term>,
        /// Captured environment.
        env: Env,
    },
    /// Result of executing definitions: the bindings they introduced.
    Bound(Env),
}

impl Value {
    /// Text payload, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Match against a pattern, pushing bindings on success.
    ///
    /// On failure `bindings` may hold partial results and should be discarded.
    pub fn matches(&self, pattern: &Pattern, bindings: &mut Vec<(Var, Value)>) -> bool {
        match (pattern, self) {
            (Pattern::Wildcard, _) => true,
            (Pattern::Var(x), v) => {
                bindings.push((x.clone(), v.clone()));
                true
            }
            (Pattern::Unit, Value::Unit) => true,
            (Pattern::Int(a), Value::Int(b)) => a == b,
            (Pattern::Text(a), Value::Text(b)) => a == b,
            (Pattern::Bool(a), Value::Bool(b)) => a == b,
            (Pattern::Dir(a), Value::Dir(b)) => a == b,
            (Pattern::Inl(p), Value::Inl(v)) | (Pattern::Inr(p), Value::Inr(v)) => {
                v.matches(p, bindings)
            }
            (Pattern::Pair(p, q), Value::Pair(a, b)) => {
                a.matches(p, bindings) && b.matches(q, bindings)
            }
            _ => false,
        }
    }

    /// Store addresses this value refers to, directly or through environments.
    pub(crate) fn addresses(&self, out: &mut Vec<Addr>) {
        match self {
            Value::Inl(v) | Value::Inr(v) => v.addresses(out),
            Value::Pair(a, b) => {
                a.addresses(out);
                b.addresses(out);
            }
            Value::Closure { env, .. }
            | Value::Delay { env, .. }
            | Value::Bind { env, .. }
            | Value::Define { env, .. }
            | Value::Bound(env) => out.extend(env.values().copied()),
            Value::Ref(addr) => out.push(*addr),
            Value::Const { args, .. } => args.iter().for_each(|a| a.addresses(out)),
            Value::Unit
            | Value::Int(_)
            | Value::Text(_)
            | Value::Bool(_)
            | Value::Dir(_)
            | Value::Robot(_) => {}
        }
    }

    /// Rewrite store addresses through `map`.
    pub(crate) fn relocate(&self, map: &BTreeMap<Addr, Addr>) -> Value {
        let env_of = |env: &Env| relocate_env(env, map);
        match self {
            Value::Inl(v) => Value::Inl(Box::new(v.relocate(map))),
            Value::Inr(v) => Value::Inr(Box::new(v.relocate(map))),
            Value::Pair(a, b) => Value::Pair(Box::new(a.relocate(map)), Box::new(b.relocate(map))),
            Value::Closure { param, body, env } => Value::Closure {
                param: param.clone(),
                body: Arc::clone(body),
                env: env_of(env),
            },
            Value::Delay { body, env } => Value::Delay {
                body: Arc::clone(body),
                env: env_of(env),
            },
            Value::Bind {
                var,
                cmd,
                rest,
                env,
            } => Value::Bind {
                var: var.clone(),
                cmd: Arc::clone(cmd),
                rest: Arc::clone(rest),
                env: env_of(env),
            },
            Value::Define { name, body, env } => Value::Define {
                name: name.clone(),
                body: Arc::clone(body),
                env: env_of(env),
            },
            Value::Bound(env) => Value::Bound(env_of(env)),
            Value::Ref(addr) => map.get(addr).map_or(Value::Unit, |a| Value::Ref(*a)),
            Value::Const { op, args } => Value::Const {
                op: *op,
                args: args.iter().map(|a| a.relocate(map)).collect(),
            },
            other => other.clone(),
        }
    }
}

/// Rewrite an environment's addresses, dropping names whose cells were not copied.
pub(crate) fn relocate_env(env: &Env, map: &BTreeMap<Addr, Addr>) -> Env {
    env.iter()
        .filter_map(|(name, addr)| map.get(addr).map(|a| (name.clone(), *a)))
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Dir(d) => write!(f, "{d}"),
            Value::Robot(id) => write!(f, "<robot {id}>"),
            Value::Inl(v) => write!(f, "inl {v}"),
            Value::Inr(v) => write!(f, "inr {v}"),
            Value::Pair(a, b) => write!(f, "({a}, {b})"),
            Value::Closure { param, body, .. } => write!(f, "\\{param}. {body}"),
            Value::Delay { body, .. } => write!(f, "{{{body}}}"),
            Value::Ref(addr) => write!(f, "<ref {addr}>"),
            Value::Const { op, args } => {
                write!(f, "{op}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Value::Bind {
                var: Some(x),
                cmd,
                rest,
                ..
            } => write!(f, "{x} <- {cmd}; {rest}"),
            Value::Bind { cmd, rest, .. } => write!(f, "{cmd}; {rest}"),
            Value::Define { name, body, .. } => write!(f, "def {name} = {body} end"),
            Value::Bound(env) => {
                let names: Vec<&str> = env.keys().map(String::as_str).collect();
                write!(f, "<defined {}>", names.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching_binds_in_order() {
        let v = Value::Pair(
            Box::new(Value::Int(1)),
            Box::new(Value::Inr(Box::new(Value::Text("rock".into())))),
        );
        let pattern = Pattern::Pair(
            Box::new(Pattern::Var("n".into())),
            Box::new(Pattern::Inr(Box::new(Pattern::Var("e".into())))),
        );
        let mut bindings = Vec::new();
        assert!(v.matches(&pattern, &mut bindings));
        assert_eq!(
            bindings,
            vec![
                ("n".to_string(), Value::Int(1)),
                ("e".to_string(), Value::Text("rock".into()))
            ]
        );
    }

    #[test]
    fn test_pattern_mismatch() {
        let mut bindings = Vec::new();
        assert!(!Value::Inl(Box::new(Value::Unit)).matches(
            &Pattern::Inr(Box::new(Pattern::Wildcard)),
            &mut bindings
        ));
        assert!(!Value::Int(3).matches(&Pattern::Int(4), &mut bindings));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Text("hi".into()).to_string(), "\"hi\"");
        assert_eq!(
            Value::Pair(Box::new(Value::Int(1)), Box::new(Value::Bool(true))).to_string(),
            "(1, true)"
        );
        assert_eq!(
            Value::Const {
                op: Const::Add,
                args: vec![Value::Int(1)]
            }
            .to_string(),
            "+ 1"
        );
    }

    #[test]
    fn test_relocate_rewrites_refs() {
        let map: BTreeMap<Addr, Addr> = [(5, 0)].into_iter().collect();
        assert_eq!(Value::Ref(5).relocate(&map), Value::Ref(0));

        let env: Env = [("x".to_string(), 5usize), ("y".to_string(), 9usize)].into_iter().collect();
        let relocated = relocate_env(&env, &map);
        assert_eq!(relocated.get("x"), Some(&0));
        assert!(relocated.get("y").is_none());
    }
}
