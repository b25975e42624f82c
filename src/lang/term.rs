//! Elaborated terms, type annotations and patterns.
//!
//! Terms arrive already type-checked. Sub-terms are reference counted so
//! the machine can capture a closure body or a pending branch without
//! copying the tree.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lang::{Const, Direction};

/// A variable name.
pub type Var = String;

/// An elaborated term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// The unit value.
    Unit,
    /// Integer literal.
    Int(i64),
    /// Text literal.
    Text(String),
    /// Boolean literal.
    Bool(bool),
    /// Direction literal.
    Dir(Direction),
    /// Built-in constant.
    Const(Const),
    /// Variable reference.
    Var(Var),
    /// Pair construction.
    Pair(Arc<Term>, Arc<Term>),
    /// Anonymous function.
    Lambda {
        /// Bound parameter.
        param: Var,
        /// Optional parameter annotation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ty: Option<Type>,
        /// Function body.
        body: Arc<Term>,
    },
    /// Function application.
    App(Arc<Term>, Arc<Term>),
    /// Recursive local binding.
    Let {
        /// Bound name, visible in both `value` and `body`.
        name: Var,
        /// Optional annotation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ty: Option<Type>,
        /// Bound value.
        value: Arc<Term>,
        /// Scope of the binding.
        body: Arc<Term>,
    },
    /// Definition command: binds `name` for the rest of the enclosing block.
    Def {
        /// Defined name, visible inside `value` for recursion.
        name: Var,
        /// Optional annotation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ty: Option<Type>,
        /// Defined value, evaluated lazily on first use.
        value: Arc<Term>,
    },
    /// `var <- cmd; rest`, or `cmd; rest` when `var` is absent.
    Bind {
        /// Variable receiving the result of `cmd`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        var: Option<Var>,
        /// First command.
        cmd: Arc<Term>,
        /// Remaining commands.
        rest: Arc<Term>,
    },
    /// Delayed computation `{t}`.
    Delay {
        /// Suspended term.
        body: Arc<Term>,
        /// Memoize the first forcing in the store.
        #[serde(default)]
        memoized: bool,
    },
    /// Two-way conditional.
    If {
        /// Boolean scrutinee.
        cond: Arc<Term>,
        /// Taken when `cond` is true.
        then: Arc<Term>,
        /// Taken when `cond` is false.
        otherwise: Arc<Term>,
    },
    /// Ordered pattern match; the first matching branch wins.
    Case {
        /// Matched value.
        scrutinee: Arc<Term>,
        /// Candidate branches.
        branches: Vec<Branch>,
    },
}

/// One arm of a `case`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Pattern to match.
    pub pattern: Pattern,
    /// Body evaluated with the pattern's variables bound.
    pub body: Arc<Term>,
}

/// A `case` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Matches anything, binds nothing.
    Wildcard,
    /// Matches anything, binds it.
    Var(Var),
    /// Matches unit.
    Unit,
    /// Matches an integer.
    Int(i64),
    /// Matches a text.
    Text(String),
    /// Matches a boolean.
    Bool(bool),
    /// Matches a direction.
    Dir(Direction),
    /// Matches a left injection.
    Inl(Box<Pattern>),
    /// Matches a right injection.
    Inr(Box<Pattern>),
    /// Matches a pair.
    Pair(Box<Pattern>, Box<Pattern>),
}

impl Pattern {
    /// Variables bound by this pattern, left to right.
    #[must_use]
    pub fn binders(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_binders(&mut out);
        out
    }

    fn collect_binders<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Var(x) => out.push(x),
            Pattern::Inl(p) | Pattern::Inr(p) => p.collect_binders(out),
            Pattern::Pair(p, q) => {
                p.collect_binders(out);
                q.collect_binders(out);
            }
            Pattern::Wildcard
            | Pattern::Unit
            | Pattern::Int(_)
            | Pattern::Text(_)
            | Pattern::Bool(_)
            | Pattern::Dir(_) => {}
        }
    }
}

/// Type annotation language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    /// `unit`
    Unit,
    /// `int`
    Int,
    /// `text`
    Text,
    /// `bool`
    Bool,
    /// `dir`
    Dir,
    /// `actor`
    Robot,
    /// `cmd t`
    Cmd(Box<Type>),
    /// `{t}`
    Delay(Box<Type>),
    /// `a -> b`
    Fun(Box<Type>, Box<Type>),
    /// `a * b`
    Prod(Box<Type>, Box<Type>),
    /// `a + b`
    Sum(Box<Type>, Box<Type>),
    /// Type variable.
    Var(String),
    /// `rec a. t`
    Rec(String, Box<Type>),
}

impl Type {
    /// Whether a recursive type appears anywhere in this annotation.
    #[must_use]
    pub fn mentions_rec(&self) -> bool {
        match self {
            Type::Rec(..) => true,
            Type::Cmd(t) | Type::Delay(t) => t.mentions_rec(),
            Type::Fun(a, b) | Type::Prod(a, b) | Type::Sum(a, b) => {
                a.mentions_rec() || b.mentions_rec()
            }
            Type::Unit
            | Type::Int
            | Type::Text
            | Type::Bool
            | Type::Dir
            | Type::Robot
            | Type::Var(_) => false,
        }
    }
}

// Builders used by tooling and tests to assemble elaborated terms.
impl Term {
    /// Text literal.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Term {
        Term::Text(s.into())
    }

    /// Variable reference.
    #[must_use]
    pub fn var(x: impl Into<Var>) -> Term {
        Term::Var(x.into())
    }

    /// Unannotated lambda.
    #[must_use]
    pub fn lambda(param: impl Into<Var>, body: Term) -> Term {
        Term::Lambda {
            param: param.into(),
            ty: None,
            body: Arc::new(body),
        }
    }

    /// Application `f a`.
    #[must_use]
    pub fn app(f: Term, a: Term) -> Term {
        Term::App(Arc::new(f), Arc::new(a))
    }

    /// Constant applied to arguments left to right.
    #[must_use]
    pub fn call(c: Const, args: impl IntoIterator<Item = Term>) -> Term {
        args.into_iter().fold(Term::Const(c), Term::app)
    }

    /// Pair `(a, b)`.
    #[must_use]
    pub fn pair(a: Term, b: Term) -> Term {
        Term::Pair(Arc::new(a), Arc::new(b))
    }

    /// Sequencing `a; b`.
    #[must_use]
    pub fn seq(a: Term, b: Term) -> Term {
        Term::Bind {
            var: None,
            cmd: Arc::new(a),
            rest: Arc::new(b),
        }
    }

    /// Sequence of commands, right-nested. An empty block is `noop`.
    #[must_use]
    pub fn block(cmds: impl IntoIterator<Item = Term>) -> Term {
        let cmds: Vec<Term> = cmds.into_iter().collect();
        cmds.into_iter()
            .rev()
            .reduce(|rest, cmd| Term::seq(cmd, rest))
            .unwrap_or(Term::Const(Const::Noop))
    }

    /// Monadic bind `x <- a; b`.
    #[must_use]
    pub fn bind(x: impl Into<Var>, a: Term, b: Term) -> Term {
        Term::Bind {
            var: Some(x.into()),
            cmd: Arc::new(a),
            rest: Arc::new(b),
        }
    }

    /// Recursive `let name = value in body`.
    #[must_use]
    pub fn let_in(name: impl Into<Var>, value: Term, body: Term) -> Term {
        Term::Let {
            name: name.into(),
            ty: None,
            value: Arc::new(value),
            body: Arc::new(body),
        }
    }

    /// Definition `def name = value end`.
    #[must_use]
    pub fn def(name: impl Into<Var>, value: Term) -> Term {
        Term::Def {
            name: name.into(),
            ty: None,
            value: Arc::new(value),
        }
    }

    /// Plain delay `{t}`.
    #[must_use]
    pub fn delay(body: Term) -> Term {
        Term::Delay {
            body: Arc::new(body),
            memoized: false,
        }
    }

    /// Memoized delay.
    #[must_use]
    pub fn memo(body: Term) -> Term {
        Term::Delay {
            body: Arc::new(body),
            memoized: true,
        }
    }

    /// Conditional.
    #[must_use]
    pub fn if_then_else(cond: Term, then: Term, otherwise: Term) -> Term {
        Term::If {
            cond: Arc::new(cond),
            then: Arc::new(then),
            otherwise: Arc::new(otherwise),
        }
    }

    /// Pattern match.
    #[must_use]
    pub fn case(scrutinee: Term, branches: impl IntoIterator<Item = (Pattern, Term)>) -> Term {
        Term::Case {
            scrutinee: Arc::new(scrutinee),
            branches: branches
                .into_iter()
                .map(|(pattern, body)| Branch {
                    pattern,
                    body: Arc::new(body),
                })
                .collect(),
        }
    }

    /// `try {body} {handler}`.
    #[must_use]
    pub fn try_catch(body: Term, handler: Term) -> Term {
        Term::call(Const::Try, [Term::delay(body), Term::delay(handler)])
    }

    /// `atomic {body}`.
    #[must_use]
    pub fn atomic(body: Term) -> Term {
        Term::call(Const::Atomic, [Term::delay(body)])
    }

    /// Whether `x` occurs free in this term.
    #[must_use]
    pub fn occurs_free(&self, x: &str) -> bool {
        match self {
            Term::Var(y) => y == x,
            Term::Unit
            | Term::Int(_)
            | Term::Text(_)
            | Term::Bool(_)
            | Term::Dir(_)
            | Term::Const(_) => false,
            Term::Pair(a, b) | Term::App(a, b) => a.occurs_free(x) || b.occurs_free(x),
            Term::Lambda { param, body, .. } => param != x && body.occurs_free(x),
            Term::Let {
                name, value, body, ..
            } => name != x && (value.occurs_free(x) || body.occurs_free(x)),
            Term::Def { name, value, .. } => name != x && value.occurs_free(x),
            Term::Bind { var, cmd, rest } => {
                cmd.occurs_free(x)
                    || (var.as_deref() != Some(x) && !defines(cmd, x) && rest.occurs_free(x))
            }
            Term::Delay { body, .. } => body.occurs_free(x),
            Term::If {
                cond,
                then,
                otherwise,
            } => cond.occurs_free(x) || then.occurs_free(x) || otherwise.occurs_free(x),
            Term::Case {
                scrutinee,
                branches,
            } => {
                scrutinee.occurs_free(x)
                    || branches
                        .iter()
                        .any(|b| !b.pattern.binders().contains(&x) && b.body.occurs_free(x))
            }
        }
    }
}

/// Whether `cmd` is a definition of `x`.
fn defines(cmd: &Term, x: &str) -> bool {
    matches!(cmd, Term::Def { name, .. } if name == x)
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Unit => f.write_str("()"),
            Term::Int(n) => write!(f, "{n}"),
            Term::Text(s) => write!(f, "{s:?}"),
            Term::Bool(b) => write!(f, "{b}"),
            Term::Dir(d) => write!(f, "{d}"),
            Term::Const(c) => write!(f, "{c}"),
            Term::Var(x) => f.write_str(x),
            Term::Pair(a, b) => write!(f, "({a}, {b})"),
            Term::Lambda { param, body, .. } => write!(f, "\\{param}. {body}"),
            Term::App(a, b) => write!(f, "({a} {b})"),
            Term::Let {
                name, value, body, ..
            } => write!(f, "let {name} = {value} in {body}"),
            Term::Def { name, value, .. } => write!(f, "def {name} = {value} end"),
            Term::Bind {
                var: Some(x),
                cmd,
                rest,
            } => write!(f, "{x} <- {cmd}; {rest}"),
            Term::Bind {
                var: None,
                cmd,
                rest,
            } => write!(f, "{cmd}; {rest}"),
            Term::Delay { body, .. } => write!(f, "{{{body}}}"),
            Term::If {
                cond,
                then,
                otherwise,
            } => write!(f, "if {cond} {{{then}}} {{{otherwise}}}"),
            Term::Case { scrutinee, .. } => write!(f, "case {scrutinee} of ..."),
        }
    }
}
