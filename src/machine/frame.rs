//! Continuation frames.

use std::sync::Arc;

use crate::lang::{Term, Var};
use crate::machine::{Addr, Env, Value};

/// One pending piece of work on the continuation stack.
///
/// The stack is a `Vec` whose last element is the innermost frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Function evaluated; evaluate the argument next.
    AppArg {
        /// Argument term.
        arg: Arc<Term>,
        /// Environment for the argument.
        env: Env,
    },
    /// Argument evaluated; apply this function to it.
    AppFun {
        /// Evaluated function.
        fun: Value,
    },
    /// First component evaluated; evaluate the second.
    PairSnd {
        /// Second component.
        snd: Arc<Term>,
        /// Environment for it.
        env: Env,
    },
    /// Both components known; build the pair.
    PairFst {
        /// Evaluated first component.
        fst: Value,
    },
    /// Store the value of a recursive `let`, then evaluate its body.
    Let {
        /// Reserved cell.
        addr: Addr,
        /// Scope of the binding.
        body: Arc<Term>,
        /// Environment already extended with the binding.
        env: Env,
    },
    /// First command of `cmd; rest` finished.
    Seq {
        /// Remaining commands.
        rest: Arc<Term>,
        /// Environment for them.
        env: Env,
    },
    /// First command of `var <- cmd; rest` finished.
    Bind {
        /// Variable receiving the result.
        var: Var,
        /// Remaining commands.
        rest: Arc<Term>,
        /// Environment for them.
        env: Env,
    },
    /// Definitions made earlier in the block; added to whatever bindings
    /// the rest of the block returns.
    Merge {
        /// Earlier definitions.
        defs: Env,
    },
    /// Execute the value once it is computed.
    Exec,
    /// Branch on a boolean.
    If {
        /// Taken on `true`.
        then: Arc<Term>,
        /// Taken on `false`.
        otherwise: Arc<Term>,
        /// Environment for the branches.
        env: Env,
    },
    /// Match the value against the branches of this `case` term.
    Case {
        /// The whole `case` term.
        case: Arc<Term>,
        /// Environment for the branches.
        env: Env,
    },
    /// Memoize the value into a cell being forced.
    Update {
        /// Cell to fill.
        addr: Addr,
        /// Term being forced, restored if forcing raises.
        term: Arc<Term>,
        /// Its environment.
        env: Env,
    },
    /// Exception handler installed by `try`.
    Try {
        /// Handler command, still delayed.
        handler: Value,
    },
    /// Marks an atomic block in progress.
    Atomic,
}

impl Frame {
    /// Store addresses this frame keeps alive.
    pub(crate) fn addresses(&self, out: &mut Vec<Addr>) {
        match self {
            Frame::AppArg { env, .. }
            | Frame::PairSnd { env, .. }
            | Frame::Seq { env, .. }
            | Frame::Bind { env, .. }
            | Frame::If { env, .. }
            | Frame::Case { env, .. }
            | Frame::Merge { defs: env } => out.extend(env.values().copied()),
            Frame::Let { addr, env, .. } | Frame::Update { addr, env, .. } => {
                out.push(*addr);
                out.extend(env.values().copied());
            }
            Frame::AppFun { fun: value } | Frame::PairFst { fst: value } | Frame::Try { handler: value } => {
                value.addresses(out);
            }
            Frame::Exec | Frame::Atomic => {}
        }
    }
}
