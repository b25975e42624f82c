//! Static requirements analysis.
//!
//! Walks an elaborated term and collects the capabilities, devices and
//! inventory it may need. Variables resolve through a context of earlier
//! definitions; every binder removes its name from the context for the scope
//! it covers, so a parameter that shadows a definition never inherits the
//! definition's footprint.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::lang::{Capability, Const, Pattern, Term, Type, Var};

/// What a program needs in order to run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requirements {
    /// Capabilities that must be granted.
    #[serde(default)]
    pub capabilities: BTreeSet<Capability>,
    /// Devices the program equips or unequips by name.
    #[serde(default)]
    pub devices: BTreeSet<String>,
    /// Items the program places or gives by name, with counts.
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
}

impl Requirements {
    /// Check if nothing is required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.devices.is_empty() && self.inventory.is_empty()
    }

    /// Add everything `other` requires. Inventory counts merge by maximum,
    /// so merging is idempotent.
    pub fn merge(&mut self, other: &Requirements) {
        self.capabilities.extend(other.capabilities.iter().copied());
        self.devices.extend(other.devices.iter().cloned());
        for (item, n) in &other.inventory {
            self.need_item(item, *n);
        }
    }

    /// Union of two requirement sets.
    #[must_use]
    pub fn union(mut self, other: &Requirements) -> Requirements {
        self.merge(other);
        self
    }

    fn need_item(&mut self, item: &str, n: u32) {
        let slot = self.inventory.entry(item.to_string()).or_insert(0);
        *slot = (*slot).max(n);
    }
}

/// Requirements of names defined so far.
pub type ReqCtx = im::OrdMap<Var, Requirements>;

/// Requirements of `term` under `ctx`.
#[must_use]
pub fn requirements(ctx: &ReqCtx, term: &Term) -> Requirements {
    let mut reqs = Requirements::default();
    collect(ctx, term, &mut reqs);
    reqs
}

/// Requirements of each top-level definition in a command block, in order.
///
/// Each definition is analyzed in a context holding the definitions before it.
#[must_use]
pub fn definition_requirements(term: &Term) -> Vec<(Var, Requirements)> {
    walk_definitions(ReqCtx::new(), term).1
}

/// `ctx` extended with the top-level definitions of a command block.
///
/// A reference to one of them afterwards carries what its body needs.
#[must_use]
pub fn with_definitions(ctx: &ReqCtx, term: &Term) -> ReqCtx {
    let (scope, defs) = walk_definitions(ctx.clone(), term);
    defs.into_iter().fold(ctx.clone(), |acc, (name, _)| match scope.get(&name) {
        Some(reqs) => acc.update(name, reqs.clone()),
        None => acc,
    })
}

fn walk_definitions(mut ctx: ReqCtx, term: &Term) -> (ReqCtx, Vec<(Var, Requirements)>) {
    let mut defs = Vec::new();
    let mut current = term;
    loop {
        let (cmd, next) = match current {
            Term::Bind { var, cmd, rest } => {
                if let Some(x) = var {
                    ctx = ctx.without(x);
                }
                (&**cmd, Some(&**rest))
            }
            other => (other, None),
        };
        if let Term::Def { name, value, .. } = cmd {
            let reqs = requirements(&ctx, cmd);
            ctx = ctx.update(name.clone(), definition_body(&ctx, name, value));
            defs.push((name.clone(), reqs));
        }
        match next {
            Some(rest) => current = rest,
            None => return (ctx, defs),
        }
    }
}

/// Requirements a reference to a definition carries.
fn definition_body(ctx: &ReqCtx, name: &str, value: &Term) -> Requirements {
    let mut reqs = requirements(&ctx.without(name), value);
    if value.occurs_free(name) {
        reqs.capabilities.insert(Capability::Recursion);
    }
    reqs
}

fn annotate(ty: Option<&Type>, out: &mut Requirements) {
    if ty.is_some_and(Type::mentions_rec) {
        out.capabilities.insert(Capability::RecursiveTypes);
    }
}

fn pattern_requirements(pattern: &Pattern, out: &mut Requirements) {
    match pattern {
        Pattern::Inl(p) | Pattern::Inr(p) => {
            out.capabilities.insert(Capability::Sum);
            pattern_requirements(p, out);
        }
        Pattern::Pair(p, q) => {
            out.capabilities.insert(Capability::Product);
            pattern_requirements(p, out);
            pattern_requirements(q, out);
        }
        _ => {}
    }
}

fn collect(ctx: &ReqCtx, term: &Term, out: &mut Requirements) {
    match term {
        Term::Unit | Term::Int(_) | Term::Text(_) | Term::Bool(_) | Term::Dir(_) => {}
        Term::Const(c) => {
            if let Some(cap) = c.info().capability {
                out.capabilities.insert(cap);
            }
        }
        Term::Var(x) => {
            if let Some(reqs) = ctx.get(x) {
                out.merge(reqs);
            }
        }
        Term::Pair(a, b) => {
            out.capabilities.insert(Capability::Product);
            collect(ctx, a, out);
            collect(ctx, b, out);
        }
        Term::Lambda { param, ty, body } => {
            out.capabilities.insert(Capability::Lambda);
            annotate(ty.as_ref(), out);
            collect(&ctx.without(param), body, out);
        }
        Term::App(f, a) => match (&**f, &**a) {
            // The child's program is paid for with the devices handed over at build time.
            (Term::Const(Const::Build), _) => {
                out.capabilities.insert(Capability::Build);
            }
            (Term::Const(Const::Equip | Const::Unequip), Term::Text(device)) => {
                collect(ctx, f, out);
                out.devices.insert(device.clone());
            }
            (Term::Const(Const::Place), Term::Text(item)) => {
                collect(ctx, f, out);
                out.need_item(item, 1);
            }
            (Term::App(g, _), Term::Text(item)) if matches!(**g, Term::Const(Const::Give)) => {
                collect(ctx, f, out);
                out.need_item(item, 1);
            }
            _ => {
                collect(ctx, f, out);
                collect(ctx, a, out);
            }
        },
        Term::Let {
            name,
            ty,
            value,
            body,
        } => {
            annotate(ty.as_ref(), out);
            if value.occurs_free(name) {
                out.capabilities.insert(Capability::Recursion);
            }
            let inner = ctx.without(name);
            collect(&inner, value, out);
            collect(&inner, body, out);
        }
        Term::Def { name, ty, value } => {
            out.capabilities.insert(Capability::Env);
            annotate(ty.as_ref(), out);
            out.merge(&definition_body(ctx, name, value));
        }
        Term::Bind { var, cmd, rest } => {
            collect(ctx, cmd, out);
            let scope = match (var, &**cmd) {
                (Some(x), _) => ctx.without(x),
                (None, Term::Def { name, value, .. }) => {
                    ctx.update(name.clone(), definition_body(ctx, name, value))
                }
                (None, _) => ctx.clone(),
            };
            collect(&scope, rest, out);
        }
        Term::Delay { body, .. } => collect(ctx, body, out),
        Term::If {
            cond,
            then,
            otherwise,
        } => {
            out.capabilities.insert(Capability::Cond);
            collect(ctx, cond, out);
            collect(ctx, then, out);
            collect(ctx, otherwise, out);
        }
        Term::Case {
            scrutinee,
            branches,
        } => {
            out.capabilities.insert(Capability::Case);
            collect(ctx, scrutinee, out);
            for branch in branches {
                pattern_requirements(&branch.pattern, out);
                let scope = branch
                    .pattern
                    .binders()
                    .into_iter()
                    .fold(ctx.clone(), |scope, x| scope.without(x));
                collect(&scope, &branch.body, out);
            }
        }
    }
}
