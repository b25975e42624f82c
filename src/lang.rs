//! The robot language as the execution core sees it: elaborated terms,
//! built-in constants, directions and capabilities.

mod capability;
mod constant;
mod direction;
mod term;

pub use capability::Capability;
pub use constant::{Const, ConstInfo, ConstKind};
pub use direction::Direction;
pub use term::{Branch, Pattern, Term, Type, Var};
