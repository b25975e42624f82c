// Allow unwrap and unreadable literals in tests (test code is not production)
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::unreadable_literal))]
//! Swarm: the execution core of a robot-programming game.
//!
//! Many robots each run a small functional program against one shared,
//! mutable world. Execution is:
//! - Bit-exact deterministic for a given world and seed
//! - Fuel metered, so no robot can starve the others
//! - Capability gated, so robots only do what their devices allow
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     Tick Scheduler (scheduler)      │
//! ├──────────────────┬──────────────────┤
//! │  Robot Contexts  │  Capability Gate │
//! ├──────────────────┴──────────────────┤
//! │     CESK Abstract Machine           │
//! ├─────────────────────────────────────┤
//! │   Terms (lang)  │  Shared World     │
//! └─────────────────────────────────────┘
//! ```
//!
//! A program arrives as an elaborated [`Term`]. The [`requirements`]
//! analyzer computes what it needs; the [`gate`] compares that with what a
//! robot has. The [`machine`] runs the program one small step at a time,
//! proposing [`Effect`]s that the [`Scheduler`] applies to the [`World`] in
//! robot-id order.

pub mod context;
pub mod error;
pub mod gate;
pub mod hypothetical;
pub mod lang;
pub mod machine;
pub mod requirements;
pub mod scheduler;
pub mod session;
pub mod world;

pub use context::{Program, RobotContext, Status};
pub use error::Exn;
pub use hypothetical::{Hypothetical, HypotheticalOutcome};
pub use lang::{Capability, Const, Direction, Pattern, Term};
pub use machine::{Machine, MachineState, Value};
pub use requirements::Requirements;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, TickReport};
pub use session::{Session, SessionError, SessionFile};
pub use world::{Coord, Effect, Robot, RobotId, World, WorldView};
