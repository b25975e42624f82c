//! Session files.
//!
//! A session describes a starting world and the programs its robots run.
//! It is plain JSON so scenarios can be written by hand or generated by
//! tooling.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::context::Program;
use crate::lang::{Direction, Term};
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use crate::world::{Cell, Coord, EntityInfo, Grid, Recipe, Robot, World, WorldError};

/// Errors loading a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not a valid session.
    #[error("invalid session: {0}")]
    Parse(#[from] serde_json::Error),
    /// Width or height is zero.
    #[error("grid must be at least 1x1")]
    EmptyGrid,
    /// The world rejected part of the layout.
    #[error(transparent)]
    World(#[from] WorldError),
    /// A robot could not be registered.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// An entity lying on the grid at the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Cell.
    pub at: Coord,
    /// Entity name.
    pub entity: String,
}

/// A robot present at the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSpec {
    /// Display name.
    pub name: String,
    /// Starting cell.
    pub at: Coord,
    /// Starting heading; north if absent.
    #[serde(default)]
    pub heading: Option<Direction>,
    /// Carried items.
    #[serde(default)]
    pub inventory: BTreeMap<String, u32>,
    /// Equipped devices.
    #[serde(default)]
    pub equipped: BTreeSet<String>,
    /// Bypasses capability checks.
    #[serde(default)]
    pub system: bool,
    /// Program to run; the robot idles if absent.
    #[serde(default)]
    pub program: Option<Term>,
}

/// The on-disk session format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    /// Seed for deterministic randomness.
    #[serde(default)]
    pub seed: u64,
    /// Grid width.
    pub width: u16,
    /// Grid height.
    pub height: u16,
    /// Wall cells.
    #[serde(default)]
    pub walls: Vec<Coord>,
    /// Entities lying on the grid.
    #[serde(default)]
    pub items: Vec<Placement>,
    /// Entity catalog.
    #[serde(default)]
    pub entities: Vec<EntityInfo>,
    /// Crafting recipes.
    #[serde(default)]
    pub recipes: Vec<Recipe>,
    /// Robots, given ids 1, 2, ... in this order.
    #[serde(default)]
    pub robots: Vec<RobotSpec>,
    /// Scheduler limits.
    #[serde(default)]
    pub config: SchedulerConfig,
}

/// A world together with the scheduler driving it.
#[derive(Debug, Clone)]
pub struct Session {
    /// The world.
    pub world: World,
    /// The scheduler.
    pub scheduler: Scheduler,
}

impl SessionFile {
    /// Parse a session from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Parse`] if the text is not a valid session.
    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a session file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Build the starting world and register every robot.
    ///
    /// # Errors
    ///
    /// Returns an error if the grid is empty, something lies off the grid,
    /// or a robot cannot be registered.
    pub fn build(&self) -> Result<Session, SessionError> {
        let mut grid = Grid::new(self.width, self.height).ok_or(SessionError::EmptyGrid)?;
        for &at in &self.walls {
            if !grid.in_bounds(at) {
                return Err(WorldError::OutOfBounds(at).into());
            }
            grid.set(at, Cell::wall());
        }
        for placement in &self.items {
            if !grid.in_bounds(placement.at) {
                return Err(WorldError::OutOfBounds(placement.at).into());
            }
            grid.set(placement.at, Cell::with_entity(placement.entity.as_str()));
        }

        let mut world = World::new(grid, self.seed);
        for info in &self.entities {
            world.add_entity(info.clone());
        }
        for recipe in &self.recipes {
            world.add_recipe(recipe.clone());
        }

        let mut scheduler = Scheduler::new(self.config);
        for (id, spec) in (1..).zip(&self.robots) {
            let mut robot = Robot::new(id, spec.name.as_str(), spec.at);
            robot.heading = spec.heading.unwrap_or(Direction::North);
            robot.inventory.clone_from(&spec.inventory);
            robot.equipped.clone_from(&spec.equipped);
            robot.system = spec.system;
            let program = spec.program.clone().map(Program::new);
            scheduler.spawn(&mut world, robot, program.as_ref())?;
        }

        info!(
            width = self.width,
            height = self.height,
            robots = self.robots.len(),
            "session loaded"
        );
        Ok(Session { world, scheduler })
    }
}

impl Session {
    /// Load and build a session file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or built.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        SessionFile::load(path)?.build()
    }
}
