//! Eval command implementation.
//!
//! Evaluates a program hypothetically: against a session's starting world
//! as seen by one of its robots, or against a one-cell scratch world with a
//! system robot. Nothing is applied.

use super::output::{format_eval_text, JsonEvalResult};
use super::{print_json, read_program, CliError, OutputFormat};
use std::path::Path;
use swarm::world::Grid;
use swarm::{Coord, Hypothetical, Robot, RobotId, SessionFile, World};

/// Execute the eval command.
///
/// # Errors
///
/// Returns an error if the program or session cannot be loaded, or the
/// robot does not exist.
pub(crate) fn execute(
    program: &Path,
    session: Option<&Path>,
    robot: RobotId,
    max_steps: u64,
    format: OutputFormat,
) -> Result<(), CliError> {
    let program = read_program(program)?;

    let world = match session {
        Some(path) => SessionFile::load(path)?.build()?.world,
        None => scratch_world(robot)?,
    };
    let hypo = Hypothetical::for_robot(&world, robot)
        .ok_or_else(|| CliError::new(format!("No robot with id {robot}")))?;

    let outcome = hypo.run(&program, max_steps);
    let result = JsonEvalResult::from_outcome(&outcome, &hypo);

    match format {
        OutputFormat::Text => print!("{}", format_eval_text(&result)),
        OutputFormat::Json => print_json(&result)?,
    }

    Ok(())
}

/// A single open cell holding one system robot.
fn scratch_world(robot: RobotId) -> Result<World, CliError> {
    let grid = Grid::new(1, 1).ok_or_else(|| CliError::new("Failed to create grid"))?;
    let mut world = World::new(grid, 0);
    let mut body = Robot::new(robot, "eval", Coord::new(0, 0));
    body.system = true;
    world
        .add_robot(body)
        .map_err(|e| CliError::new(e.to_string()))?;
    Ok(world)
}
