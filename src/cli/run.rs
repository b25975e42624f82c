//! Run command implementation.

use super::output::{format_run_text, JsonRunResult};
use super::{print_json, CliError, OutputFormat};
use std::path::Path;
use swarm::SessionFile;

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the session cannot be loaded.
pub(crate) fn execute(
    session: &Path,
    ticks: u64,
    fuel: Option<u64>,
    seed: Option<u64>,
    format: OutputFormat,
    quiet: bool,
) -> Result<(), CliError> {
    let mut file = SessionFile::load(session)?;
    if let Some(fuel) = fuel {
        file.config.fuel_per_tick = fuel;
    }
    if let Some(seed) = seed {
        file.seed = seed;
    }
    let mut state = file.build()?;

    if !quiet && format == OutputFormat::Text {
        println!(
            "Running {} robots for up to {ticks} ticks (seed {}, fuel {})...",
            file.robots.len(),
            file.seed,
            file.config.fuel_per_tick
        );
        println!();
    }

    let reports = state.scheduler.run_until_idle(&mut state.world, ticks);
    let result = JsonRunResult::new(&reports, state.scheduler.contexts(), &state.world);

    match format {
        OutputFormat::Text => print!("{}", format_run_text(&result)),
        OutputFormat::Json => print_json(&result)?,
    }

    Ok(())
}
