//! Determinism command implementation.
//!
//! Runs the same session several times in parallel and checks that every
//! run ends in the same world with the same per-tick reports and logs.

use super::{CliError, OutputFormat, print_json};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use swarm::context::LogEntry;
use swarm::{RobotId, SessionFile, TickReport, World};

/// Everything observable about one run.
#[derive(Debug, PartialEq)]
struct Trace {
    world: World,
    reports: Vec<TickReport>,
    logs: Vec<(RobotId, u64, Vec<LogEntry>)>,
}

impl Trace {
    fn record(file: &SessionFile, ticks: u64) -> Result<Self, String> {
        let mut session = file.build().map_err(|e| e.to_string())?;
        let reports = session.scheduler.run_ticks(&mut session.world, ticks);
        let logs = session
            .scheduler
            .contexts()
            .map(|ctx| (ctx.id(), ctx.total_steps(), ctx.log().to_vec()))
            .collect();
        Ok(Self {
            world: session.world,
            reports,
            logs,
        })
    }
}

#[derive(Debug, Serialize)]
struct JsonDeterminismResult {
    runs: usize,
    ticks: u64,
    deterministic: bool,
    divergent_runs: Vec<usize>,
    total_steps: u64,
    duration_secs: f64,
}

/// Execute the determinism command.
///
/// # Errors
///
/// Returns an error if the session cannot be loaded or any run diverges.
pub(crate) fn execute(
    session: &Path,
    runs: usize,
    ticks: u64,
    threads: Option<usize>,
    format: OutputFormat,
    progress: bool,
) -> Result<(), CliError> {
    let file = SessionFile::load(session)?;
    // Fail early on layout errors instead of once per run.
    file.build()?;

    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .ok(); // Ignore error if already initialized
    }

    let pb = if progress {
        let pb = ProgressBar::new(runs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let traces: Vec<Result<Trace, String>> = (0..runs)
        .into_par_iter()
        .map(|_| {
            let trace = Trace::record(&file, ticks);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            trace
        })
        .collect();
    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }
    let duration = start.elapsed();

    let traces = traces
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(CliError::new)?;
    let Some(baseline) = traces.first() else {
        return Err(CliError::new("At least one run is required"));
    };
    let divergent_runs: Vec<usize> = traces
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, trace)| *trace != baseline)
        .map(|(i, _)| i)
        .collect();

    let result = JsonDeterminismResult {
        runs,
        ticks,
        deterministic: divergent_runs.is_empty(),
        divergent_runs,
        total_steps: baseline.reports.iter().map(TickReport::total_steps).sum(),
        duration_secs: duration.as_secs_f64(),
    };

    match format {
        OutputFormat::Text => {
            println!(
                "{} runs x {} ticks, {} steps per run",
                result.runs, result.ticks, result.total_steps
            );
            println!("Duration: {:.2}s", result.duration_secs);
            if result.deterministic {
                println!("All runs identical");
            } else {
                println!("Divergent runs: {:?}", result.divergent_runs);
            }
        }
        OutputFormat::Json => print_json(&result)?,
    }

    if result.deterministic {
        Ok(())
    } else {
        Err(CliError::new(format!(
            "{} of {runs} runs diverged from the first",
            result.divergent_runs.len()
        )))
    }
}
