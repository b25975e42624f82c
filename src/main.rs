//! Swarm CLI - Command-line interface for running and inspecting robot sessions.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Swarm - A deterministic execution core for robot-programming games
#[derive(Parser, Debug)]
#[command(name = "swarm")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a session until every robot is idle
    Run {
        /// Session file (JSON)
        #[arg(required = true)]
        session: PathBuf,

        /// Maximum ticks (default: 1000)
        #[arg(short, long, default_value = "1000")]
        ticks: u64,

        /// Machine steps per robot per tick (default: from session)
        #[arg(long)]
        fuel: Option<u64>,

        /// Random seed (default: from session)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Suppress the header line
        #[arg(short, long)]
        quiet: bool,
    },

    /// Evaluate a program hypothetically, without touching any world
    Eval {
        /// Program file (JSON term)
        #[arg(required = true)]
        program: PathBuf,

        /// Evaluate against this session's starting world
        #[arg(long)]
        session: Option<PathBuf>,

        /// Robot whose view to use (default: 1)
        #[arg(short, long, default_value = "1")]
        robot: u64,

        /// Maximum machine steps (default: 100000)
        #[arg(long, default_value = "100000")]
        max_steps: u64,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,
    },

    /// Print the capabilities, devices and items a program needs
    Requirements {
        /// Program file (JSON term)
        #[arg(required = true)]
        program: PathBuf,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,
    },

    /// Run a session repeatedly in parallel and check all runs agree
    Determinism {
        /// Session file (JSON)
        #[arg(required = true)]
        session: PathBuf,

        /// Number of runs (default: 8)
        #[arg(short, long, default_value = "8")]
        runs: usize,

        /// Ticks per run (default: 200)
        #[arg(short, long, default_value = "200")]
        ticks: u64,

        /// Parallel threads (default: CPU count)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swarm=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Run {
            session,
            ticks,
            fuel,
            seed,
            format,
            quiet,
        } => cli::run::execute(&session, ticks, fuel, seed, format, quiet),

        Commands::Eval {
            program,
            session,
            robot,
            max_steps,
            format,
        } => cli::eval::execute(&program, session.as_deref(), robot, max_steps, format),

        Commands::Requirements { program, format } => cli::requirements::execute(&program, format),

        Commands::Determinism {
            session,
            runs,
            ticks,
            threads,
            format,
            progress,
        } => cli::determinism::execute(&session, runs, ticks, threads, format, progress),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
