//! Output formatting utilities for CLI.

use std::fmt::Write;

use serde::Serialize;
use swarm::{HypotheticalOutcome, RobotContext, Status, TickReport, World, WorldView};

/// JSON-serializable summary of one robot at the end of a run.
#[derive(Debug, Serialize)]
pub(super) struct JsonRobot {
    /// Robot id.
    pub(super) id: u64,
    /// Robot name, if its body still exists.
    pub(super) name: Option<String>,
    /// Final status.
    pub(super) status: Status,
    /// Transitions taken over the whole run.
    pub(super) steps: u64,
    /// Final cell as `[x, y]`, if its body still exists.
    pub(super) location: Option<[u16; 2]>,
    /// Log lines, oldest first.
    pub(super) log: Vec<String>,
}

/// JSON-serializable result of the `run` command.
#[derive(Debug, Serialize)]
pub(super) struct JsonRunResult {
    /// Ticks executed.
    pub(super) ticks: u64,
    /// Total transitions across all robots.
    pub(super) steps: u64,
    /// Robots built during the run.
    pub(super) built: usize,
    /// Robots removed during the run.
    pub(super) removed: usize,
    /// Per-robot summaries.
    pub(super) robots: Vec<JsonRobot>,
}

impl JsonRobot {
    /// Summarize a context against the final world.
    pub(super) fn from_context(ctx: &RobotContext, world: &World) -> Self {
        let body = world.robot(ctx.id());
        Self {
            id: ctx.id(),
            name: body.map(|r| r.name.clone()),
            status: ctx.status(),
            steps: ctx.total_steps(),
            location: body.map(|r| [r.location.x, r.location.y]),
            log: ctx.log().iter().map(|entry| entry.text.clone()).collect(),
        }
    }
}

impl JsonRunResult {
    /// Build from the tick reports and final contexts.
    pub(super) fn new<'a>(
        reports: &[TickReport],
        contexts: impl Iterator<Item = &'a RobotContext>,
        world: &World,
    ) -> Self {
        Self {
            ticks: reports.len() as u64,
            steps: reports.iter().map(TickReport::total_steps).sum(),
            built: reports.iter().map(|r| r.spawned.len()).sum(),
            removed: reports.iter().map(|r| r.removed.len()).sum(),
            robots: contexts.map(|ctx| JsonRobot::from_context(ctx, world)).collect(),
        }
    }
}

/// Short label for a status.
pub(super) fn status_label(status: Status) -> String {
    match status {
        Status::Active => "active".to_string(),
        Status::Waiting(until) => format!("waiting until tick {until}"),
        Status::Done => "done".to_string(),
        Status::Errored => "errored".to_string(),
    }
}

/// Format a run result as human-readable text.
pub(super) fn format_run_text(result: &JsonRunResult) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "Ran {} ticks, {} steps ({} built, {} removed)",
        result.ticks, result.steps, result.built, result.removed
    );
    for robot in &result.robots {
        let name = robot.name.as_deref().unwrap_or("<gone>");
        let _ = write!(output, "  #{} {name}: {}", robot.id, status_label(robot.status));
        if let Some([x, y]) = robot.location {
            let _ = write!(output, " at ({x}, {y})");
        }
        let _ = writeln!(output, ", {} steps", robot.steps);
        for line in &robot.log {
            let _ = writeln!(output, "    | {line}");
        }
    }

    output
}

/// JSON-serializable result of a hypothetical evaluation.
#[derive(Debug, Serialize)]
pub(super) struct JsonEvalResult {
    /// Final value, if the program finished normally.
    pub(super) value: Option<String>,
    /// Unhandled exception, if the program failed.
    pub(super) error: Option<String>,
    /// Whether the step limit was hit first.
    pub(super) unfinished: bool,
    /// Transitions taken.
    pub(super) steps: u64,
    /// Effects proposed, in order.
    pub(super) effects: Vec<String>,
}

impl JsonEvalResult {
    /// Build from a hypothetical outcome.
    pub(super) fn from_outcome(outcome: &HypotheticalOutcome, world: &dyn WorldView) -> Self {
        let (value, error) = match &outcome.result {
            Some(Ok(value)) => (Some(value.to_string()), None),
            Some(Err(exn)) => (None, Some(exn.describe(world))),
            None => (None, None),
        };
        Self {
            value,
            error,
            unfinished: outcome.result.is_none(),
            steps: outcome.steps,
            effects: outcome.effects.iter().map(|e| format!("{e:?}")).collect(),
        }
    }
}

/// Format an evaluation result as human-readable text.
pub(super) fn format_eval_text(result: &JsonEvalResult) -> String {
    let mut output = String::new();

    match (&result.value, &result.error) {
        (Some(value), _) => {
            let _ = writeln!(output, "{value}");
        }
        (_, Some(error)) => {
            let _ = writeln!(output, "error: {error}");
        }
        _ => {
            let _ = writeln!(output, "unfinished after {} steps", result.steps);
        }
    }
    for effect in &result.effects {
        let _ = writeln!(output, "  effect: {effect}");
    }

    output
}
