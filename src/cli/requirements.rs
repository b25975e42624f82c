//! Requirements command implementation.

use super::{print_json, read_program, CliError, OutputFormat};
use std::path::Path;
use swarm::Requirements;

/// Execute the requirements command.
///
/// # Errors
///
/// Returns an error if the program cannot be loaded.
pub(crate) fn execute(program: &Path, format: OutputFormat) -> Result<(), CliError> {
    let program = read_program(program)?;

    match format {
        OutputFormat::Text => print!("{}", format_requirements(&program.requirements)),
        OutputFormat::Json => print_json(&program.requirements)?,
    }

    Ok(())
}

fn format_requirements(reqs: &Requirements) -> String {
    if reqs.is_empty() {
        return "No requirements\n".to_string();
    }

    let mut output = String::new();
    if !reqs.capabilities.is_empty() {
        let names: Vec<&str> = reqs.capabilities.iter().map(|c| c.name()).collect();
        output.push_str(&format!("Capabilities: {}\n", names.join(", ")));
    }
    if !reqs.devices.is_empty() {
        let names: Vec<&str> = reqs.devices.iter().map(String::as_str).collect();
        output.push_str(&format!("Devices: {}\n", names.join(", ")));
    }
    if !reqs.inventory.is_empty() {
        let items: Vec<String> = reqs
            .inventory
            .iter()
            .map(|(item, n)| format!("{item} x{n}"))
            .collect();
        output.push_str(&format!("Inventory: {}\n", items.join(", ")));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm::{Capability, Const, Program, Term};

    #[test]
    fn test_format_requirements() {
        let program = Program::new(Term::block([
            Term::Const(Const::Move),
            Term::call(Const::Place, [Term::text("rock")]),
        ]));
        let text = format_requirements(&program.requirements);
        assert!(text.contains("Capabilities: "));
        assert!(text.contains(Capability::Move.name()));
        assert!(text.contains("Inventory: rock x1"));

        assert_eq!(format_requirements(&Requirements::default()), "No requirements\n");
    }
}
