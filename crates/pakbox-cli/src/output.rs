//! Formatted output helpers for CLI commands.

use pakbox_common::error::Violation;

const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Prints one line of command output to stdout.
#[allow(clippy::print_stdout)]
pub fn print_line(line: &str) {
    println!("{line}");
}

/// Prints every violation to stderr, one per line.
#[allow(clippy::print_stderr)]
pub fn print_violations(violations: &[Violation]) {
    eprintln!("{BOLD}{} violation(s):{RESET}", violations.len());
    for line in format_violations(violations) {
        eprintln!("  {RED}✗{RESET} {line}");
    }
}

/// Renders violations as `field: value (reason)` lines.
#[must_use]
pub fn format_violations(violations: &[Violation]) -> Vec<String> {
    violations
        .iter()
        .map(|v| format!("{}: {:?} ({})", v.field, v.value, v.reason))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_violations_names_field_and_value() {
        let lines = format_violations(&[Violation {
            field: "env",
            value: "NOVALUE".into(),
            reason: "expected KEY=VALUE".into(),
        }]);
        assert_eq!(lines, vec![r#"env: "NOVALUE" (expected KEY=VALUE)"#]);
    }
}
