//! Human-readable terminal output
//!
//! Status lines for problems go to stderr so a failed run still leaves stdout
//! parseable.

use console::{style, StyledObject};
use provisio_core::breaker::{BreakerSnapshot, CircuitState};

pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Section title, preceded by a blank line
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Closed is green, half-open yellow, open red
fn state_style(state: CircuitState) -> StyledObject<String> {
    let styled = style(state.to_string());
    match state {
        CircuitState::Closed => styled.green(),
        CircuitState::HalfOpen => styled.yellow(),
        CircuitState::Open => styled.red().bold(),
    }
}

/// One line per breaker: coloured state followed by its counters
pub fn breaker(snapshot: &BreakerSnapshot) {
    println!(
        "  {}: {} {}",
        style(&snapshot.name).dim(),
        state_style(snapshot.state),
        style(format!(
            "(failures {}, opened {} time(s), rejected {})",
            snapshot.failure_count, snapshot.times_opened, snapshot.rejected_calls
        ))
        .dim()
    );
}
