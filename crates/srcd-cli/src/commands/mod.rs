pub mod completions;
pub mod components;
pub mod doctor;
pub mod start;
pub mod status;
pub mod stop;

use srcd_core::{CoreError, Deferred, DeferredHandle, DEFAULT_SPIN_INTERVAL};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_PORT_CONFLICT: u8 = 3;

/// Fast operations finish before any progress output appears.
pub const PROGRESS_DELAY: Duration = Duration::from_millis(500);

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Error text for the user, with the hint appended when there is one.
pub fn describe(err: &CoreError) -> String {
    match err.hint() {
        Some(hint) => format!("{err}\nhint: {hint}"),
        None => err.to_string(),
    }
}

/// Map an engine error to an exit code, printing it when it has its own code.
pub fn fail(err: &CoreError) -> Result<u8, String> {
    if err.is_bind_conflict() {
        eprintln!("error: {}", describe(err));
        return Ok(EXIT_PORT_CONFLICT);
    }
    Err(describe(err))
}

/// Spinner on stderr, only for interactive terminals.
pub fn spinner(message: &str, json: bool) -> Option<DeferredHandle> {
    if json || !console::user_attended_stderr() {
        return None;
    }
    Some(
        Deferred::new(PROGRESS_DELAY, message)
            .spinner(DEFAULT_SPIN_INTERVAL)
            .start(console::Term::stderr()),
    )
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "running" => Style::new().green().bold().apply_to(state).to_string(),
        "stopped" => Style::new().yellow().apply_to(state).to_string(),
        "absent" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}
