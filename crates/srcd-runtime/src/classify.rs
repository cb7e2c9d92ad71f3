//! Structured errors from docker daemon diagnostics.
//!
//! The daemon only reports failures as text, so this module is the single
//! place that knows its message format. Nothing else should match on runtime
//! error strings.

use crate::RuntimeError;

const DAEMON_MARKER: &str = "Error response from daemon";
const ENDPOINT_MARKER: &str = "on endpoint ";
const BIND_PREFIX: &str = "Bind for ";
const BIND_SUFFIX: &str = " failed: port is already allocated";

/// Turn a runtime error into a structured one when its text is a daemon
/// diagnostic; anything else passes through unchanged.
pub fn classify(err: RuntimeError) -> RuntimeError {
    let message = err.to_string();
    if !message.contains(DAEMON_MARKER) {
        return err;
    }

    let service = endpoint_name(&message);
    if let Some((host, port)) = bind_address(&message) {
        return RuntimeError::BindConflict {
            host: host.to_owned(),
            port: port.to_owned(),
            service: service.unwrap_or("unknown service").to_owned(),
        };
    }

    RuntimeError::Daemon {
        service: service.map(str::to_owned),
        message,
    }
}

/// `... on endpoint srcd-cli-bblfshd (4d1c...) ...` → `srcd-cli-bblfshd`
fn endpoint_name(message: &str) -> Option<&str> {
    let start = message.find(ENDPOINT_MARKER)? + ENDPOINT_MARKER.len();
    let rest = &message[start..];
    let name = rest.split_whitespace().next()?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// `Bind for 0.0.0.0:9432 failed: port is already allocated` → `("0.0.0.0", "9432")`
fn bind_address(message: &str) -> Option<(&str, &str)> {
    let start = message.find(BIND_PREFIX)? + BIND_PREFIX.len();
    let rest = &message[start..];
    let end = rest.find(BIND_SUFFIX)?;
    let (host, port) = rest[..end].rsplit_once(':')?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((host, port))
}
