use crate::backend::ContainerRuntime;
use crate::docker::DockerBackend;
use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Check prerequisites for the docker backend.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_docker_prereqs() -> Vec<MissingPrereq> {
    check_prereqs(&DockerBackend::new())
}

fn check_prereqs(backend: &DockerBackend) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists(backend.binary()) {
        missing.push(MissingPrereq {
            name: "docker",
            purpose: "container runtime client",
            install_hint: "https://docs.docker.com/install/",
        });
    } else if !backend.available() {
        missing.push(MissingPrereq {
            name: "docker daemon",
            purpose: "running component containers",
            install_hint: "start the daemon (systemctl start docker) and check DOCKER_HOST",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nsrcd runs every component as a docker container.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "docker",
            purpose: "container runtime client",
            install_hint: "https://docs.docker.com/install/",
        };
        let s = m.to_string();
        assert!(s.starts_with("  - docker: container runtime client"));
        assert!(s.contains("docs.docker.com"));
    }

    #[cfg(unix)]
    #[test]
    fn hung_daemon_is_reported_within_query_timeout() {
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let client = crate::docker::testing::fake_client(dir.path(), "sleep 3\n");
        let backend = DockerBackend::with_binary(&client)
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));
        let started = Instant::now();
        let missing = check_prereqs(&backend);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "docker daemon");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn missing_client_is_reported() {
        let backend = DockerBackend::with_binary("srcd-test-no-such-docker-binary");
        let missing = check_prereqs(&backend);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "docker");
    }

    #[test]
    fn format_missing_lists_every_item() {
        let items = vec![
            MissingPrereq {
                name: "docker",
                purpose: "client",
                install_hint: "install docker",
            },
            MissingPrereq {
                name: "docker daemon",
                purpose: "containers",
                install_hint: "systemctl start docker",
            },
        ];
        let output = format_missing(&items);
        assert!(output.starts_with("missing prerequisites:"));
        assert!(output.contains("docker daemon"));
        assert!(output.contains("systemctl start docker"));
    }
}
