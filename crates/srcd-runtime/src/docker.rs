use crate::backend::{ContainerRuntime, ContainerState, PortBinding};
use crate::spec::StartSpec;
use crate::RuntimeError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Bound for state queries (`inspect`, `ps`, `rm`, `network`).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound for `docker run`, which may have to pull the image first.
pub const START_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runtime backend driving the `docker` command-line client.
pub struct DockerBackend {
    binary: String,
    query_timeout: Duration,
    start_timeout: Duration,
}

impl Default for DockerBackend {
    fn default() -> Self {
        Self {
            binary: "docker".to_owned(),
            query_timeout: QUERY_TIMEOUT,
            start_timeout: START_TIMEOUT,
        }
    }
}

impl DockerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different client binary (e.g. `podman`, which accepts the same
    /// arguments).
    pub fn with_binary(binary: &str) -> Self {
        Self {
            binary: binary.to_owned(),
            ..Self::default()
        }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_timeouts(mut self, query: Duration, start: Duration) -> Self {
        self.query_timeout = query;
        self.start_timeout = start;
        self
    }

    pub(crate) fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    fn run(&self, args: &[&str], timeout: Duration) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.binary, args.join(" "));
        run_with_timeout(self.command(args), timeout).map_err(|e| match e {
            RuntimeError::Timeout { timeout, .. } => RuntimeError::Timeout {
                command: format!("{} {}", self.binary, args.first().copied().unwrap_or("")),
                timeout,
            },
            other => other,
        })
    }

    fn inspect(&self, ids: &[&str]) -> Result<Vec<ContainerState>, RuntimeError> {
        let mut args = vec!["inspect", "--type", "container"];
        args.extend_from_slice(ids);
        let output = self.run(&args, self.query_timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("no such container") {
                return Err(RuntimeError::NotFound(ids.join(" ")));
            }
            return Err(failure("inspect", &stderr));
        }
        parse_inspect(&output.stdout)
    }

    /// Inspect ids one by one, skipping those that no longer exist.
    fn inspect_each(&self, ids: &[&str]) -> Result<Vec<ContainerState>, RuntimeError> {
        let mut states = Vec::new();
        for id in ids {
            match self.inspect(&[id]) {
                Ok(found) => states.extend(found),
                Err(RuntimeError::NotFound(_)) => debug!("container {id} disappeared"),
                Err(e) => return Err(e),
            }
        }
        Ok(states)
    }
}

impl ContainerRuntime for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        self.run(&["version", "--format", "{{.Server.Version}}"], self.query_timeout)
            .is_ok_and(|o| o.status.success())
    }

    fn info(&self, name: &str) -> Result<ContainerState, RuntimeError> {
        self.inspect(&[name])?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::NotFound(name.to_owned()))
    }

    fn start(&self, spec: &StartSpec) -> Result<String, RuntimeError> {
        // An exited container still owns the name.
        match self.kill(&spec.name) {
            Ok(()) => debug!("removed stale container {}", spec.name),
            Err(RuntimeError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let args = run_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs, self.start_timeout)?;
        if !output.status.success() {
            return Err(failure("run", &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    fn kill(&self, name: &str) -> Result<(), RuntimeError> {
        let output = self.run(&["rm", "--force", name], self.query_timeout)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.to_lowercase().contains("no such container") {
            return Err(RuntimeError::NotFound(name.to_owned()));
        }
        Err(failure("rm", &stderr))
    }

    fn list(&self) -> Result<Vec<ContainerState>, RuntimeError> {
        let output = self.run(&["ps", "--all", "--quiet", "--no-trunc"], self.query_timeout)?;
        if !output.status.success() {
            return Err(failure("ps", &String::from_utf8_lossy(&output.stderr)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let ids: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        match self.inspect(&ids) {
            // removed between `ps` and `inspect`
            Err(RuntimeError::NotFound(_)) => self.inspect_each(&ids),
            other => other,
        }
    }

    fn ensure_network(&self, name: &str) -> Result<(), RuntimeError> {
        let output = self.run(&["network", "inspect", name], self.query_timeout)?;
        if output.status.success() {
            return Ok(());
        }
        let output = self.run(&["network", "create", name], self.query_timeout)?;
        if output.status.success() {
            debug!("created network {name}");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        // lost a race with another invocation
        if stderr.contains("already exists") {
            return Ok(());
        }
        Err(failure("network create", &stderr))
    }

    fn pull(&self, image: &str, on_line: &mut dyn FnMut(&str)) -> Result<(), RuntimeError> {
        debug!("{} pull {image}", self.binary);
        let mut child = self
            .command(&["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || read_to_end(stderr));
        let stdout = child.stdout.take();
        let (tx, lines) = mpsc::channel::<String>();
        let stdout_reader = std::thread::spawn(move || {
            if let Some(stdout) = stdout {
                for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        });

        let deadline = Instant::now() + self.start_timeout;
        let status = loop {
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(line) => on_line(line.trim_end()),
                Err(RecvTimeoutError::Timeout) => {}
                // stdout closed; keep polling for the exit status
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(POLL_INTERVAL),
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    kill_and_reap(&mut child);
                    return Err(e.into());
                }
            }
            if Instant::now() >= deadline {
                kill_and_reap(&mut child);
                return Err(RuntimeError::Timeout {
                    command: format!("{} pull", self.binary),
                    timeout: self.start_timeout,
                });
            }
        };

        let _ = stdout_reader.join();
        for line in lines.try_iter() {
            on_line(line.trim_end());
        }
        let stderr = stderr_reader.join().unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(failure("pull", &String::from_utf8_lossy(&stderr)))
        }
    }
}

fn failure(what: &str, stderr: &str) -> RuntimeError {
    RuntimeError::ExecFailed(format!("docker {what} failed: {}", stderr.trim()))
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn read_to_end<R: Read>(source: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut source) = source {
        let _ = source.read_to_end(&mut buf);
    }
    buf
}

/// Run a command to completion, killing it once `timeout` has elapsed.
///
/// Output pipes are drained on helper threads so a chatty child cannot
/// block on a full pipe while we poll for its exit.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Output, RuntimeError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = std::thread::spawn(move || read_to_end(stdout));
    let stderr_reader = std::thread::spawn(move || read_to_end(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(e.into());
            }
        }
        if Instant::now() >= deadline {
            kill_and_reap(&mut child);
            return Err(RuntimeError::Timeout {
                command: program,
                timeout,
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    })
}

/// Arguments for `docker run` that create and start `spec` detached.
pub fn run_args(spec: &StartSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_owned(),
        "--detach".to_owned(),
        "--name".to_owned(),
        spec.name.clone(),
    ];
    if let Some(network) = &spec.network {
        args.push("--network".to_owned());
        args.push(network.clone());
    }
    if spec.privileged {
        args.push("--privileged".to_owned());
    }
    if let Some(cpus) = spec.cpus {
        args.push("--cpus".to_owned());
        args.push(format!("{cpus:.2}"));
    }
    for (key, value) in &spec.env {
        args.push("--env".to_owned());
        args.push(format!("{key}={value}"));
    }
    for port in &spec.ports {
        args.push("--publish".to_owned());
        args.push(format!("{}:{}", port.host_port, port.container_port));
    }
    for mount in &spec.mounts {
        args.push("--volume".to_owned());
        if mount.read_only {
            args.push(format!("{}:{}:ro", mount.source, mount.target));
        } else {
            args.push(format!("{}:{}", mount.source, mount.target));
        }
    }
    for (key, value) in &spec.labels {
        args.push("--label".to_owned());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    name: String,
    created: Option<String>,
    config: InspectConfig,
    state: InspectState,
    network_settings: Option<InspectNetwork>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(default)]
    ports: Option<BTreeMap<String, Option<Vec<InspectHostPort>>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostPort {
    host_ip: String,
    host_port: String,
}

/// Parse the JSON array printed by `docker inspect`.
pub fn parse_inspect(stdout: &[u8]) -> Result<Vec<ContainerState>, RuntimeError> {
    let entries: Vec<InspectEntry> = serde_json::from_slice(stdout)
        .map_err(|e| RuntimeError::Parse(format!("docker inspect output: {e}")))?;

    entries
        .into_iter()
        .map(|entry| {
            let ports = match entry.network_settings.and_then(|n| n.ports) {
                Some(ports) => parse_ports(ports)?,
                None => Vec::new(),
            };
            let created = entry
                .created
                .as_deref()
                .and_then(|c| chrono::DateTime::parse_from_rfc3339(c).ok())
                .map(|c| c.with_timezone(&chrono::Utc));
            Ok(ContainerState {
                id: entry.id,
                names: vec![entry.name.trim_start_matches('/').to_owned()],
                image: entry.config.image,
                ports,
                running: entry.state.running,
                created,
            })
        })
        .collect()
}

fn parse_ports(
    ports: BTreeMap<String, Option<Vec<InspectHostPort>>>,
) -> Result<Vec<PortBinding>, RuntimeError> {
    let mut bindings = Vec::new();
    for (key, hosts) in ports {
        let (port, protocol) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
        let container_port: u16 = port
            .parse()
            .map_err(|_| RuntimeError::Parse(format!("invalid container port '{key}'")))?;
        for host in hosts.unwrap_or_default() {
            let host_port: u16 = host.host_port.parse().map_err(|_| {
                RuntimeError::Parse(format!("invalid host port '{}'", host.host_port))
            })?;
            bindings.push(PortBinding {
                host_ip: host.host_ip,
                host_port,
                container_port,
                protocol: protocol.to_owned(),
            });
        }
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSPECT_RUNNING: &str = r#"[
  {
    "Id": "9f0c2d3e4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0",
    "Created": "2019-03-14T10:21:05.123456789Z",
    "Name": "/srcd-cli-gitbase",
    "State": { "Status": "running", "Running": true, "Pid": 4242 },
    "Config": { "Image": "srcd/gitbase:v0.24.0-rc2" },
    "NetworkSettings": {
      "Ports": {
        "3306/tcp": [ { "HostIp": "0.0.0.0", "HostPort": "3306" } ],
        "8080/tcp": null
      }
    }
  }
]"#;

    #[test]
    fn parse_running_container() {
        let states = parse_inspect(INSPECT_RUNNING.as_bytes()).unwrap();
        assert_eq!(states.len(), 1);
        let state = &states[0];
        assert_eq!(state.names, vec!["srcd-cli-gitbase"]);
        assert_eq!(state.image, "srcd/gitbase:v0.24.0-rc2");
        assert!(state.running);
        assert_eq!(state.ports.len(), 1);
        assert_eq!(state.ports[0].host_port, 3306);
        assert_eq!(state.ports[0].protocol, "tcp");
        assert!(state.created.is_some());
    }

    #[test]
    fn parse_exited_container_without_network() {
        let json = r#"[{"Id":"abc","Name":"/srcd-cli-bblfshd","State":{"Running":false},
            "Config":{"Image":"bblfsh/bblfshd:v2.14.0-drivers"}}]"#;
        let states = parse_inspect(json.as_bytes()).unwrap();
        assert!(!states[0].running);
        assert!(states[0].ports.is_empty());
        assert!(states[0].created.is_none());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse_inspect(b"not json"),
            Err(RuntimeError::Parse(_))
        ));
    }

    #[test]
    fn run_args_cover_spec() {
        let spec = StartSpec::new("srcd-cli-gitbase", "srcd/gitbase:v0.24.0-rc2")
            .network("srcd-cli-network")
            .cpus(3.6)
            .env("BBLFSH_ENDPOINT", "srcd-cli-bblfshd:9432")
            .port(3306, 3306)
            .mount("/home/me/repos", "/opt/repos", true)
            .mount("srcd-cli-gitbase-index", "/var/lib/gitbase/index", false)
            .label("srcd-cli", "true")
            .arg("--verbose");
        let args = run_args(&spec);
        let joined = args.join(" ");
        assert!(joined.starts_with("run --detach --name srcd-cli-gitbase"));
        assert!(joined.contains("--network srcd-cli-network"));
        assert!(joined.contains("--cpus 3.60"));
        assert!(joined.contains("--env BBLFSH_ENDPOINT=srcd-cli-bblfshd:9432"));
        assert!(joined.contains("--publish 3306:3306"));
        assert!(joined.contains("--volume /home/me/repos:/opt/repos:ro"));
        assert!(joined.contains("--volume srcd-cli-gitbase-index:/var/lib/gitbase/index"));
        assert!(joined.contains("--label srcd-cli=true"));
        assert!(joined.ends_with("srcd/gitbase:v0.24.0-rc2 --verbose"));
        assert!(!joined.contains("--privileged"));
    }

    #[cfg(unix)]
    #[test]
    fn run_with_timeout_collects_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);
        let output = run_with_timeout(cmd, Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn run_with_timeout_kills_slow_command() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = Instant::now();
        let err = run_with_timeout(cmd, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn pull_streams_output_lines() {
        let dir = tempfile::tempdir().unwrap();
        let client = testing::fake_client(
            dir.path(),
            "echo 'v0.24.0-rc2: Pulling from srcd/gitbase'\necho 'Status: Downloaded newer image'\n",
        );
        let backend = DockerBackend::with_binary(&client);
        let mut lines = Vec::new();
        backend
            .pull("srcd/gitbase:v0.24.0-rc2", &mut |line| lines.push(line.to_owned()))
            .unwrap();
        assert_eq!(
            lines,
            vec![
                "v0.24.0-rc2: Pulling from srcd/gitbase",
                "Status: Downloaded newer image"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn pull_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let client = testing::fake_client(dir.path(), "echo 'manifest unknown' >&2\nexit 1\n");
        let backend = DockerBackend::with_binary(&client);
        let err = backend.pull("srcd/gitbase:v9", &mut |_| {}).unwrap_err();
        assert!(
            matches!(&err, RuntimeError::ExecFailed(msg) if msg.contains("manifest unknown")),
            "{err}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn pull_is_bounded_by_start_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let client = testing::fake_client(dir.path(), "echo 'Pulling fs layer'\nsleep 3\n");
        let backend = DockerBackend::with_binary(&client)
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));
        let started = Instant::now();
        let err = backend.pull("srcd/gitbase:v1", &mut |_| {}).unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn list_skips_container_removed_after_ps() {
        let dir = tempfile::tempdir().unwrap();
        let client = testing::fake_client(
            dir.path(),
            r##"case "$1" in
  ps) printf 'aaa\nbbb\n' ;;
  inspect)
    shift 3
    for id in "$@"; do
      if [ "$id" = bbb ]; then echo "Error: No such container: bbb" >&2; exit 1; fi
    done
    echo '[{"Id":"aaa","Name":"/srcd-cli-gitbase","State":{"Running":true},"Config":{"Image":"srcd/gitbase:v0.24.0-rc2"}}]'
    ;;
esac
"##,
        );
        let states = DockerBackend::with_binary(&client).list().unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].names, vec!["srcd-cli-gitbase"]);
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let backend = DockerBackend::with_binary("srcd-test-no-such-docker-binary");
        assert!(!backend.available());
        assert!(matches!(
            backend.info("srcd-cli-gitbase"),
            Err(RuntimeError::Io(_))
        ));
    }
}

#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Write an executable shell script standing in for the docker client.
    pub(crate) fn fake_client(dir: &Path, body: &str) -> String {
        let path = dir.join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }
}
