use crate::backend::{ContainerRuntime, ContainerState};
use crate::RuntimeError;
use tracing::debug;

/// What `info_or_start` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadyRunning,
    Started,
}

/// Return the state of `name`, starting it with `start` if it is not running.
///
/// A running container is returned without side effects. Otherwise `start`
/// is invoked and the container is queried again; a failure in either step
/// is wrapped as [`RuntimeError::StartFailed`].
pub fn info_or_start<F>(
    runtime: &dyn ContainerRuntime,
    name: &str,
    start: F,
) -> Result<(ContainerState, Outcome), RuntimeError>
where
    F: FnOnce() -> Result<(), RuntimeError>,
{
    match runtime.info(name) {
        Ok(state) if state.running => {
            debug!("{name} already running ({})", state.short_id());
            return Ok((state, Outcome::AlreadyRunning));
        }
        Ok(_) => debug!("{name} exists but is stopped, recreating"),
        Err(RuntimeError::NotFound(_)) => debug!("{name} not found, creating"),
        Err(e) => return Err(e),
    }

    let wrap = |source: RuntimeError| RuntimeError::StartFailed {
        name: name.to_owned(),
        source: Box::new(source),
    };
    start().map_err(wrap)?;
    let state = runtime.info(name).map_err(wrap)?;
    Ok((state, Outcome::Started))
}

/// Force-remove `name`; `Ok(false)` when there was nothing to remove.
pub fn kill_if_exists(runtime: &dyn ContainerRuntime, name: &str) -> Result<bool, RuntimeError> {
    match runtime.kill(name) {
        Ok(()) => Ok(true),
        Err(RuntimeError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;
    use crate::spec::StartSpec;
    use std::cell::Cell;

    #[test]
    fn running_container_is_not_started_again() {
        let runtime = MockRuntime::new();
        runtime.seed_running("srcd-cli-bblfshd", "bblfsh/bblfshd:v2.14.0-drivers");

        let called = Cell::new(false);
        let (state, outcome) = info_or_start(&runtime, "srcd-cli-bblfshd", || {
            called.set(true);
            Ok(())
        })
        .unwrap();

        assert!(!called.get());
        assert_eq!(outcome, Outcome::AlreadyRunning);
        assert!(state.running);
    }

    #[test]
    fn missing_container_is_started_and_requeried() {
        let runtime = MockRuntime::new();
        let spec = StartSpec::new("srcd-cli-gitbase", "srcd/gitbase:v0.24.0-rc2");

        let (state, outcome) = info_or_start(&runtime, &spec.name, || {
            runtime.start(&spec).map(|_| ())
        })
        .unwrap();

        assert_eq!(outcome, Outcome::Started);
        assert!(state.has_name("srcd-cli-gitbase"));
        assert_eq!(runtime.start_count("srcd-cli-gitbase"), 1);
    }

    #[test]
    fn start_failure_is_wrapped_with_name() {
        let runtime = MockRuntime::new();
        let err = info_or_start(&runtime, "srcd-cli-gitbase", || {
            Err(RuntimeError::ExecFailed("image pull failed".to_owned()))
        })
        .unwrap_err();

        assert!(matches!(err, RuntimeError::StartFailed { ref name, .. } if name == "srcd-cli-gitbase"));
        assert!(err.to_string().starts_with("could not create srcd-cli-gitbase"));
    }

    #[test]
    fn start_without_container_fails_requery() {
        // start "succeeds" but nothing was created
        let runtime = MockRuntime::new();
        let err = info_or_start(&runtime, "srcd-cli-gitbase", || Ok(())).unwrap_err();
        match err {
            RuntimeError::StartFailed { source, .. } => assert!(source.is_not_found()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stopped_container_is_restarted() {
        let runtime = MockRuntime::new();
        runtime.seed_stopped("srcd-cli-gitbase", "srcd/gitbase:v0.24.0-rc2");
        let spec = StartSpec::new("srcd-cli-gitbase", "srcd/gitbase:v0.24.0-rc2");

        let (state, outcome) = info_or_start(&runtime, &spec.name, || {
            runtime.start(&spec).map(|_| ())
        })
        .unwrap();
        assert_eq!(outcome, Outcome::Started);
        assert!(state.running);
    }

    #[test]
    fn kill_if_exists_tolerates_absence() {
        let runtime = MockRuntime::new();
        assert!(!kill_if_exists(&runtime, "srcd-cli-gitbase").unwrap());
        runtime.seed_running("srcd-cli-gitbase", "srcd/gitbase:v0.24.0-rc2");
        assert!(kill_if_exists(&runtime, "srcd-cli-gitbase").unwrap());
        assert!(runtime.info("srcd-cli-gitbase").unwrap_err().is_not_found());
    }
}
