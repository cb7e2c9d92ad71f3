use super::{fail, json_pretty, spinner, EXIT_SUCCESS};
use srcd_core::Engine;

pub fn run(engine: &Engine, component: &str, json: bool) -> Result<u8, String> {
    let progress = spinner(&format!("starting {component}"), json);
    let result = engine.ensure_running(component);
    if let Some(progress) = progress {
        progress.cancel();
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => return fail(&e),
    };

    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    for name in &report.started {
        println!("started {name}");
    }
    for name in &report.reused {
        println!("{name} already running");
    }
    let ports: Vec<String> = report.state.ports.iter().map(ToString::to_string).collect();
    if ports.is_empty() {
        println!("{} is running", report.component);
    } else {
        println!("{} is running on {}", report.component, ports.join(", "));
    }
    Ok(EXIT_SUCCESS)
}
