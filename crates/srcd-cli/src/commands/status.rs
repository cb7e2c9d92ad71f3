use super::{colorize_state, fail, json_pretty, EXIT_SUCCESS};
use srcd_core::{ComponentStatus, Engine};

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let statuses = match engine.status() {
        Ok(statuses) => statuses,
        Err(e) => return fail(&e),
    };

    if json {
        println!("{}", json_pretty(&statuses)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{:<22} {:<9} {:<32} PORTS", "NAME", "STATE", "IMAGE");
    for status in &statuses {
        let state = state_label(status);
        let (image, ports) = match &status.container {
            Some(c) => (
                c.image.clone(),
                c.ports
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            None => (status.image.clone(), String::new()),
        };
        // escape codes would break width formatting
        let padding = " ".repeat(9 - state.len());
        println!(
            "{:<22} {}{padding} {image:<32} {ports}",
            status.name,
            colorize_state(state)
        );
    }
    Ok(EXIT_SUCCESS)
}

fn state_label(status: &ComponentStatus) -> &'static str {
    match &status.container {
        Some(c) if c.running => "running",
        Some(_) => "stopped",
        None => "absent",
    }
}
