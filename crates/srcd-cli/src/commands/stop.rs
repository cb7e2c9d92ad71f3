use super::{fail, json_pretty, EXIT_SUCCESS};
use srcd_core::Engine;

pub fn run(engine: &Engine, component: Option<&str>, all: bool, json: bool) -> Result<u8, String> {
    let removed = if all {
        match engine.stop_all() {
            Ok(removed) => removed,
            Err(e) => return fail(&e),
        }
    } else {
        let name = component.ok_or("a component name or --all is required")?;
        let resolved = engine
            .registry()
            .resolve(name)
            .map_err(|e| e.to_string())?
            .name
            .clone();
        match engine.stop(&resolved) {
            Ok(true) => vec![resolved],
            Ok(false) => Vec::new(),
            Err(e) => return fail(&e),
        }
    };

    if json {
        println!("{}", json_pretty(&serde_json::json!({ "removed": removed }))?);
    } else if removed.is_empty() {
        println!("nothing to stop");
    } else {
        for name in &removed {
            println!("removed {name}");
        }
    }
    Ok(EXIT_SUCCESS)
}
