use super::{fail, json_pretty, EXIT_SUCCESS, PROGRESS_DELAY};
use srcd_core::{Deferred, Engine};
use srcd_schema::Component;
use std::sync::mpsc;

pub fn list(engine: &Engine, json: bool) -> Result<u8, String> {
    let components: Vec<&Component> = engine.registry().iter().collect();
    if json {
        println!("{}", json_pretty(&components)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{:<22} {:<14} {:<34} DEPENDS ON", "NAME", "SHORT", "IMAGE");
    for c in components {
        println!(
            "{:<22} {:<14} {:<34} {}",
            c.name,
            c.short_name(),
            c.pinned_reference(),
            c.dependencies.join(", ")
        );
    }
    Ok(EXIT_SUCCESS)
}

pub fn install(engine: &Engine, component: &str, json: bool) -> Result<u8, String> {
    let (tx, rx) = mpsc::channel();
    let relay = (!json && console::user_attended_stderr()).then(|| {
        Deferred::new(PROGRESS_DELAY, format!("pulling images for {component}"))
            .lines(rx)
            .start(console::Term::stderr())
    });

    let result = engine.install(component, &mut |line| {
        let _ = tx.send(line.to_owned());
    });
    drop(tx);
    if let Some(relay) = relay {
        relay.cancel();
    }

    let pulled = match result {
        Ok(pulled) => pulled,
        Err(e) => return fail(&e),
    };
    if json {
        println!("{}", json_pretty(&serde_json::json!({ "pulled": pulled }))?);
    } else {
        for reference in &pulled {
            println!("pulled {reference}");
        }
    }
    Ok(EXIT_SUCCESS)
}

pub fn check_updates(engine: &Engine, json: bool) -> Result<u8, String> {
    let updates = match engine.check_updates() {
        Ok(updates) => updates,
        Err(e) => return fail(&e),
    };
    if json {
        println!("{}", json_pretty(&updates)?);
        return Ok(EXIT_SUCCESS);
    }

    println!("{:<22} {:<18} {:<18} NOTE", "NAME", "CURRENT", "COMPATIBLE");
    for update in &updates {
        let note = if update.compatible.has_breaking_update {
            console::style("newer incompatible release available")
                .yellow()
                .to_string()
        } else {
            String::new()
        };
        println!(
            "{:<22} {:<18} {:<18} {note}",
            update.name, update.current, update.compatible.tag
        );
    }
    Ok(EXIT_SUCCESS)
}
