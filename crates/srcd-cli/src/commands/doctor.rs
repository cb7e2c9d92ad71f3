use super::{EXIT_FAILURE, EXIT_SUCCESS};
use srcd_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, config_path: &Path, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    if config_path.exists() {
        checks.push(Check::pass(
            "config",
            &format!("Config loaded from {}", config_path.display()),
        ));
    } else {
        checks.push(Check::info(
            "config",
            &format!("No config at {}, using defaults", config_path.display()),
        ));
    }

    check_runtime(engine, &mut checks, &mut all_pass);
    check_containers(engine, &mut checks);

    print_results(&checks, all_pass, json_output)
}

fn check_runtime(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let runtime = engine.runtime();
    if runtime.name() == "docker" {
        let missing = srcd_runtime::check_docker_prereqs();
        if !missing.is_empty() {
            *all_pass = false;
            checks.push(Check::fail(
                "runtime_prereqs",
                &srcd_runtime::format_missing(&missing),
            ));
            return;
        }
        checks.push(Check::pass(
            "runtime_prereqs",
            "docker client installed and daemon reachable",
        ));
    }

    if runtime.available() {
        checks.push(Check::pass(
            "runtime",
            &format!("Runtime backend '{}' is available", runtime.name()),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "runtime",
            &format!("Runtime backend '{}' is not available", runtime.name()),
        ));
    }
}

fn check_containers(engine: &Engine, checks: &mut Vec<Check>) {
    match engine.status() {
        Ok(statuses) => {
            let running = statuses.iter().filter(|s| s.running).count();
            checks.push(Check::info(
                "components",
                &format!("{} components known ({running} running)", statuses.len()),
            ));
        }
        Err(e) => checks.push(Check::warn(
            "components",
            &format!("Cannot list containers: {e}"),
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("srcd doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
