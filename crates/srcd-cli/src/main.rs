mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use srcd_core::{install_signal_handler, Engine};
use srcd_schema::EngineConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "srcd",
    version,
    about = "Run the gitbase and bblfsh code analysis services as local containers"
)]
struct Cli {
    /// Path to the config file (default: ~/.srcd/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Container runtime backend, overriding the config file (docker, mock).
    #[arg(long, global = true)]
    runtime: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start a component and everything it depends on.
    Start {
        /// Component name, full (srcd-cli-gitbase) or short (gitbase).
        component: String,
    },
    /// Remove a component's container.
    Stop {
        /// Component name, full or short.
        #[arg(required_unless_present = "all")]
        component: Option<String>,
        /// Remove the containers of every known component.
        #[arg(long, default_value_t = false, conflicts_with = "component")]
        all: bool,
    },
    /// Show which components are running.
    Status,
    /// Inspect and manage the known components.
    Components {
        #[command(subcommand)]
        command: ComponentsCommand,
    },
    /// Run diagnostic checks on the configuration and container runtime.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum ComponentsCommand {
    /// List the known components and their dependencies.
    List,
    /// Pull the images a component needs.
    Install {
        /// Component name, full or short.
        component: String,
    },
    /// Look up newer compatible image tags for every component.
    CheckUpdates,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SRCD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let json = cli.json;
    let result = match cli.command {
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        command => load_config(cli.config.as_deref(), cli.runtime.as_deref())
            .and_then(|(path, config)| run(command, &path, config, json)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn run(
    command: Commands,
    config_path: &Path,
    config: EngineConfig,
    json: bool,
) -> Result<u8, String> {
    let needs_docker = config.runtime.backend == "docker"
        && matches!(
            command,
            Commands::Start { .. }
                | Commands::Components {
                    command: ComponentsCommand::Install { .. }
                }
        );
    if needs_docker && std::env::var("SRCD_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = srcd_runtime::check_docker_prereqs();
        if !missing.is_empty() {
            return Err(srcd_runtime::format_missing(&missing));
        }
    }

    let engine = Engine::new(config).map_err(|e| commands::describe(&e))?;
    match command {
        Commands::Start { component } => commands::start::run(&engine, &component, json),
        Commands::Stop { component, all } => {
            commands::stop::run(&engine, component.as_deref(), all, json)
        }
        Commands::Status => commands::status::run(&engine, json),
        Commands::Components { command } => match command {
            ComponentsCommand::List => commands::components::list(&engine, json),
            ComponentsCommand::Install { component } => {
                commands::components::install(&engine, &component, json)
            }
            ComponentsCommand::CheckUpdates => commands::components::check_updates(&engine, json),
        },
        Commands::Doctor => commands::doctor::run(&engine, config_path, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    }
}

fn load_config(
    path: Option<&Path>,
    runtime: Option<&str>,
) -> Result<(PathBuf, EngineConfig), String> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => EngineConfig::default_path().map_err(|e| format!("config error: {e}"))?,
    };
    let mut config = EngineConfig::load(&path)
        .map_err(|e| format!("config error: {}: {e}", path.display()))?;
    if let Some(runtime) = runtime {
        config.runtime.backend = runtime.to_owned();
    }
    Ok((path, config))
}
