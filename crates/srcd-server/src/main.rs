use clap::Parser;
use srcd_core::Engine;
use srcd_schema::EngineConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "srcd-server",
    version,
    about = "HTTP daemon that starts and stops srcd components on request"
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8321")]
    bind: String,

    /// Path to the config file (default: ~/.srcd/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Container runtime backend, overriding the config file (docker, mock).
    #[arg(long)]
    runtime: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SRCD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_default(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("config error: {e}");
            return ExitCode::from(2);
        }
    };
    if let Some(runtime) = cli.runtime {
        config.runtime.backend = runtime;
    }

    info!("runtime backend: {}", config.runtime.backend);
    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match srcd_server::run_server(&engine, &cli.bind) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
