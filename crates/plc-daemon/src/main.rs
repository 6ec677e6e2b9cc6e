//! Entry point for the virtual PLC daemon.
//!
//! Loads a configuration document, builds the shared memory space, starts
//! the simulation tasks and the fieldbus listeners against it, then blocks
//! until a shutdown signal arrives.

mod diagnostics;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use diagnostics::DiagnosticsState;
use plc_common::config::RootConfig;
use plc_fieldbus::FieldbusDispatcher;
use plc_memory::MemorySpace;
use plc_simulation::{IoSimulator, SimulationTaskConfig};
use signals::{wait_for_shutdown, SignalHandler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Command line arguments for the virtual PLC daemon.
#[derive(Parser, Debug)]
#[command(name = "plc-daemon", about = "Virtual PLC simulator daemon")]
struct Args {
    /// Path to a TOML configuration file. Defaults to the built-in config
    /// if omitted.
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = load_config(args.config.as_deref())?;
    info!(
        modules = config.fieldbus_manager.modules.len(),
        simulations = config.io_manager.simulations.len(),
        "starting virtual PLC daemon"
    );

    let signal_handler = SignalHandler::new().context("failed to install signal handlers")?;
    let diagnostics = Arc::new(DiagnosticsState::new());

    run_daemon(&config, &signal_handler, &diagnostics)?;

    let snapshot = diagnostics.snapshot();
    info!(
        uptime_secs = snapshot.uptime.as_secs_f64(),
        connections_served = snapshot.connections_served,
        requests_served = snapshot.requests_served,
        exceptions_raised = snapshot.exceptions_raised,
        failed_simulations = snapshot.failed_simulations,
        "shutdown complete"
    );

    Ok(())
}

fn init_logging(level: &str) {
    let filter = format!(
        "plc_daemon={level},plc_simulation={level},plc_fieldbus={level},plc_memory={level},plc_common={level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> Result<RootConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            RootConfig::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))
        }
        None => {
            warn!("no configuration file given, using built-in defaults");
            Ok(RootConfig::default())
        }
    }
}

fn run_daemon(
    config: &RootConfig,
    signal_handler: &SignalHandler,
    diagnostics: &Arc<DiagnosticsState>,
) -> Result<()> {
    let memory = Arc::new(MemorySpace::new(config.memory_manager.memspace.clone().into()));

    let task_configs = config
        .io_manager
        .simulations
        .iter()
        .enumerate()
        .map(|(index, sim)| SimulationTaskConfig::from_config(index, sim.clone()))
        .collect::<Result<Vec<_>, _>>()
        .context("invalid simulation task configuration")?;

    let simulator = IoSimulator::start(task_configs, Arc::clone(&memory));
    info!(tasks = simulator.active_count(), "simulation tasks running");

    let dispatcher = FieldbusDispatcher::start(
        &config.fieldbus_manager.modules,
        &config.listener,
        Arc::clone(&memory),
        diagnostics.counters(),
    )
    .context("failed to start fieldbus dispatcher")?;

    while !wait_for_shutdown(signal_handler, Duration::from_secs(1)) {
        if signal_handler.take_reload_request() {
            warn!("configuration reload requested but not supported; continuing with current configuration");
        }
        let failed = simulator.failed_ids();
        if !failed.is_empty() {
            diagnostics.set_failed_simulations(failed.len() as u64);
            error!(?failed, "one or more simulation tasks have stopped");
        }
    }

    info!("shutdown signal received, stopping");
    dispatcher.stop();
    simulator.stop();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_with_no_config() {
        let args = Args::parse_from(["plc-daemon"]);
        assert!(args.config.is_none());
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn args_parse_with_config_and_log_level() {
        let args = Args::parse_from(["plc-daemon", "config/default.toml", "-l", "debug"]);
        assert_eq!(args.config, Some(PathBuf::from("config/default.toml")));
        assert_eq!(args.log_level, "debug");
    }

    #[test]
    fn default_config_loads_without_file() {
        let config = load_config(None).unwrap();
        assert!(config.fieldbus_manager.modules.is_empty());
    }
}
