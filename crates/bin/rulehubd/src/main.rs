//! # rulehubd: rulehub daemon
//!
//! Composition root that wires the gateway adapter into the rule engine.
//!
//! ## Responsibilities
//! - Load configuration (`rulehub.toml`, env vars)
//! - Initialise `tracing` with the configured filter
//! - Construct the gateway adapters (REST discovery, WebSocket connector)
//! - Discover the Things and build the rule system
//! - Install the rules declared in the configuration
//! - Run every detection loop until Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no engine logic belongs here.

mod config;
mod rules;

use std::process::ExitCode;
use std::sync::Arc;

use rulehub_adapter_gateway::{HttpError, HttpGateway, WebSocketConnector};
use rulehub_app::ports::SystemClock;
use rulehub_app::rule_system::{EngineError, RuleSystem};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError};
use crate::rules::{RuleContext, RuleError};

/// Anything that stops the daemon from starting.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("configuration error")]
    Config(#[from] ConfigError),
    #[error("cannot set up the gateway client")]
    Gateway(#[from] HttpError),
    #[error("engine setup failed")]
    Engine(#[from] EngineError),
    #[error("cannot install rules")]
    Rules(#[from] RuleError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            report(&StartupError::from(err));
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.filter);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "rulehubd stopped");
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("rulehubd: invalid log filter `{filter}` ({err}), using `info`");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Config) -> Result<(), StartupError> {
    let gateway = HttpGateway::new(&config.gateway)?;
    let settings = config.engine_settings()?;
    tracing::info!(host = %config.gateway.host, "discovering things");

    let mut system =
        RuleSystem::initialize(&gateway, Arc::new(WebSocketConnector), &settings).await?;

    let context = RuleContext {
        timezone: config.local_timezone()?,
        observer: config.observer()?,
        clock: Arc::new(SystemClock),
    };
    rules::install(&mut system, &config.rules, &context)?;

    system.run_until(shutdown_signal()).await;
    tracing::info!("rulehubd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "cannot listen for Ctrl-C, shutting down");
    }
}

/// Print `err` and its chain of causes.
fn report(err: &dyn std::error::Error) {
    eprintln!("rulehubd: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}
