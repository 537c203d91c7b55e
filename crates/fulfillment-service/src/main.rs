//! Main entry point for the order fulfillment service.
//!
//! Loads the configuration, wires the configured storage, notification and
//! refund implementations into a fulfillment engine, and serves the staff API
//! next to the engine's event monitor until interrupted.

use clap::Parser;
use fulfillment_config::Config;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the fulfillment service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	// RUST_LOG wins over --log-level
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started fulfillment service");

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Configuration path is not valid UTF-8: {:?}", args.config))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!(service = %config.service.id, "Loaded configuration");

	let engine = Arc::new(factory_registry::build_engine_from_config(config.clone())?);
	engine.initialize().await?;

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let api_task = server::start_server(api_config, Arc::clone(&engine));

			tokio::select! {
				result = engine.run() => {
					tracing::info!("Engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("API disabled, running engine only");
			engine.run().await?;
		},
	}

	engine.shutdown().await?;
	tracing::info!("Stopped fulfillment service");
	Ok(())
}
