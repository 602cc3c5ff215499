//! Main entry point for the order queue service.
//!
//! Loads configuration, wires the storage backend into an [`OrderService`]
//! and serves the HTTP API until interrupted. Pending side effects are
//! drained before the process exits.

use clap::Parser;
use orderq_config::Config;
use orderq_core::{OrderService, OrderServiceBuilder, OrderServiceFactories};
use orderq_storage::StorageFactory;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the order queue service.
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

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started order queue");

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path is not valid UTF-8: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let service = Arc::new(build_service(config.clone())?);

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			server::start_server(api_config, Arc::clone(&service), shutdown_signal()).await?;
			tracing::info!("API server finished");
		},
		None => {
			tracing::info!("API disabled, waiting for shutdown signal");
			shutdown_signal().await;
		},
	}

	service.settle().await;
	tracing::info!("Stopped order queue");
	Ok(())
}

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for shutdown signal");
	}
}

/// Storage factories keyed by implementation name.
fn storage_factories() -> OrderServiceFactories<StorageFactory> {
	OrderServiceFactories {
		storage_factories: orderq_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
	}
}

/// Builds the order service on the configured primary storage.
fn build_service(config: Config) -> Result<OrderService, Box<dyn std::error::Error>> {
	Ok(OrderServiceBuilder::new(config).build(storage_factories())?)
}
