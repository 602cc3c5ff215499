//! Builder for constructing the order service from configuration.
//!
//! Storage backends are plugged in through factory functions keyed by the
//! implementation name used in `[storage.implementations.<name>]`.

use crate::engine::EventBus;
use crate::ledger::PositionLedger;
use crate::service::OrderService;
use orderq_config::Config;
use orderq_storage::{StorageBackends, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while building the order service.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions available to the builder.
pub struct OrderServiceFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for an [`OrderService`] with a pluggable storage backend.
pub struct OrderServiceBuilder {
	config: Config,
	event_bus: EventBus,
}

impl OrderServiceBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			event_bus: EventBus::default(),
		}
	}

	/// Builds the service on top of the primary storage implementation.
	///
	/// Only the primary backend is instantiated; the file backend holds an
	/// exclusive lock for as long as it lives. Must be called inside a tokio
	/// runtime.
	pub fn build<SF>(self, factories: OrderServiceFactories<SF>) -> Result<OrderService, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<StorageBackends, StorageError>,
	{
		let primary = &self.config.storage.primary;
		let storage_config = self.config.storage.implementations.get(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' has no configuration",
				primary
			))
		})?;
		let factory = factories.storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;

		let backends = factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary, "Loaded");

		let lanes = self.config.tasks.lanes;
		tracing::info!(component = "tasks", lanes, "Loaded");

		Ok(OrderService::new(
			backends.orders,
			backends.history,
			Arc::new(PositionLedger::new(backends.positions)),
			self.event_bus,
			lanes,
		))
	}
}
