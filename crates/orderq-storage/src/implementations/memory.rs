//! In-memory storage backend.
//!
//! Keeps every table in process memory behind a single read-write lock.
//! Nothing survives a restart, which makes it the default for development
//! and for tests.

use crate::tables::Tables;
use crate::{
	OrderMutation, OrderStore, PositionError, PositionTable, PositionWork, StatusHistoryStore,
	StorageBackends, StorageError,
};
use async_trait::async_trait;
use orderq_types::{
	ConfigSchema, Order, OrderFilters, OrderId, OrderStatusHistory, PositionEntry, Schema,
	ValidationError,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage implementation.
pub struct MemoryStorage {
	tables: Arc<RwLock<Tables>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			tables: Arc::new(RwLock::new(Tables::default())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl OrderStore for MemoryStorage {
	async fn save(&self, order: Order) -> Result<Order, StorageError> {
		self.tables.write().await.save_order(order)
	}

	async fn update(
		&self,
		id: OrderId,
		mutation: OrderMutation<'_>,
	) -> Result<Option<Order>, StorageError> {
		Ok(self.tables.write().await.update_order(id, mutation))
	}

	async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StorageError> {
		Ok(self.tables.read().await.find_order(id))
	}

	async fn get_all(&self, filters: &OrderFilters) -> Result<Vec<Order>, StorageError> {
		Ok(self.tables.read().await.orders_matching(filters))
	}
}

#[async_trait]
impl StatusHistoryStore for MemoryStorage {
	async fn add_current_status(&self, order: &Order) -> Result<(), StorageError> {
		self.tables.write().await.append_history(order)
	}

	async fn get_history(&self, id: OrderId) -> Result<Vec<OrderStatusHistory>, StorageError> {
		Ok(self.tables.read().await.history_of(id))
	}
}

#[async_trait]
impl PositionTable for MemoryStorage {
	async fn transaction(&self, work: PositionWork<'_>) -> Result<(), PositionError> {
		self.tables.write().await.position_transaction(work)
	}

	async fn entries(&self) -> Result<Vec<PositionEntry>, StorageError> {
		Ok(self.tables.read().await.position_entries())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// No settings
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<StorageBackends, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	Ok(StorageBackends::from_backend(Arc::new(MemoryStorage::new())))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl orderq_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {
	fn config_schema() -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}
