//! Storage module for the order queue system.
//!
//! This module defines the persistence contracts the order service relies
//! on (orders, status history and the queue position table) and ships the
//! in-memory and file-based backends that implement them.

use async_trait::async_trait;
use orderq_types::{
	ConfigSchema, ImplementationRegistry, Order, OrderFilters, OrderId, OrderStatusHistory,
	PositionEntry,
};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

mod tables;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found: {0}")]
	NotFound(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Errors returned by a position table transaction.
#[derive(Debug, Error)]
pub enum PositionError {
	/// The order already holds a queue position.
	#[error("Order {0} is already queued")]
	AlreadyQueued(OrderId),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Persistence of orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
	/// Inserts the order when it has no id yet, replaces it otherwise.
	///
	/// Returns the stored order with its assigned id.
	async fn save(&self, order: Order) -> Result<Order, StorageError>;

	/// Loads an order, applies `mutation` and writes the result, all under the
	/// store's write lock.
	///
	/// Nothing is written when `mutation` returns false. Returns the stored
	/// order, or `None` if it does not exist.
	async fn update(
		&self,
		id: OrderId,
		mutation: OrderMutation<'_>,
	) -> Result<Option<Order>, StorageError>;

	/// Looks up an order, `None` if it does not exist.
	async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StorageError>;

	/// Lists the orders selected by the filters.
	async fn get_all(&self, filters: &OrderFilters) -> Result<Vec<Order>, StorageError>;
}

/// Change applied to a stored order. Returning false rejects it.
pub type OrderMutation<'a> = Box<dyn FnOnce(&mut Order) -> bool + Send + 'a>;

/// Boxes a closure as [`OrderMutation`].
pub fn order_mutation<'a, F>(mutation: F) -> OrderMutation<'a>
where
	F: FnOnce(&mut Order) -> bool + Send + 'a,
{
	Box::new(mutation)
}

/// Append-only status history.
#[async_trait]
pub trait StatusHistoryStore: Send + Sync {
	/// Appends the order's current status, stamped with the current time.
	async fn add_current_status(&self, order: &Order) -> Result<(), StorageError>;

	/// Returns the history of an order ordered by timestamp.
	async fn get_history(&self, id: OrderId) -> Result<Vec<OrderStatusHistory>, StorageError>;
}

/// Row-level operations available inside a position table transaction.
///
/// Positions may transiently collide while a transaction is running; only
/// the state at commit is required to be dense.
pub trait PositionTransaction {
	fn position_of(&self, order_id: OrderId) -> Option<u64>;

	/// Highest position in the table, 0 when empty.
	fn max_position(&self) -> u64;

	fn insert(&mut self, order_id: OrderId, position: u64) -> Result<(), StorageError>;

	/// Adds `delta` to every position in `range`, returning how many rows moved.
	fn shift_range(&mut self, range: Range<u64>, delta: i64) -> Result<usize, StorageError>;

	fn set_position(&mut self, order_id: OrderId, position: u64) -> Result<(), StorageError>;

	fn delete(&mut self, order_id: OrderId) -> Result<(), StorageError>;
}

/// Work executed inside a single position table transaction.
pub type PositionWork<'a> =
	Box<dyn FnOnce(&mut dyn PositionTransaction) -> Result<(), PositionError> + Send + 'a>;

/// Boxes a closure as [`PositionWork`].
pub fn position_work<'a, F>(work: F) -> PositionWork<'a>
where
	F: FnOnce(&mut dyn PositionTransaction) -> Result<(), PositionError> + Send + 'a,
{
	Box::new(work)
}

/// Table backing the queue position ledger.
#[async_trait]
pub trait PositionTable: Send + Sync {
	/// Runs `work` atomically.
	///
	/// Concurrent transactions are serialized. If `work` or the commit fails,
	/// every change it made is rolled back.
	async fn transaction(&self, work: PositionWork<'_>) -> Result<(), PositionError>;

	/// Returns every entry ordered by position.
	async fn entries(&self) -> Result<Vec<PositionEntry>, StorageError>;
}

/// A storage backend split into the handles the order service consumes.
#[derive(Clone)]
pub struct StorageBackends {
	pub orders: Arc<dyn OrderStore>,
	pub history: Arc<dyn StatusHistoryStore>,
	pub positions: Arc<dyn PositionTable>,
}

impl StorageBackends {
	/// Uses one backend for all three stores.
	pub fn from_backend<B>(backend: Arc<B>) -> Self
	where
		B: OrderStore + StatusHistoryStore + PositionTable + 'static,
	{
		Self {
			orders: backend.clone(),
			history: backend.clone(),
			positions: backend,
		}
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<StorageBackends, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {
	/// Returns the configuration schema for validation.
	fn config_schema() -> Box<dyn ConfigSchema>;
}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}
