//! Queue position ledger.
//!
//! Every enqueued order holds exactly one position and the positions always
//! form `1..=N`. Each operation runs as a single position table transaction,
//! so a failure part way through leaves the ledger as it was. Renumbering
//! only touches the contiguous range between the old and new position.

use async_trait::async_trait;
use orderq_storage::{position_work, PositionError, PositionTable, StorageError};
use orderq_types::{OrderId, PositionEntry};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Order {0} is already in the queue")]
	DuplicateQueueEntry(OrderId),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl From<PositionError> for LedgerError {
	fn from(err: PositionError) -> Self {
		match err {
			PositionError::AlreadyQueued(order_id) => LedgerError::DuplicateQueueEntry(order_id),
			PositionError::Storage(e) => LedgerError::Storage(e),
		}
	}
}

/// Ordered queue of active orders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionStore: Send + Sync {
	/// Appends the order at the tail.
	async fn add(&self, order_id: OrderId) -> Result<(), LedgerError>;

	/// Removes the order and closes the gap. Absent orders are ignored.
	async fn remove(&self, order_id: OrderId) -> Result<(), LedgerError>;

	/// Moves `order_id` to the position right after `after_id`.
	///
	/// Does nothing unless both orders are queued.
	async fn shuffle_after(&self, order_id: OrderId, after_id: OrderId) -> Result<(), LedgerError>;

	/// Current entries ordered by position.
	async fn entries(&self) -> Result<Vec<PositionEntry>, LedgerError>;
}

/// [`PositionStore`] backed by a [`PositionTable`].
pub struct PositionLedger {
	table: Arc<dyn PositionTable>,
}

impl PositionLedger {
	pub fn new(table: Arc<dyn PositionTable>) -> Self {
		Self { table }
	}
}

#[async_trait]
impl PositionStore for PositionLedger {
	async fn add(&self, order_id: OrderId) -> Result<(), LedgerError> {
		self.table
			.transaction(position_work(move |tx| {
				if tx.position_of(order_id).is_some() {
					return Err(PositionError::AlreadyQueued(order_id));
				}
				let latest = tx.max_position();
				tx.insert(order_id, latest + 1)?;
				Ok(())
			}))
			.await?;

		tracing::debug!(order_id, "Order queued");
		Ok(())
	}

	async fn remove(&self, order_id: OrderId) -> Result<(), LedgerError> {
		self.table
			.transaction(position_work(move |tx| {
				let Some(position) = tx.position_of(order_id) else {
					return Ok(());
				};
				let last = tx.max_position();
				tx.delete(order_id)?;
				tx.shift_range(position + 1..last + 1, -1)?;
				Ok(())
			}))
			.await?;

		tracing::debug!(order_id, "Order left the queue");
		Ok(())
	}

	async fn shuffle_after(&self, order_id: OrderId, after_id: OrderId) -> Result<(), LedgerError> {
		self.table
			.transaction(position_work(move |tx| {
				let (Some(current), Some(after)) = (tx.position_of(order_id), tx.position_of(after_id))
				else {
					return Ok(());
				};

				let target = after + 1;
				if current > target {
					// Moving up: everything from the target slot down to the
					// old slot shifts one place back.
					tx.shift_range(target..current, 1)?;
					tx.set_position(order_id, target)?;
				} else if current < target {
					tx.shift_range(current + 1..target, -1)?;
					tx.set_position(order_id, target - 1)?;
				}
				Ok(())
			}))
			.await?;

		tracing::debug!(order_id, after_id, "Order moved");
		Ok(())
	}

	async fn entries(&self) -> Result<Vec<PositionEntry>, LedgerError> {
		Ok(self.table.entries().await?)
	}
}
