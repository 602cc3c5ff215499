//! Order state machine implementation.
//!
//! Orders move Pending -> Preparing -> Ready -> Done, and may be cancelled
//! from any non-terminal status. Done and Cancelled are final.

use super::policy::is_transition_valid;
use orderq_storage::{order_mutation, OrderStore, StorageError};
use orderq_types::{Dish, Order, OrderId, OrderStatus};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Order not found: {0}")]
	OrderNotFound(OrderId),
	#[error("Order {id} is {status} and can no longer change")]
	Terminal { id: OrderId, status: OrderStatus },
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Dishes of order {id} cannot be changed while it is {status}")]
	NotEditable { id: OrderId, status: OrderStatus },
}

/// Result of a successful status transition.
#[derive(Debug, Clone)]
pub struct Transition {
	pub from: OrderStatus,
	pub order: Order,
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	orders: Arc<dyn OrderStore>,
}

impl OrderStateMachine {
	pub fn new(orders: Arc<dyn OrderStore>) -> Self {
		Self { orders }
	}

	/// Gets an order by ID
	pub async fn get_order(&self, id: OrderId) -> Result<Order, OrderStateError> {
		self.orders
			.find_by_id(id)
			.await?
			.ok_or(OrderStateError::OrderNotFound(id))
	}

	/// Stores a new order at Pending.
	pub async fn store_order(&self, order: Order) -> Result<Order, OrderStateError> {
		Ok(self.orders.save(order).await?)
	}

	/// Applies `updater` to the stored order as one unit inside the store.
	///
	/// Concurrent updates of the same order are serialized, so `updater`
	/// always sees the latest state. Nothing is written when it fails.
	pub async fn update_order_with<F>(&self, id: OrderId, updater: F) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order) -> Result<(), OrderStateError> + Send,
	{
		let mut rejection = None;
		let updated = self
			.orders
			.update(
				id,
				order_mutation(|order| match updater(order) {
					Ok(()) => true,
					Err(e) => {
						rejection = Some(e);
						false
					},
				}),
			)
			.await?;

		if let Some(e) = rejection {
			return Err(e);
		}
		updated.ok_or(OrderStateError::OrderNotFound(id))
	}

	/// Transitions an order to a new status with validation
	pub async fn transition_order_status(
		&self,
		id: OrderId,
		new_status: OrderStatus,
	) -> Result<Transition, OrderStateError> {
		let mut from = new_status;
		let order = self
			.update_order_with(id, |order| {
				from = order.status;
				if order.status.is_terminal() {
					return Err(OrderStateError::Terminal {
						id,
						status: order.status,
					});
				}
				if !is_transition_valid(order.status, new_status) {
					return Err(OrderStateError::InvalidTransition {
						from: order.status,
						to: new_status,
					});
				}
				order.status = new_status;
				Ok(())
			})
			.await?;

		Ok(Transition { from, order })
	}

	/// Replaces the dish list of an order that is still editable.
	pub async fn replace_dishes(
		&self,
		id: OrderId,
		dishes: Vec<Dish>,
	) -> Result<Order, OrderStateError> {
		self.update_order_with(id, |order| {
			if !order.status.is_editable() {
				return Err(OrderStateError::NotEditable {
					id,
					status: order.status,
				});
			}
			order.dishes = dishes;
			Ok(())
		})
		.await
	}
}
