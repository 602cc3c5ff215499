//! Order service: the operations exposed to the API layer.
//!
//! Writes to the order itself happen before a call returns. History rows and
//! queue updates that follow from a write are dispatched as side effects and
//! applied in the background; [`OrderService::settle`] waits for them.

use crate::engine::{EventBus, OrderEvent, SideEffect, SideEffectRunner, TaskDispatcher};
use crate::ledger::{LedgerError, PositionStore};
use crate::state::{OrderStateError, OrderStateMachine};
use orderq_storage::{OrderStore, StatusHistoryStore, StorageError};
use orderq_types::{
	Dish, NewOrder, Order, OrderFilters, OrderId, OrderStatus, OrderWithStatusHistory,
	PositionEntry,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use validator::Validate;

/// Errors returned by order service operations.
#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Order not found: {0}")]
	OrderNotFound(OrderId),
	#[error("Invalid status transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order {0} is complete and can no longer be updated")]
	TerminalOrderUpdate(OrderId),
	#[error("Invalid order update: {0}")]
	InvalidOrderUpdate(String),
	#[error("Order {0} is already in the queue")]
	DuplicateQueueEntry(OrderId),
	#[error("Invalid order: {0}")]
	Validation(String),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl From<OrderStateError> for OrderError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::Storage(e) => OrderError::Storage(e),
			OrderStateError::OrderNotFound(id) => OrderError::OrderNotFound(id),
			OrderStateError::Terminal { id, .. } => OrderError::TerminalOrderUpdate(id),
			OrderStateError::InvalidTransition { from, to } => {
				OrderError::InvalidTransition { from, to }
			},
			e @ OrderStateError::NotEditable { .. } => OrderError::InvalidOrderUpdate(e.to_string()),
		}
	}
}

impl From<LedgerError> for OrderError {
	fn from(err: LedgerError) -> Self {
		match err {
			LedgerError::DuplicateQueueEntry(id) => OrderError::DuplicateQueueEntry(id),
			LedgerError::Storage(e) => OrderError::Storage(e),
		}
	}
}

/// Orchestrates order persistence, status transitions and the queue.
pub struct OrderService {
	state_machine: OrderStateMachine,
	orders: Arc<dyn OrderStore>,
	history: Arc<dyn StatusHistoryStore>,
	positions: Arc<dyn PositionStore>,
	dispatcher: TaskDispatcher,
	event_bus: EventBus,
}

impl OrderService {
	/// Creates the service and starts `lanes` side effect lanes.
	///
	/// Must be called inside a tokio runtime.
	pub fn new(
		orders: Arc<dyn OrderStore>,
		history: Arc<dyn StatusHistoryStore>,
		positions: Arc<dyn PositionStore>,
		event_bus: EventBus,
		lanes: usize,
	) -> Self {
		let runner = SideEffectRunner::new(history.clone(), positions.clone(), event_bus.clone());

		Self {
			state_machine: OrderStateMachine::new(orders.clone()),
			orders,
			history,
			positions,
			dispatcher: TaskDispatcher::new(lanes, Arc::new(runner)),
			event_bus,
		}
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Persists a new order at Pending and queues it.
	#[instrument(skip_all, fields(source = %request.source))]
	pub async fn create_order(&self, request: NewOrder) -> Result<Order, OrderError> {
		request
			.validate()
			.map_err(|e| OrderError::Validation(e.to_string()))?;

		let order = self.state_machine.store_order(Order::pending(request)).await?;
		tracing::info!(order_id = order.id, "Order created");

		self.dispatcher.dispatch(SideEffect::RecordStatus(order.clone()));
		self.dispatcher.dispatch(SideEffect::Enqueue(order.id));
		self.event_bus
			.publish(OrderEvent::Created { order_id: order.id })
			.ok();

		Ok(order)
	}

	/// Moves an order to `status`. Terminal statuses take it off the queue.
	#[instrument(skip_all, fields(order_id = id, status = %status))]
	pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, OrderError> {
		let transition = self.state_machine.transition_order_status(id, status).await?;
		let order = transition.order;
		tracing::info!(from = %transition.from, "Order status changed");

		self.dispatcher.dispatch(SideEffect::RecordStatus(order.clone()));
		if status.is_terminal() {
			self.dispatcher.dispatch(SideEffect::Dequeue(id));
		}
		self.event_bus
			.publish(OrderEvent::StatusChanged {
				order_id: id,
				from: transition.from,
				to: status,
			})
			.ok();

		Ok(order)
	}

	/// Replaces the dishes of an order that is still Pending or Preparing.
	#[instrument(skip_all, fields(order_id = id, dishes = dishes.len()))]
	pub async fn update_dishes(&self, id: OrderId, dishes: Vec<Dish>) -> Result<Order, OrderError> {
		if dishes.is_empty() {
			return Err(OrderError::InvalidOrderUpdate(
				"an order needs at least one dish".into(),
			));
		}
		for dish in &dishes {
			dish.validate()
				.map_err(|e| OrderError::InvalidOrderUpdate(e.to_string()))?;
		}

		let order = self.state_machine.replace_dishes(id, dishes).await?;
		tracing::info!("Order dishes updated");

		self.event_bus
			.publish(OrderEvent::DishesUpdated { order_id: id })
			.ok();

		Ok(order)
	}

	/// Moves order `id` right after `after_id` in the queue.
	///
	/// Does nothing unless both orders are queued.
	#[instrument(skip_all, fields(order_id = id, after_id = after_id))]
	pub async fn prioritize(&self, id: OrderId, after_id: OrderId) -> Result<(), OrderError> {
		self.positions.shuffle_after(id, after_id).await?;

		self.event_bus
			.publish(OrderEvent::Prioritized {
				order_id: id,
				after_id,
			})
			.ok();
		Ok(())
	}

	pub async fn find_by_id(&self, id: OrderId) -> Result<Order, OrderError> {
		Ok(self.state_machine.get_order(id).await?)
	}

	/// Looks up an order together with its status history.
	pub async fn find_with_history(&self, id: OrderId) -> Result<OrderWithStatusHistory, OrderError> {
		let order = self.state_machine.get_order(id).await?;
		let status_history = self.history.get_history(id).await?;

		Ok(OrderWithStatusHistory {
			order,
			status_history,
		})
	}

	pub async fn find_many(&self, filters: &OrderFilters) -> Result<Vec<Order>, OrderError> {
		Ok(self.orders.get_all(filters).await?)
	}

	/// Current queue, ordered by position.
	pub async fn queue(&self) -> Result<Vec<PositionEntry>, OrderError> {
		Ok(self.positions.entries().await?)
	}

	/// Waits until all dispatched side effects have been applied.
	pub async fn settle(&self) {
		self.dispatcher.settle().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ledger::{MockPositionStore, PositionLedger};
	use orderq_storage::implementations::memory::MemoryStorage;
	use orderq_types::OrderSource;

	fn request(dishes: &[&str]) -> NewOrder {
		NewOrder {
			time: chrono::Utc::now(),
			dishes: dishes.iter().map(|name| Dish::new(*name)).collect(),
			source: OrderSource::InPerson,
		}
	}

	fn service() -> OrderService {
		let storage = Arc::new(MemoryStorage::new());
		OrderService::new(
			storage.clone(),
			storage.clone(),
			Arc::new(PositionLedger::new(storage)),
			EventBus::default(),
			4,
		)
	}

	fn service_with_positions(positions: MockPositionStore) -> OrderService {
		let storage = Arc::new(MemoryStorage::new());
		OrderService::new(
			storage.clone(),
			storage,
			Arc::new(positions),
			EventBus::default(),
			2,
		)
	}

	async fn history_of(service: &OrderService, id: OrderId) -> Vec<OrderStatus> {
		service
			.find_with_history(id)
			.await
			.unwrap()
			.status_history
			.into_iter()
			.map(|h| h.status)
			.collect()
	}

	#[tokio::test]
	async fn test_create_order_records_history_and_queues() {
		let service = service();
		let first = service.create_order(request(&["ramen"])).await.unwrap();
		let second = service.create_order(request(&["gyoza"])).await.unwrap();
		assert_eq!(first.status, OrderStatus::Pending);
		service.settle().await;

		assert_eq!(history_of(&service, first.id).await, vec![OrderStatus::Pending]);
		assert_eq!(
			service.queue().await.unwrap(),
			vec![
				PositionEntry::new(first.id, 1),
				PositionEntry::new(second.id, 2)
			]
		);
	}

	#[tokio::test]
	async fn test_create_order_validates_request() {
		let service = service();
		assert!(matches!(
			service.create_order(request(&[])).await,
			Err(OrderError::Validation(_))
		));
		assert!(matches!(
			service.create_order(request(&[""])).await,
			Err(OrderError::Validation(_))
		));
		assert!(service.find_many(&OrderFilters::default()).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_full_lifecycle() {
		let service = service();
		let order = service.create_order(request(&["pho"])).await.unwrap();

		for status in [OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Done] {
			let updated = service.update_status(order.id, status).await.unwrap();
			assert_eq!(updated.status, status);
		}
		service.settle().await;

		assert_eq!(
			history_of(&service, order.id).await,
			vec![
				OrderStatus::Pending,
				OrderStatus::Preparing,
				OrderStatus::Ready,
				OrderStatus::Done
			]
		);
		assert!(service.queue().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_create_then_cancel_leaves_queue() {
		let service = service();
		let order = service.create_order(request(&["udon"])).await.unwrap();
		service
			.update_status(order.id, OrderStatus::Cancelled)
			.await
			.unwrap();
		service.settle().await;

		assert!(service.queue().await.unwrap().is_empty());
		assert_eq!(
			history_of(&service, order.id).await,
			vec![OrderStatus::Pending, OrderStatus::Cancelled]
		);
	}

	#[tokio::test]
	async fn test_status_errors() {
		let service = service();
		let order = service.create_order(request(&["soba"])).await.unwrap();
		service
			.update_status(order.id, OrderStatus::Ready)
			.await
			.unwrap();

		assert!(matches!(
			service.update_status(order.id, OrderStatus::Preparing).await,
			Err(OrderError::InvalidTransition {
				from: OrderStatus::Ready,
				to: OrderStatus::Preparing
			})
		));
		assert!(matches!(
			service.update_status(order.id, OrderStatus::Ready).await,
			Err(OrderError::InvalidTransition { .. })
		));

		service
			.update_status(order.id, OrderStatus::Cancelled)
			.await
			.unwrap();
		assert!(matches!(
			service.update_status(order.id, OrderStatus::Done).await,
			Err(OrderError::TerminalOrderUpdate(_))
		));
		assert!(matches!(
			service.update_status(404, OrderStatus::Done).await,
			Err(OrderError::OrderNotFound(404))
		));
	}

	#[tokio::test]
	async fn test_update_dishes() {
		let service = service();
		let order = service.create_order(request(&["tea"])).await.unwrap();

		assert!(matches!(
			service.update_dishes(order.id, vec![]).await,
			Err(OrderError::InvalidOrderUpdate(_))
		));
		assert!(matches!(
			service.update_dishes(order.id, vec![Dish::new("")]).await,
			Err(OrderError::InvalidOrderUpdate(_))
		));
		// Empty dishes are rejected before the lookup.
		assert!(matches!(
			service.update_dishes(404, vec![]).await,
			Err(OrderError::InvalidOrderUpdate(_))
		));
		assert!(matches!(
			service.update_dishes(404, vec![Dish::new("tea")]).await,
			Err(OrderError::OrderNotFound(404))
		));

		service
			.update_status(order.id, OrderStatus::Preparing)
			.await
			.unwrap();
		let updated = service
			.update_dishes(order.id, vec![Dish::new("tea"), Dish::new("cake")])
			.await
			.unwrap();
		assert_eq!(updated.dishes.len(), 2);

		service
			.update_status(order.id, OrderStatus::Ready)
			.await
			.unwrap();
		assert!(matches!(
			service.update_dishes(order.id, vec![Dish::new("coffee")]).await,
			Err(OrderError::InvalidOrderUpdate(_))
		));
		assert_eq!(service.find_by_id(order.id).await.unwrap().dishes.len(), 2);
	}

	#[tokio::test]
	async fn test_prioritize_reorders_active_orders() {
		let service = service();
		let mut ids = Vec::new();
		for dish in ["a", "b", "c"] {
			ids.push(service.create_order(request(&[dish])).await.unwrap().id);
		}
		service.settle().await;

		service.prioritize(ids[2], ids[0]).await.unwrap();

		let active: Vec<_> = service
			.find_many(&OrderFilters::active())
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.id)
			.collect();
		assert_eq!(active, vec![ids[0], ids[2], ids[1]]);
	}

	#[tokio::test]
	async fn test_prioritize_delegates_to_ledger() {
		let mut positions = MockPositionStore::new();
		positions
			.expect_shuffle_after()
			.withf(|id, after_id| (*id, *after_id) == (5, 2))
			.times(1)
			.returning(|_, _| Ok(()));

		let service = service_with_positions(positions);
		service.prioritize(5, 2).await.unwrap();
	}

	#[tokio::test]
	async fn test_background_failure_does_not_reach_caller() {
		let mut positions = MockPositionStore::new();
		positions
			.expect_add()
			.returning(|id| Err(LedgerError::DuplicateQueueEntry(id)));

		let service = service_with_positions(positions);
		let mut events = service.event_bus().subscribe();

		let order = service.create_order(request(&["bao"])).await.unwrap();
		service.settle().await;

		let mut failed = None;
		while let Ok(event) = events.try_recv() {
			if let OrderEvent::SideEffectFailed { order_id, effect, .. } = event {
				failed = Some((order_id, effect));
			}
		}
		assert_eq!(failed, Some((order.id, "enqueue")));
	}

	/// Order store whose reads return late, widening any gap between a read
	/// and a later write.
	struct SlowReads(Arc<MemoryStorage>);

	#[async_trait::async_trait]
	impl OrderStore for SlowReads {
		async fn save(&self, order: Order) -> Result<Order, StorageError> {
			self.0.save(order).await
		}

		async fn update(
			&self,
			id: OrderId,
			mutation: orderq_storage::OrderMutation<'_>,
		) -> Result<Option<Order>, StorageError> {
			self.0.update(id, mutation).await
		}

		async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StorageError> {
			let order = self.0.find_by_id(id).await;
			tokio::time::sleep(std::time::Duration::from_millis(100)).await;
			order
		}

		async fn get_all(&self, filters: &OrderFilters) -> Result<Vec<Order>, StorageError> {
			self.0.get_all(filters).await
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_dish_edit_racing_completion_keeps_order_done() {
		let storage = Arc::new(MemoryStorage::new());
		let service = Arc::new(OrderService::new(
			Arc::new(SlowReads(storage.clone())),
			storage.clone(),
			Arc::new(PositionLedger::new(storage)),
			EventBus::default(),
			2,
		));
		let order = service.create_order(request(&["ramen"])).await.unwrap();
		service
			.update_status(order.id, OrderStatus::Preparing)
			.await
			.unwrap();

		let editor = service.clone();
		let edit = tokio::spawn(async move {
			editor
				.update_dishes(order.id, vec![Dish::new("ramen"), Dish::new("egg")])
				.await
		});
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
		service.update_status(order.id, OrderStatus::Done).await.unwrap();

		match edit.await.unwrap() {
			Ok(_) | Err(OrderError::InvalidOrderUpdate(_)) => {},
			Err(e) => panic!("unexpected dish edit error: {}", e),
		}
		service.settle().await;

		assert_eq!(
			service.find_by_id(order.id).await.unwrap().status,
			OrderStatus::Done
		);
		assert!(service.queue().await.unwrap().is_empty());
		assert_eq!(
			history_of(&service, order.id).await.last(),
			Some(&OrderStatus::Done)
		);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_racing_terminal_updates_only_one_wins() {
		let service = Arc::new(service());

		for _ in 0..20 {
			let order = service.create_order(request(&["curry"])).await.unwrap();
			service
				.update_status(order.id, OrderStatus::Ready)
				.await
				.unwrap();

			let handles: Vec<_> = [OrderStatus::Done, OrderStatus::Cancelled]
				.into_iter()
				.map(|status| {
					let service = service.clone();
					tokio::spawn(async move { service.update_status(order.id, status).await })
				})
				.collect();

			let mut won = 0;
			for handle in handles {
				match handle.await.unwrap() {
					Ok(_) => won += 1,
					Err(OrderError::TerminalOrderUpdate(_)) => {},
					Err(e) => panic!("unexpected error: {}", e),
				}
			}
			assert_eq!(won, 1);

			service.settle().await;
			let terminal_rows = history_of(&service, order.id)
				.await
				.into_iter()
				.filter(|status| status.is_terminal())
				.count();
			assert_eq!(terminal_rows, 1);
		}
		assert!(service.queue().await.unwrap().is_empty());
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_edits_never_reopen_finished_orders() {
		let service = Arc::new(service());
		let mut ids = Vec::new();
		for _ in 0..8 {
			let order = service.create_order(request(&["tea"])).await.unwrap();
			service
				.update_status(order.id, OrderStatus::Preparing)
				.await
				.unwrap();
			ids.push(order.id);
		}

		let mut handles = Vec::new();
		for &id in &ids {
			for round in 0..10 {
				let service = service.clone();
				handles.push(tokio::spawn(async move {
					service
						.update_dishes(id, vec![Dish::new(format!("refill {}", round))])
						.await
						.ok();
				}));
			}
			let service = service.clone();
			handles.push(tokio::spawn(async move {
				service.update_status(id, OrderStatus::Done).await.unwrap();
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}
		service.settle().await;

		for id in ids {
			assert_eq!(service.find_by_id(id).await.unwrap().status, OrderStatus::Done);
		}
		assert!(service.queue().await.unwrap().is_empty());
		assert!(service
			.find_many(&OrderFilters::active())
			.await
			.unwrap()
			.is_empty());
	}

	#[test]
	fn test_ledger_duplicate_maps_to_order_error() {
		let err: OrderError = LedgerError::DuplicateQueueEntry(3).into();
		assert!(matches!(err, OrderError::DuplicateQueueEntry(3)));
	}
}
