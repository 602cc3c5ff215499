//! Lane-based dispatcher for background side effects.
//!
//! Each lane is a task draining its own channel in FIFO order. An order is
//! always routed to lane `order_id % lanes`, so the effects of one order are
//! applied in the order they were dispatched while different orders proceed
//! in parallel.

use super::event_bus::{EventBus, OrderEvent};
use crate::ledger::PositionStore;
use orderq_storage::StatusHistoryStore;
use orderq_types::{Order, OrderId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Work deferred until after a request has returned.
#[derive(Debug, Clone)]
pub enum SideEffect {
	/// Append the status carried by this snapshot to the order's history.
	RecordStatus(Order),
	/// Put the order at the tail of the queue.
	Enqueue(OrderId),
	/// Take the order out of the queue.
	Dequeue(OrderId),
}

impl SideEffect {
	pub fn order_id(&self) -> OrderId {
		match self {
			SideEffect::RecordStatus(order) => order.id,
			SideEffect::Enqueue(order_id) | SideEffect::Dequeue(order_id) => *order_id,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			SideEffect::RecordStatus(_) => "record_status",
			SideEffect::Enqueue(_) => "enqueue",
			SideEffect::Dequeue(_) => "dequeue",
		}
	}
}

/// Applies side effects against the stores.
pub struct SideEffectRunner {
	history: Arc<dyn StatusHistoryStore>,
	positions: Arc<dyn PositionStore>,
	event_bus: EventBus,
}

impl SideEffectRunner {
	pub fn new(
		history: Arc<dyn StatusHistoryStore>,
		positions: Arc<dyn PositionStore>,
		event_bus: EventBus,
	) -> Self {
		Self {
			history,
			positions,
			event_bus,
		}
	}

	/// Runs one effect. Failures are logged and published, never returned.
	pub async fn run(&self, effect: SideEffect) {
		let order_id = effect.order_id();
		let name = effect.name();

		let result = match effect {
			SideEffect::RecordStatus(order) => self
				.history
				.add_current_status(&order)
				.await
				.map_err(|e| e.to_string()),
			SideEffect::Enqueue(order_id) => {
				self.positions.add(order_id).await.map_err(|e| e.to_string())
			},
			SideEffect::Dequeue(order_id) => {
				self.positions.remove(order_id).await.map_err(|e| e.to_string())
			},
		};

		match result {
			Ok(()) => tracing::debug!(order_id, effect = name, "Side effect applied"),
			Err(error) => {
				tracing::error!(order_id, effect = name, error = %error, "Side effect failed");
				self.event_bus
					.publish(OrderEvent::SideEffectFailed {
						order_id,
						effect: name,
						error,
					})
					.ok();
			},
		}
	}
}

/// Routes side effects to per-order FIFO lanes.
///
/// Must be created inside a tokio runtime. Lane tasks stop once the
/// dispatcher is dropped and their queues are drained.
pub struct TaskDispatcher {
	lanes: Vec<mpsc::UnboundedSender<SideEffect>>,
	in_flight: Arc<watch::Sender<usize>>,
}

impl TaskDispatcher {
	pub fn new(lanes: usize, runner: Arc<SideEffectRunner>) -> Self {
		let (in_flight, _) = watch::channel(0usize);
		let in_flight = Arc::new(in_flight);

		let lanes = (0..lanes.max(1))
			.map(|lane| {
				let (sender, mut receiver) = mpsc::unbounded_channel::<SideEffect>();
				let runner = runner.clone();
				let in_flight = in_flight.clone();

				tokio::spawn(async move {
					while let Some(effect) = receiver.recv().await {
						runner.run(effect).await;
						in_flight.send_modify(|count| *count = count.saturating_sub(1));
					}
					tracing::debug!(lane, "Side effect lane stopped");
				});

				sender
			})
			.collect();

		Self { lanes, in_flight }
	}

	pub fn lane_count(&self) -> usize {
		self.lanes.len()
	}

	/// Queues an effect on its order's lane and returns immediately.
	pub fn dispatch(&self, effect: SideEffect) {
		let lane = (effect.order_id() % self.lanes.len() as u64) as usize;
		self.in_flight.send_modify(|count| *count += 1);

		if let Err(mpsc::error::SendError(effect)) = self.lanes[lane].send(effect) {
			self.in_flight
				.send_modify(|count| *count = count.saturating_sub(1));
			tracing::error!(
				order_id = effect.order_id(),
				effect = effect.name(),
				lane,
				"Side effect lane closed"
			);
		}
	}

	/// Waits until every dispatched effect has been applied.
	pub async fn settle(&self) {
		let mut receiver = self.in_flight.subscribe();
		// The sender lives in `self`, so this cannot observe a closed channel.
		receiver.wait_for(|count| *count == 0).await.ok();
	}
}
