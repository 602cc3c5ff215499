//! In-process fan-out of order events.

use orderq_types::{OrderId, OrderStatus};
use tokio::sync::broadcast;

/// Something that happened to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
	Created {
		order_id: OrderId,
	},
	StatusChanged {
		order_id: OrderId,
		from: OrderStatus,
		to: OrderStatus,
	},
	DishesUpdated {
		order_id: OrderId,
	},
	Prioritized {
		order_id: OrderId,
		after_id: OrderId,
	},
	/// A background side effect could not be applied.
	SideEffectFailed {
		order_id: OrderId,
		effect: &'static str,
		error: String,
	},
}

/// Broadcast channel shared by the service and its background tasks.
///
/// Events published while nobody is subscribed are dropped.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<OrderEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	/// Subscribes to every event published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, returning the number of subscribers that got it.
	pub fn publish(
		&self,
		event: OrderEvent,
	) -> Result<usize, broadcast::error::SendError<OrderEvent>> {
		self.sender.send(event)
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1024)
	}
}
