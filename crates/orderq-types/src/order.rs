//! Order types for the order queue system.
//!
//! An order is created from a validated [`NewOrder`] request and carries its
//! current status. Status history and queue position live in their own
//! stores and are joined on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::{OrderStatus, OrderStatusHistory};

/// Identifier assigned by the order store on first persist.
pub type OrderId = u64;

/// A single dish on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Dish {
	/// Dish name as written on the ticket.
	#[validate(length(min = 1, message = "dish name cannot be empty"))]
	pub name: String,
}

impl Dish {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into() }
	}
}

/// Channel the order came in through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource {
	InPerson,
	Delivery,
	Phone,
}

impl fmt::Display for OrderSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderSource::InPerson => write!(f, "in_person"),
			OrderSource::Delivery => write!(f, "delivery"),
			OrderSource::Phone => write!(f, "phone"),
		}
	}
}

/// Request to create a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewOrder {
	/// When the customer placed the order.
	pub time: DateTime<Utc>,
	/// Dishes to prepare, at least one.
	#[validate(length(min = 1, message = "an order needs at least one dish"), nested)]
	pub dishes: Vec<Dish>,
	/// Channel the order came in through.
	pub source: OrderSource,
}

/// An order tracked by the kitchen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Store-assigned identifier, 0 until the order is first persisted.
	pub id: OrderId,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// When the customer placed the order.
	pub time: DateTime<Utc>,
	/// Dishes to prepare, in ticket order.
	pub dishes: Vec<Dish>,
	/// Channel the order came in through.
	pub source: OrderSource,
}

impl Order {
	/// Builds an unsaved pending order from a creation request.
	pub fn pending(request: NewOrder) -> Self {
		Self {
			id: 0,
			status: OrderStatus::Pending,
			time: request.time,
			dishes: request.dishes,
			source: request.source,
		}
	}

	/// Returns true once the store has assigned an identifier.
	pub fn is_persisted(&self) -> bool {
		self.id != 0
	}
}

/// An order together with its full status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithStatusHistory {
	#[serde(flatten)]
	pub order: Order,
	pub status_history: Vec<OrderStatusHistory>,
}
