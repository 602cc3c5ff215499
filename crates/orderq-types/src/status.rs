//! Order status lifecycle types.
//!
//! Statuses are ordered by a fixed weight. A transition is only ever allowed
//! towards a strictly heavier status, and the two terminal statuses share
//! the maximum weight so nothing can leave them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Order received, kitchen has not started.
	Pending,
	/// Kitchen is working on the order.
	Preparing,
	/// Order is ready to be handed over.
	Ready,
	/// Order was handed over. Terminal.
	Done,
	/// Order was cancelled. Terminal.
	Cancelled,
}

impl OrderStatus {
	/// Every status, in lifecycle order.
	pub const ALL: [OrderStatus; 5] = [
		OrderStatus::Pending,
		OrderStatus::Preparing,
		OrderStatus::Ready,
		OrderStatus::Done,
		OrderStatus::Cancelled,
	];

	/// Ordinal used to compare statuses.
	///
	/// Done and Cancelled share the maximum weight.
	pub const fn weight(self) -> u8 {
		match self {
			OrderStatus::Pending => 10,
			OrderStatus::Preparing => 20,
			OrderStatus::Ready => 30,
			OrderStatus::Done | OrderStatus::Cancelled => 40,
		}
	}

	/// Returns true if no further transition is permitted.
	pub const fn is_terminal(self) -> bool {
		matches!(self, OrderStatus::Done | OrderStatus::Cancelled)
	}

	/// Returns true while the dish list may still be edited.
	pub const fn is_editable(self) -> bool {
		matches!(self, OrderStatus::Pending | OrderStatus::Preparing)
	}

	/// Returns the wire representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Preparing => "preparing",
			OrderStatus::Ready => "ready",
			OrderStatus::Done => "done",
			OrderStatus::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| UnknownStatus(s.to_string()))
	}
}

/// One row of an order's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
	/// Status the order entered.
	pub status: OrderStatus,
	/// When the row was recorded.
	pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_weights_strictly_increase_until_terminal() {
		assert!(OrderStatus::Pending.weight() < OrderStatus::Preparing.weight());
		assert!(OrderStatus::Preparing.weight() < OrderStatus::Ready.weight());
		assert!(OrderStatus::Ready.weight() < OrderStatus::Done.weight());
		assert_eq!(OrderStatus::Done.weight(), OrderStatus::Cancelled.weight());
	}

	#[test]
	fn test_terminal_and_editable_sets() {
		let terminal: Vec<_> = OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
		assert_eq!(terminal, vec![OrderStatus::Done, OrderStatus::Cancelled]);

		let editable: Vec<_> = OrderStatus::ALL.into_iter().filter(|s| s.is_editable()).collect();
		assert_eq!(editable, vec![OrderStatus::Pending, OrderStatus::Preparing]);
	}

	#[test]
	fn test_parse_matches_serde_names() {
		for status in OrderStatus::ALL {
			let json = serde_json::to_string(&status).unwrap();
			assert_eq!(json, format!("\"{}\"", status));
			assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
		}

		assert!("active".parse::<OrderStatus>().is_err());
	}
}
