//! Read filters for listing orders.

use serde::{Deserialize, Serialize};

use crate::{Order, OrderStatus};

/// Selection and ordering applied by `OrderStore::get_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilters {
	/// Keep orders in any of these statuses. Empty keeps everything.
	#[serde(default)]
	pub any_status: Vec<OrderStatus>,
	/// Sort by ascending queue position instead of by id.
	#[serde(default)]
	pub priority_sort: bool,
}

impl OrderFilters {
	/// Orders still on the kitchen floor, in service order.
	pub fn active() -> Self {
		Self {
			any_status: vec![
				OrderStatus::Pending,
				OrderStatus::Preparing,
				OrderStatus::Ready,
			],
			priority_sort: true,
		}
	}

	pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
		self.any_status.extend(statuses);
		self
	}

	pub fn priority_sorted(mut self) -> Self {
		self.priority_sort = true;
		self
	}

	/// Returns true if the order passes the status filter.
	pub fn matches(&self, order: &Order) -> bool {
		self.any_status.is_empty() || self.any_status.contains(&order.status)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::OrderSource;
	use chrono::Utc;

	fn order(status: OrderStatus) -> Order {
		Order {
			id: 1,
			status,
			time: Utc::now(),
			dishes: vec![],
			source: OrderSource::InPerson,
		}
	}

	#[test]
	fn test_empty_filter_matches_everything() {
		let filters = OrderFilters::default();
		for status in OrderStatus::ALL {
			assert!(filters.matches(&order(status)));
		}
	}

	#[test]
	fn test_active_filter_excludes_terminal() {
		let filters = OrderFilters::active();
		assert!(filters.priority_sort);
		assert!(filters.matches(&order(OrderStatus::Ready)));
		assert!(!filters.matches(&order(OrderStatus::Done)));
		assert!(!filters.matches(&order(OrderStatus::Cancelled)));
	}
}
