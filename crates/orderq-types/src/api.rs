//! API types for the order queue HTTP API.

use serde::{Deserialize, Serialize};

use crate::{Dish, OrderFilters, OrderStatus, UnknownStatus};

/// API error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Body of a dish list replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDishesRequest {
	pub dishes: Vec<Dish>,
}

/// Query parameters accepted when listing orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOrdersQuery {
	/// Only return active orders, in queue order.
	#[serde(default)]
	pub active: bool,
	/// Comma-separated statuses to include, e.g. `ready,done`.
	#[serde(default)]
	pub status: Option<String>,
}

impl ListOrdersQuery {
	/// Builds the store filters for this query.
	///
	/// Statuses listed in `status` are added to the selection made by
	/// `active`.
	pub fn filters(&self) -> Result<OrderFilters, UnknownStatus> {
		let filters = if self.active {
			OrderFilters::active()
		} else {
			OrderFilters::default()
		};

		let Some(list) = &self.status else {
			return Ok(filters);
		};
		let statuses = list
			.split(',')
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::parse::<OrderStatus>)
			.collect::<Result<Vec<_>, _>>()?;

		Ok(filters.with_statuses(statuses))
	}
}
