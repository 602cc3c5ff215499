//! Queue position types.

use serde::{Deserialize, Serialize};

use crate::OrderId;

/// Queue position of an enqueued order.
///
/// Positions of all enqueued orders always form `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionEntry {
	pub order_id: OrderId,
	pub position: u64,
}

impl PositionEntry {
	pub fn new(order_id: OrderId, position: u64) -> Self {
		Self { order_id, position }
	}
}

/// Returns true if the entries, in any order, hold exactly the positions `1..=len`.
pub fn is_dense(entries: &[PositionEntry]) -> bool {
	let mut positions: Vec<u64> = entries.iter().map(|e| e.position).collect();
	positions.sort_unstable();
	positions
		.iter()
		.enumerate()
		.all(|(index, position)| *position == index as u64 + 1)
}
