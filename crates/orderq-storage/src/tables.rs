//! Table state shared by the in-memory and file backends.
//!
//! Backends wrap [`Tables`] in a lock; every method here assumes the caller
//! holds it, so each call is one serializable unit.

use crate::{OrderMutation, PositionError, PositionTransaction, PositionWork, StorageError};
use chrono::{DateTime, Utc};
use orderq_types::{
	Order, OrderFilters, OrderId, OrderStatus, OrderStatusHistory, PositionEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryRow {
	order_id: OrderId,
	seq: u64,
	status: OrderStatus,
	timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
	orders: BTreeMap<OrderId, Order>,
	last_order_id: OrderId,
	history: Vec<HistoryRow>,
	positions: PositionIndex,
}

impl Tables {
	pub(crate) fn save_order(&mut self, mut order: Order) -> Result<Order, StorageError> {
		if !order.is_persisted() {
			self.last_order_id += 1;
			order.id = self.last_order_id;
		} else if !self.orders.contains_key(&order.id) {
			return Err(StorageError::NotFound(format!("order {}", order.id)));
		}

		self.orders.insert(order.id, order.clone());
		Ok(order)
	}

	/// Applies `mutation` to a copy of the order and keeps it if accepted.
	pub(crate) fn update_order(&mut self, id: OrderId, mutation: OrderMutation<'_>) -> Option<Order> {
		let stored = self.orders.get_mut(&id)?;
		let mut draft = stored.clone();
		if mutation(&mut draft) {
			draft.id = id;
			*stored = draft;
		}
		Some(stored.clone())
	}

	pub(crate) fn find_order(&self, id: OrderId) -> Option<Order> {
		self.orders.get(&id).cloned()
	}

	pub(crate) fn orders_matching(&self, filters: &OrderFilters) -> Vec<Order> {
		let mut orders: Vec<Order> = self
			.orders
			.values()
			.filter(|order| filters.matches(order))
			.cloned()
			.collect();

		if filters.priority_sort {
			// Unqueued orders go last, by id.
			orders.sort_by_key(|order| {
				let position = self.positions.get(order.id);
				(position.is_none(), position, order.id)
			});
		}

		orders
	}

	pub(crate) fn append_history(&mut self, order: &Order) -> Result<(), StorageError> {
		if !self.orders.contains_key(&order.id) {
			return Err(StorageError::NotFound(format!("order {}", order.id)));
		}

		let seq = self.history.len() as u64 + 1;
		self.history.push(HistoryRow {
			order_id: order.id,
			seq,
			status: order.status,
			timestamp: Utc::now(),
		});
		Ok(())
	}

	pub(crate) fn history_of(&self, id: OrderId) -> Vec<OrderStatusHistory> {
		let mut rows: Vec<&HistoryRow> =
			self.history.iter().filter(|row| row.order_id == id).collect();
		rows.sort_by_key(|row| (row.timestamp, row.seq));
		rows.into_iter()
			.map(|row| OrderStatusHistory {
				status: row.status,
				timestamp: row.timestamp,
			})
			.collect()
	}

	pub(crate) fn position_entries(&self) -> Vec<PositionEntry> {
		self.positions.entries()
	}

	/// Runs `work` against the position index, undoing its changes on failure.
	pub(crate) fn position_transaction(&mut self, work: PositionWork<'_>) -> Result<(), PositionError> {
		let mut tx = JournaledPositions {
			index: &mut self.positions,
			undo: Vec::new(),
		};

		match work(&mut tx) {
			Ok(()) => Ok(()),
			Err(e) => {
				tx.rollback();
				Err(e)
			},
		}
	}
}

/// Position rows indexed both by order and by position.
///
/// The `(position, order_id)` set lets range shifts visit only the rows in
/// the range and tolerates two rows sharing a position mid-transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<PositionEntry>", into = "Vec<PositionEntry>")]
struct PositionIndex {
	by_order: HashMap<OrderId, u64>,
	by_position: BTreeSet<(u64, OrderId)>,
}

impl PositionIndex {
	fn get(&self, order_id: OrderId) -> Option<u64> {
		self.by_order.get(&order_id).copied()
	}

	fn max(&self) -> u64 {
		self.by_position.last().map(|(position, _)| *position).unwrap_or(0)
	}

	fn entries(&self) -> Vec<PositionEntry> {
		self.by_position
			.iter()
			.map(|(position, order_id)| PositionEntry::new(*order_id, *position))
			.collect()
	}

	fn put(&mut self, order_id: OrderId, position: u64) {
		if let Some(old) = self.by_order.insert(order_id, position) {
			self.by_position.remove(&(old, order_id));
		}
		self.by_position.insert((position, order_id));
	}

	fn take(&mut self, order_id: OrderId) -> Option<u64> {
		let position = self.by_order.remove(&order_id)?;
		self.by_position.remove(&(position, order_id));
		Some(position)
	}

	fn shift(&mut self, range: Range<u64>, delta: i64) -> Result<Vec<OrderId>, StorageError> {
		if range.is_empty() {
			return Ok(Vec::new());
		}

		let rows: Vec<(u64, OrderId)> = self
			.by_position
			.range((range.start, OrderId::MIN)..(range.end, OrderId::MIN))
			.copied()
			.collect();

		let mut shifted = Vec::with_capacity(rows.len());
		for (position, order_id) in &rows {
			match position.checked_add_signed(delta) {
				Some(next) if next > 0 => shifted.push((next, *order_id)),
				_ => {
					return Err(StorageError::Backend(format!(
						"shifting position {} by {} leaves the valid range",
						position, delta
					)))
				},
			}
		}

		for row in &rows {
			self.by_position.remove(row);
		}
		for (position, order_id) in &shifted {
			self.by_order.insert(*order_id, *position);
			self.by_position.insert((*position, *order_id));
		}

		Ok(shifted.into_iter().map(|(_, order_id)| order_id).collect())
	}
}

impl From<Vec<PositionEntry>> for PositionIndex {
	fn from(entries: Vec<PositionEntry>) -> Self {
		let mut index = PositionIndex::default();
		for entry in entries {
			index.put(entry.order_id, entry.position);
		}
		index
	}
}

impl From<PositionIndex> for Vec<PositionEntry> {
	fn from(index: PositionIndex) -> Self {
		index.entries()
	}
}

/// Inverse of a change made inside a transaction.
enum Undo {
	Insert(OrderId),
	Delete(OrderId, u64),
	Move(OrderId, u64),
	Shift(Vec<OrderId>, i64),
}

struct JournaledPositions<'a> {
	index: &'a mut PositionIndex,
	undo: Vec<Undo>,
}

impl JournaledPositions<'_> {
	fn rollback(&mut self) {
		while let Some(undo) = self.undo.pop() {
			match undo {
				Undo::Insert(order_id) => {
					self.index.take(order_id);
				},
				Undo::Delete(order_id, position) | Undo::Move(order_id, position) => {
					self.index.put(order_id, position);
				},
				Undo::Shift(order_ids, delta) => {
					for order_id in order_ids {
						if let Some(position) = self.index.get(order_id) {
							self.index
								.put(order_id, position.saturating_add_signed(-delta));
						}
					}
				},
			}
		}
	}
}

impl PositionTransaction for JournaledPositions<'_> {
	fn position_of(&self, order_id: OrderId) -> Option<u64> {
		self.index.get(order_id)
	}

	fn max_position(&self) -> u64 {
		self.index.max()
	}

	fn insert(&mut self, order_id: OrderId, position: u64) -> Result<(), StorageError> {
		if position == 0 {
			return Err(StorageError::Backend("positions start at 1".into()));
		}
		if self.index.get(order_id).is_some() {
			return Err(StorageError::Backend(format!(
				"order {} already has a position row",
				order_id
			)));
		}

		self.index.put(order_id, position);
		self.undo.push(Undo::Insert(order_id));
		Ok(())
	}

	fn shift_range(&mut self, range: Range<u64>, delta: i64) -> Result<usize, StorageError> {
		let moved = self.index.shift(range, delta)?;
		let count = moved.len();
		if count > 0 {
			self.undo.push(Undo::Shift(moved, delta));
		}
		Ok(count)
	}

	fn set_position(&mut self, order_id: OrderId, position: u64) -> Result<(), StorageError> {
		if position == 0 {
			return Err(StorageError::Backend("positions start at 1".into()));
		}
		let old = self
			.index
			.get(order_id)
			.ok_or_else(|| StorageError::NotFound(format!("position of order {}", order_id)))?;

		self.index.put(order_id, position);
		self.undo.push(Undo::Move(order_id, old));
		Ok(())
	}

	fn delete(&mut self, order_id: OrderId) -> Result<(), StorageError> {
		if let Some(old) = self.index.take(order_id) {
			self.undo.push(Undo::Delete(order_id, old));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::position_work;
	use orderq_types::{Dish, OrderSource};

	fn order(status: OrderStatus) -> Order {
		Order {
			id: 0,
			status,
			time: Utc::now(),
			dishes: vec![Dish::new("Ramen")],
			source: OrderSource::InPerson,
		}
	}

	fn queued(order_ids: &[OrderId]) -> Tables {
		let mut tables = Tables::default();
		for (index, order_id) in order_ids.iter().enumerate() {
			tables.positions.put(*order_id, index as u64 + 1);
		}
		tables
	}

	#[test]
	fn test_save_assigns_sequential_ids() {
		let mut tables = Tables::default();
		let first = tables.save_order(order(OrderStatus::Pending)).unwrap();
		let second = tables.save_order(order(OrderStatus::Pending)).unwrap();
		assert_eq!((first.id, second.id), (1, 2));

		let mut updated = first.clone();
		updated.status = OrderStatus::Preparing;
		tables.save_order(updated).unwrap();
		assert_eq!(tables.find_order(1).unwrap().status, OrderStatus::Preparing);

		let mut unknown = order(OrderStatus::Pending);
		unknown.id = 42;
		assert!(matches!(tables.save_order(unknown), Err(StorageError::NotFound(_))));
	}

	#[test]
	fn test_priority_sort_puts_unqueued_last() {
		let mut tables = Tables::default();
		for _ in 0..3 {
			tables.save_order(order(OrderStatus::Pending)).unwrap();
		}
		tables.positions.put(3, 1);
		tables.positions.put(1, 2);

		let ids: Vec<_> = tables
			.orders_matching(&OrderFilters::default().priority_sorted())
			.into_iter()
			.map(|o| o.id)
			.collect();
		assert_eq!(ids, vec![3, 1, 2]);
	}

	#[test]
	fn test_history_requires_existing_order() {
		let mut tables = Tables::default();
		let saved = tables.save_order(order(OrderStatus::Pending)).unwrap();
		tables.append_history(&saved).unwrap();

		let mut ready = saved.clone();
		ready.status = OrderStatus::Ready;
		tables.append_history(&ready).unwrap();

		let statuses: Vec<_> = tables.history_of(saved.id).into_iter().map(|h| h.status).collect();
		assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Ready]);

		assert!(tables.append_history(&order(OrderStatus::Pending)).is_err());
	}

	#[test]
	fn test_shift_only_touches_range() {
		let mut tables = queued(&[10, 20, 30, 40]);
		tables
			.position_transaction(position_work(|tx| {
				assert_eq!(tx.shift_range(2..4, 1)?, 2);
				Ok(())
			}))
			.unwrap();

		assert_eq!(
			tables.position_entries(),
			vec![
				PositionEntry::new(10, 1),
				PositionEntry::new(20, 3),
				PositionEntry::new(30, 4),
				PositionEntry::new(40, 4),
			]
		);
	}

	#[test]
	fn test_failed_transaction_rolls_back_every_change() {
		let mut tables = queued(&[10, 20, 30]);
		let before = tables.position_entries();

		let result = tables.position_transaction(position_work(|tx| {
			tx.shift_range(2..4, -1)?;
			tx.set_position(10, 3)?;
			tx.insert(50, 4)?;
			tx.delete(20)?;
			Err(StorageError::Backend("commit failed".into()).into())
		}));

		assert!(result.is_err());
		assert_eq!(tables.position_entries(), before);
	}

	#[test]
	fn test_shift_below_one_is_rejected_without_changes() {
		let mut tables = queued(&[10, 20]);
		let result = tables.position_transaction(position_work(|tx| {
			tx.shift_range(1..3, -1)?;
			Ok(())
		}));

		assert!(result.is_err());
		assert_eq!(
			tables.position_entries(),
			vec![PositionEntry::new(10, 1), PositionEntry::new(20, 2)]
		);
	}

	#[test]
	fn test_tables_roundtrip_through_json() {
		let mut tables = queued(&[7, 3]);
		tables.save_order(order(OrderStatus::Ready)).unwrap();

		let json = serde_json::to_vec(&tables).unwrap();
		let restored: Tables = serde_json::from_slice(&json).unwrap();
		assert_eq!(restored.position_entries(), tables.position_entries());
		assert_eq!(restored.find_order(1), tables.find_order(1));
		assert_eq!(restored.last_order_id, 1);
	}
}
