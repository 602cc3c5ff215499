//! File-based storage backend.
//!
//! All tables live in memory and are written to a single snapshot file after
//! every committed change. The snapshot is replaced atomically by writing a
//! temporary file and renaming it over the previous one, so a crash leaves
//! either the old or the new state on disk, never a mix.

use crate::tables::Tables;
use crate::{
	OrderMutation, OrderStore, PositionError, PositionTable, PositionWork, StatusHistoryStore,
	StorageBackends, StorageError,
};
use async_trait::async_trait;
use fs2::FileExt;
use orderq_types::{
	ConfigSchema, Field, FieldType, Order, OrderFilters, OrderId, OrderStatusHistory,
	PositionEntry, Schema, ValidationError,
};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

const DEFAULT_STORAGE_PATH: &str = "./data/orders.db";

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size snapshot header.
///
/// Binary layout (16 bytes total):
/// - [0-3]: Magic bytes "ORDQ"
/// - [4-5]: Version (u16, little-endian)
/// - [6-15]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	magic: [u8; 4],
	version: u16,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ORDQ";
	const VERSION: u16 = 1;
	const SIZE: usize = 16;

	fn current() -> Self {
		Self {
			magic: *Self::MAGIC,
			version: Self::VERSION,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(&self.magic);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}

		let mut magic = [0u8; 4];
		magic.copy_from_slice(&bytes[0..4]);
		if magic != *Self::MAGIC {
			return Err(StorageError::Backend("Not an order store file".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		Ok(Self { magic, version })
	}
}

fn encode(tables: &Tables) -> Result<Vec<u8>, StorageError> {
	let body = serde_json::to_vec(tables).map_err(|e| StorageError::Serialization(e.to_string()))?;

	let mut bytes = Vec::with_capacity(FileHeader::SIZE + body.len());
	bytes.extend_from_slice(&FileHeader::current().serialize());
	bytes.extend_from_slice(&body);
	Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<Tables, StorageError> {
	FileHeader::deserialize(bytes)?;
	serde_json::from_slice(&bytes[FileHeader::SIZE..])
		.map_err(|e| StorageError::Serialization(e.to_string()))
}

/// File-based storage implementation.
///
/// Holds an exclusive lock on a sibling `.lock` file for as long as it is
/// alive, so a second process cannot open the same store.
pub struct FileStorage {
	path: PathBuf,
	tables: RwLock<Tables>,
	_lock: File,
}

impl FileStorage {
	/// Opens the store at `path`, creating parent directories as needed.
	///
	/// A missing snapshot file starts an empty store.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let path = path.into();
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			std::fs::create_dir_all(parent).map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let lock = acquire_lock(&path)?;

		let tables = match std::fs::read(&path) {
			Ok(bytes) => decode(&bytes)?,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Tables::default(),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		tracing::debug!(path = %path.display(), "Opened order store");

		Ok(Self {
			path,
			tables: RwLock::new(tables),
			_lock: lock,
		})
	}

	/// Applies `op` to the tables and persists the result.
	///
	/// If the snapshot cannot be written the tables are restored to their
	/// state before `op`.
	async fn write<T, E, F>(&self, op: F) -> Result<T, E>
	where
		F: FnOnce(&mut Tables) -> Result<T, E>,
		E: From<StorageError>,
	{
		let mut tables = self.tables.write().await;
		let before = tables.clone();

		let out = op(&mut tables)?;

		if let Err(e) = self.persist(&tables).await {
			tracing::warn!(path = %self.path.display(), error = %e, "Failed to write snapshot");
			*tables = before;
			return Err(e.into());
		}

		Ok(out)
	}

	async fn persist(&self, tables: &Tables) -> Result<(), StorageError> {
		let bytes = encode(tables)?;

		let temp_path = self.path.with_extension("tmp");
		tokio::fs::write(&temp_path, bytes)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		tokio::fs::rename(&temp_path, &self.path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

fn acquire_lock(path: &Path) -> Result<File, StorageError> {
	let lock_path = path.with_extension("lock");
	let file = OpenOptions::new()
		.create(true)
		.truncate(false)
		.write(true)
		.open(&lock_path)
		.map_err(|e| StorageError::Backend(e.to_string()))?;

	file.try_lock_exclusive().map_err(|e| {
		StorageError::Backend(format!(
			"Store {} is locked by another process: {}",
			path.display(),
			e
		))
	})?;

	Ok(file)
}

#[async_trait]
impl OrderStore for FileStorage {
	async fn save(&self, order: Order) -> Result<Order, StorageError> {
		self.write(|tables| tables.save_order(order)).await
	}

	async fn update(
		&self,
		id: OrderId,
		mutation: OrderMutation<'_>,
	) -> Result<Option<Order>, StorageError> {
		self.write(|tables| Ok(tables.update_order(id, mutation))).await
	}

	async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StorageError> {
		Ok(self.tables.read().await.find_order(id))
	}

	async fn get_all(&self, filters: &OrderFilters) -> Result<Vec<Order>, StorageError> {
		Ok(self.tables.read().await.orders_matching(filters))
	}
}

#[async_trait]
impl StatusHistoryStore for FileStorage {
	async fn add_current_status(&self, order: &Order) -> Result<(), StorageError> {
		self.write(|tables| tables.append_history(order)).await
	}

	async fn get_history(&self, id: OrderId) -> Result<Vec<OrderStatusHistory>, StorageError> {
		Ok(self.tables.read().await.history_of(id))
	}
}

#[async_trait]
impl PositionTable for FileStorage {
	async fn transaction(&self, work: PositionWork<'_>) -> Result<(), PositionError> {
		self.write(|tables| tables.position_transaction(work)).await
	}

	async fn entries(&self) -> Result<Vec<PositionEntry>, StorageError> {
		Ok(self.tables.read().await.position_entries())
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".into())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Snapshot file (default: "./data/orders.db")
pub fn create_storage(config: &toml::Value) -> Result<StorageBackends, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	let storage = FileStorage::open(storage_path)?;
	Ok(StorageBackends::from_backend(Arc::new(storage)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl orderq_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {
	fn config_schema() -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}
