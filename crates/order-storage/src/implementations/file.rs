//! File-based storage backend.
//!
//! Each key is stored in its own file. The namespace part of the key selects a
//! subdirectory, so `orders:17` lives at `<storage_path>/orders/17.bin`.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use order_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use std::path::PathBuf;
use tokio::fs;

const DEFAULT_STORAGE_PATH: &str = "./data/storage";
const FILE_EXTENSION: &str = "bin";

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size header written ahead of every payload.
///
/// Binary layout (16 bytes total):
/// - [0-3]: Magic bytes "ORDS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Payload length in bytes (u64, little-endian)
/// - [14-15]: Reserved
#[derive(Debug, Clone, PartialEq)]
struct FileHeader {
	version: u16,
	payload_len: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ORDS";
	const VERSION: u16 = 1;
	const SIZE: usize = 16;

	fn for_payload(payload: &[u8]) -> Self {
		Self {
			version: Self::VERSION,
			payload_len: payload.len() as u64,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.payload_len.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut len_bytes = [0u8; 8];
		len_bytes.copy_from_slice(&bytes[6..14]);

		Ok(Self {
			version,
			payload_len: u64::from_le_bytes(len_bytes),
		})
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Maps `namespace:id` to `<base>/<namespace>/<id>.bin`.
	///
	/// Path separators inside either part are replaced so a key can never
	/// escape the storage directory.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let sanitize = |part: &str| part.replace(['/', '\\', '.'], "_");
		match key.split_once(':') {
			Some((namespace, id)) => self
				.base_path
				.join(sanitize(namespace))
				.join(format!("{}.{}", sanitize(id), FILE_EXTENSION)),
			None => self
				.base_path
				.join(format!("{}.{}", sanitize(key), FILE_EXTENSION)),
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::deserialize(&data)?;
		let payload = &data[FileHeader::SIZE..];
		if payload.len() as u64 != header.payload_len {
			return Err(StorageError::Backend(format!(
				"Truncated file {}: expected {} bytes, found {}",
				path.display(),
				header.payload_len,
				payload.len()
			)));
		}

		Ok(payload.to_vec())
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let header = FileHeader::for_payload(&value);
		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(&value);

		// Readers never observe a partially written file
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let dir = self.base_path.join(namespace.replace(['/', '\\', '.'], "_"));
		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(FILE_EXTENSION)) {
				continue;
			}
			match path.file_stem().and_then(|stem| stem.to_str()) {
				Some(id) => keys.push(format!("{}:{}", namespace, id)),
				None => tracing::debug!("Skipping non UTF-8 file name {:?}", path),
			}
		}
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
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
							Err("storage_path cannot be empty".to_string())
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
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf())
	}

	#[tokio::test]
	async fn test_round_trip_with_header() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("orders:1", b"{\"id\":1}".to_vec())
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("orders:1").await.unwrap(),
			b"{\"id\":1}".to_vec()
		);

		let raw = std::fs::read(dir.path().join("orders").join("1.bin")).unwrap();
		assert_eq!(&raw[0..4], b"ORDS");
		assert_eq!(raw.len(), FileHeader::SIZE + 8);
	}

	#[tokio::test]
	async fn test_missing_key_is_not_found() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		assert!(matches!(
			storage.get_bytes("orders:404").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("orders:404").await.unwrap());
		storage.delete("orders:404").await.unwrap();
	}

	#[tokio::test]
	async fn test_truncated_file_is_backend_error() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		storage.set_bytes("orders:2", vec![7; 32]).await.unwrap();

		let path = dir.path().join("orders").join("2.bin");
		let raw = std::fs::read(&path).unwrap();
		std::fs::write(&path, &raw[..raw.len() - 4]).unwrap();

		assert!(matches!(
			storage.get_bytes("orders:2").await,
			Err(StorageError::Backend(_))
		));
	}

	#[tokio::test]
	async fn test_foreign_file_rejected() {
		let dir = TempDir::new().unwrap();
		std::fs::create_dir_all(dir.path().join("orders")).unwrap();
		std::fs::write(dir.path().join("orders").join("3.bin"), b"plain json, no header").unwrap();

		let storage = storage(&dir);
		assert!(matches!(
			storage.get_bytes("orders:3").await,
			Err(StorageError::Backend(_))
		));
	}

	#[tokio::test]
	async fn test_list_keys_per_namespace() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		storage.set_bytes("orders:1", vec![1]).await.unwrap();
		storage.set_bytes("orders:2", vec![2]).await.unwrap();
		storage.set_bytes("order_items:5", vec![3]).await.unwrap();

		let mut keys = storage.list_keys("orders").await.unwrap();
		keys.sort();
		assert_eq!(keys, vec!["orders:1", "orders:2"]);
		assert!(storage.list_keys("sequences").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_key_cannot_escape_base_directory() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		let path = storage.get_file_path("orders:../../etc/passwd");
		assert!(path.starts_with(dir.path()));
	}

	#[test]
	fn test_schema_rejects_empty_path() {
		let config: toml::Value = toml::from_str("storage_path = \"  \"").unwrap();
		assert!(FileStorageSchema.validate(&config).is_err());

		let config: toml::Value = toml::from_str("storage_path = \"/var/lib/orders\"").unwrap();
		assert!(FileStorageSchema.validate(&config).is_ok());
	}

	#[test]
	fn test_header_rejects_newer_version() {
		let mut bytes = FileHeader::for_payload(b"x").serialize();
		bytes[4..6].copy_from_slice(&2u16.to_le_bytes());
		assert!(FileHeader::deserialize(&bytes).is_err());
	}
}
