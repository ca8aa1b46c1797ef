//! File-based key-value storage with zstd compression

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::KeyValueStore;

/// File-based key-value storage
///
/// One compressed file per key:
/// ```text
/// root/
///   outbox.sync_queue.zst
///   other%2Fkey.zst        # keys are percent-encoded into file names
/// ```
///
/// Writes go to a temp file that is then renamed over the old value, so a
/// crash mid-write leaves the previous value intact.
pub struct FileKvStore {
    root: PathBuf,
    compression_level: i32,
}

impl FileKvStore {
    /// Create a store rooted at the given directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory {}", root.display()))?;
        Ok(Self {
            root,
            compression_level: 3,
        })
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.zst", urlencoding::encode(key)))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.value_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let compressed =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let raw = zstd::decode_all(compressed.as_slice())
            .with_context(|| format!("Failed to decompress {}", path.display()))?;
        let value = String::from_utf8(raw)
            .with_context(|| format!("Stored value in {} is not UTF-8", path.display()))?;

        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.value_path(key);
        let compressed = zstd::encode_all(value.as_bytes(), self.compression_level)
            .context("Failed to compress value")?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &compressed)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to move value into {}", path.display()))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.value_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_get() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("kv")).unwrap();

        store.set("outbox.sync_queue", "[]").unwrap();
        assert_eq!(store.get("outbox.sync_queue").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_get_missing() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path()).unwrap();
        assert!(store.get("nothing").unwrap().is_none());
    }

    #[test]
    fn test_keys_with_separators_stay_inside_root() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("kv")).unwrap();

        store.set("../escape/attempt", "value").unwrap();
        assert_eq!(store.get("../escape/attempt").unwrap().as_deref(), Some("value"));
        assert!(!dir.path().join("escape").exists());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path()).unwrap();

        store.set("queue", "first").unwrap();
        store.set("queue", "second").unwrap();
        assert_eq!(store.get("queue").unwrap().as_deref(), Some("second"));

        store.remove("queue").unwrap();
        assert!(store.get("queue").unwrap().is_none());
        store.remove("queue").unwrap();
    }

    #[test]
    fn test_values_are_compressed_on_disk() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path()).unwrap();
        let value = "pending ".repeat(500);

        store.set("queue", &value).unwrap();
        let on_disk = fs::metadata(dir.path().join("queue.zst")).unwrap().len();
        assert!((on_disk as usize) < value.len());
    }
}
