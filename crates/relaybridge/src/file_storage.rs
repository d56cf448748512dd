use crate::{Error, Result, StorageAdapter};
use std::fs;
use std::path::{Path, PathBuf};

/// One JSON file per key, named after the percent-encoded key so that any
/// event id survives the round trip through the file system.
pub struct FileStorageAdapter {
    base_path: PathBuf,
}

impl FileStorageAdapter {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path)
            .map_err(|e| Error::Storage(format!("Failed to create directory: {}", e)))?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl StorageAdapter for FileStorageAdapter {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_to_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read file: {}", e))),
        }
    }

    fn put(&self, key: &str, value: String) -> Result<()> {
        let path = self.key_to_path(key);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, value)
            .map_err(|e| Error::Storage(format!("Failed to write file: {}", e)))?;
        fs::rename(&temp_path, &path)
            .map_err(|e| Error::Storage(format!("Failed to replace file: {}", e)))?;
        Ok(())
    }

    fn del(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_to_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("Failed to delete file: {}", e))),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_path)
            .map_err(|e| Error::Storage(format!("Failed to read directory: {}", e)))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::Storage(format!("Failed to read dir entry: {}", e)))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(stem) = file_name.strip_suffix(".json") else {
                continue;
            };
            let Ok(key) = urlencoding::decode(stem) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key.into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_del() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(adapter.get("events/1").unwrap().is_none());
        adapter.put("events/1", "[\"a\"]".to_string()).unwrap();
        assert_eq!(adapter.get("events/1").unwrap(), Some("[\"a\"]".to_string()));

        adapter.del("events/1").unwrap();
        adapter.del("events/1").unwrap();
        assert!(adapter.get("events/1").unwrap().is_none());
    }

    #[test]
    fn keys_with_separators_round_trip_through_list() {
        let temp_dir = TempDir::new().unwrap();
        let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();

        adapter.put("v1/events/1/local/$abc:example.org", "x".to_string()).unwrap();
        adapter.put("v1/events/1/local_other", "y".to_string()).unwrap();
        adapter.put("v1/flags/1/all", "true".to_string()).unwrap();

        assert_eq!(
            adapter.list("v1/events/1/local/").unwrap(),
            vec!["v1/events/1/local/$abc:example.org"]
        );
        assert_eq!(adapter.list("").unwrap().len(), 3);
    }

    #[test]
    fn data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();
            adapter.put("k", "v".to_string()).unwrap();
        }
        let adapter = FileStorageAdapter::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(adapter.get("k").unwrap(), Some("v".to_string()));
    }
}
