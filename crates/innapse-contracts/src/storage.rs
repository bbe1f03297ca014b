use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// Key/value string store backed by one JSON object file, in the spirit of
/// browser `localStorage`.
///
/// Reads always refresh from disk. Writes merge only the keys this instance
/// touched into whatever is on disk, so two stores sharing a file do not
/// clobber each other's keys.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
    payload: Option<Map<String, Value>>,
    dirty_keys: Vec<String>,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: None,
            dirty_keys: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_item(&mut self, key: &str) -> Option<String> {
        let payload = self.ensure_loaded();
        payload.get(key).and_then(Value::as_str).map(str::to_string)
    }

    pub fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let payload = self.ensure_loaded();
        payload.insert(key.to_string(), Value::String(value.to_string()));
        self.mark_dirty(key);
        self.flush()
    }

    pub fn remove_item(&mut self, key: &str) -> anyhow::Result<()> {
        let payload = self.ensure_loaded();
        if payload.remove(key).is_none() {
            return Ok(());
        }
        self.mark_dirty(key);
        self.flush()
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        if self.payload.is_none() || self.dirty_keys.is_empty() {
            return Ok(());
        }

        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        if let Some(payload) = &self.payload {
            for key in &self.dirty_keys {
                match payload.get(key) {
                    Some(value) => {
                        on_disk.insert(key.clone(), value.clone());
                    }
                    None => {
                        on_disk.remove(key);
                    }
                }
            }
        }
        write_json_object(&self.path, &on_disk)?;
        self.payload = Some(on_disk);
        self.dirty_keys.clear();
        Ok(())
    }

    fn mark_dirty(&mut self, key: &str) {
        if !self.dirty_keys.iter().any(|existing| existing == key) {
            self.dirty_keys.push(key.to_string());
        }
    }

    fn ensure_loaded(&mut self) -> &mut Map<String, Value> {
        let fresh = read_json_object(&self.path).unwrap_or_default();
        self.payload.insert(fresh)
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::LocalStorage;

    #[test]
    fn set_then_get() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut storage = LocalStorage::new(temp.path().join("storage.json"));
        assert_eq!(storage.get_item("innapse-theme"), None);
        storage.set_item("innapse-theme", "dark")?;
        assert_eq!(storage.get_item("innapse-theme").as_deref(), Some("dark"));
        Ok(())
    }

    #[test]
    fn values_survive_a_new_instance() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("storage.json");
        LocalStorage::new(&path).set_item("key", "value")?;
        let mut reloaded = LocalStorage::new(&path);
        assert_eq!(reloaded.get_item("key").as_deref(), Some("value"));
        Ok(())
    }

    #[test]
    fn writers_sharing_a_file_merge_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let mut theme_writer = LocalStorage::new(&path);
        let mut history_writer = LocalStorage::new(&path);

        theme_writer.set_item("innapse-theme", "light")?;
        history_writer.set_item("innapse-ai-history", "[]")?;
        theme_writer.set_item("innapse-theme", "dark")?;

        let mut reloaded = LocalStorage::new(path);
        assert_eq!(reloaded.get_item("innapse-theme").as_deref(), Some("dark"));
        assert_eq!(
            reloaded.get_item("innapse-ai-history").as_deref(),
            Some("[]")
        );
        Ok(())
    }

    #[test]
    fn remove_item_deletes_only_that_key() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        let mut storage = LocalStorage::new(&path);
        storage.set_item("a", "1")?;
        storage.set_item("b", "2")?;
        storage.remove_item("a")?;
        storage.remove_item("missing")?;

        let mut reloaded = LocalStorage::new(path);
        assert_eq!(reloaded.get_item("a"), None);
        assert_eq!(reloaded.get_item("b").as_deref(), Some("2"));
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced_on_write() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("storage.json");
        std::fs::write(&path, "{not json")?;
        let mut storage = LocalStorage::new(&path);
        assert_eq!(storage.get_item("key"), None);
        storage.set_item("key", "value")?;
        assert_eq!(
            LocalStorage::new(&path).get_item("key").as_deref(),
            Some("value")
        );
        Ok(())
    }
}
