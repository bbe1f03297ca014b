use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{decode_data_url, encode_data_url, ImageRef};
use crate::storage::LocalStorage;

pub const HISTORY_STORAGE_KEY: &str = "innapse-ai-history";
pub const HISTORY_CAPACITY: usize = 18;

/// One produced image, kept as a `data:` URL exactly as it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryEntry(String);

impl HistoryEntry {
    pub fn from_image(mime_type: &str, bytes: &[u8]) -> Self {
        Self(encode_data_url(mime_type, bytes))
    }

    pub fn as_data_url(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Option<(String, Vec<u8>)> {
        decode_data_url(&self.0)
    }

    /// Short content hash used to tell entries apart in listings.
    pub fn short_id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }

    pub fn to_image_ref(&self, preview: impl Into<String>) -> anyhow::Result<ImageRef> {
        ImageRef::from_data_url(&self.0, preview)
    }
}

/// Most-recent-first list of produced images, capped at [`HISTORY_CAPACITY`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the persisted list. Anything unreadable yields an empty history.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<Vec<HistoryEntry>>(raw) {
            Ok(mut entries) => {
                entries.truncate(HISTORY_CAPACITY);
                Self { entries }
            }
            Err(err) => {
                log::warn!("discarding unreadable history: {err}");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn load(storage: &mut LocalStorage) -> Self {
        storage
            .get_item(HISTORY_STORAGE_KEY)
            .map(|raw| Self::from_json(&raw))
            .unwrap_or_default()
    }

    pub fn save(&self, storage: &mut LocalStorage) -> anyhow::Result<()> {
        storage.set_item(HISTORY_STORAGE_KEY, &self.to_json())
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(idx: u8) -> HistoryEntry {
        HistoryEntry::from_image("image/png", &[idx])
    }

    #[test]
    fn record_keeps_the_newest_eighteen_first() {
        let mut history = History::new();
        for idx in 0..20u8 {
            history.record(entry(idx));
        }
        assert_eq!(history.len(), HISTORY_CAPACITY);
        let expected = (2..20u8).rev().map(entry).collect::<Vec<_>>();
        assert_eq!(history.entries(), expected.as_slice());
        assert_eq!(history.get(0), Some(&entry(19)));
        assert_eq!(history.get(17), Some(&entry(2)));
    }

    #[test]
    fn malformed_json_is_empty_history() {
        assert!(History::from_json("{oops").is_empty());
        assert!(History::from_json("{\"a\": 1}").is_empty());
        assert!(History::from_json("[1, 2]").is_empty());
    }

    #[test]
    fn oversized_persisted_list_is_truncated() {
        let raw = serde_json::to_string(
            &(0..25u8)
                .map(|idx| entry(idx).as_data_url().to_string())
                .collect::<Vec<String>>(),
        )
        .unwrap_or_default();
        let history = History::from_json(&raw);
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.get(0), Some(&entry(0)));
    }

    #[test]
    fn persists_as_plain_list_of_strings() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut storage = LocalStorage::new(temp.path().join("storage.json"));
        let mut history = History::new();
        history.record(entry(1));
        history.record(entry(2));
        history.save(&mut storage)?;

        let raw = storage.get_item(HISTORY_STORAGE_KEY).unwrap_or_default();
        let parsed: Vec<String> = serde_json::from_str(&raw)?;
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].starts_with("data:image/png;base64,"));

        assert_eq!(History::load(&mut storage), history);
        Ok(())
    }

    #[test]
    fn load_without_stored_key_is_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut storage = LocalStorage::new(temp.path().join("storage.json"));
        assert!(History::load(&mut storage).is_empty());
        storage.set_item(HISTORY_STORAGE_KEY, "not json")?;
        assert!(History::load(&mut storage).is_empty());
        Ok(())
    }

    #[test]
    fn entry_decodes_back_to_image() -> anyhow::Result<()> {
        let entry = HistoryEntry::from_image("image/jpeg", &[1, 2, 3]);
        assert_eq!(
            entry.decode(),
            Some(("image/jpeg".to_string(), vec![1, 2, 3]))
        );
        let image = entry.to_image_ref("history #1")?;
        assert_eq!(image.bytes(), &[1, 2, 3]);
        assert_eq!(entry.short_id().len(), 8);
        Ok(())
    }
}
