use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const WELCOME_PLAYED: &str = "welcome_played";

#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("Flag store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Flag store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(serde::Serialize, serde::Deserialize)]
struct FlagEnvelope {
    #[serde(default)]
    __meta: Meta,
    data: Value,
}

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct Meta {
    #[serde(default)]
    stored_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ttl: Option<u64>, // seconds
}

/// Small persisted key-value store for one-time UI flags.
///
/// Values are wrapped in an envelope carrying the write time and an optional
/// TTL; expired entries read as absent and are dropped on the next write.
pub struct FlagStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl FlagStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FlagError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Map::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    /// `flags.json` next to the settings file
    pub fn default_path() -> Option<PathBuf> {
        crate::settings::config_dir().map(|dir| dir.join("flags.json"))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let raw = self.entries.get(key)?;
        match serde_json::from_value::<FlagEnvelope>(raw.clone()) {
            Ok(envelope) => {
                if let (Some(ttl), Some(stored_at)) = (envelope.__meta.ttl, envelope.__meta.stored_at) {
                    let age = Utc::now().signed_duration_since(stored_at).num_seconds();
                    if age >= ttl as i64 {
                        return None;
                    }
                }
                Some(envelope.data)
            }
            // Plain values written by hand
            Err(_) => Some(raw.clone()),
        }
    }

    pub fn is_set(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    pub fn set(&mut self, key: &str, value: Value, ttl: Option<u64>) -> Result<(), FlagError> {
        let envelope = FlagEnvelope {
            __meta: Meta {
                stored_at: Some(Utc::now()),
                ttl,
            },
            data: value,
        };
        self.entries.insert(key.to_string(), serde_json::to_value(envelope)?);
        self.save()
    }

    pub fn remove(&mut self, key: &str) -> Result<(), FlagError> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), FlagError> {
        let expired: Vec<String> = self
            .entries
            .keys()
            .filter(|k| self.get(k).is_none())
            .cloned()
            .collect();
        for key in expired {
            self.entries.remove(&key);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_flag_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("flags.json");

        let mut store = FlagStore::open(&path).unwrap();
        assert!(!store.is_set(WELCOME_PLAYED));
        store.set(WELCOME_PLAYED, json!(true), None).unwrap();

        let reopened = FlagStore::open(&path).unwrap();
        assert!(reopened.is_set(WELCOME_PLAYED));
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let mut store = FlagStore::open(dir.path().join("flags.json")).unwrap();
        store.set("banner", json!("seen"), Some(0)).unwrap();
        assert_eq!(store.get("banner"), None);
    }

    #[test]
    fn test_plain_values_are_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flags.json");
        std::fs::write(&path, r#"{"welcome_played": true}"#).unwrap();
        let store = FlagStore::open(&path).unwrap();
        assert!(store.is_set(WELCOME_PLAYED));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let mut store = FlagStore::open(dir.path().join("flags.json")).unwrap();
        store.set("x", json!(1), None).unwrap();
        store.remove("x").unwrap();
        assert!(store.get("x").is_none());
    }
}
