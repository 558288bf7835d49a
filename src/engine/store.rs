//! Record persistence: one JSON document per trigger/action id.
//!
//! No locking; the single-pass poll loop serializes access. The save
//! operations merge a partial config onto whatever is already stored,
//! so callers can update one field without re-sending the record.

use crate::engine::action::Action;
use crate::engine::trigger::Trigger;
use crate::error::EngineError;
use anyhow::Result;
use std::path::PathBuf;

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::RwLock;

const TRIGGER_DIR: &str = "triggers";
const ACTION_DIR: &str = "actions";

// ============================================================================
// Storage Abstraction
// ============================================================================

/// Storage abstraction over the state directory.
pub trait Storage {
    fn read(&self, key: &str) -> Result<Vec<u8>>;
    fn write(&self, key: &str, data: &[u8]) -> Result<()>;
    fn exists(&self, key: &str) -> bool;
    fn delete(&self, key: &str) -> Result<()>;
    /// Ids (file stems) under a directory, sorted; missing directory is
    /// an empty listing, not an error.
    fn list(&self, dir: &str) -> Result<Vec<String>>;
}

/// File-based storage rooted at a state directory.
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let path = base_dir.into();
        std::fs::create_dir_all(&path)?;
        Ok(Self { base_dir: path })
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.base_dir.join(key))?)
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.base_dir.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(path, data)?)
    }

    fn exists(&self, key: &str) -> bool {
        self.base_dir.join(key).exists()
    }

    fn delete(&self, key: &str) -> Result<()> {
        Ok(std::fs::remove_file(self.base_dir.join(key))?)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let path = self.base_dir.join(dir);
        let entries = match std::fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory storage for testing.
#[cfg(test)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let data = self.data.read().unwrap();
        data.get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Key not found: {}", key))
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut storage = self.data.write().unwrap();
        storage.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.data.read().unwrap().contains_key(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.data.write().unwrap().remove(key);
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let prefix = format!("{dir}/");
        let data = self.data.read().unwrap();
        let mut ids: Vec<String> = data
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|k| k.strip_suffix(".json"))
            .map(|k| k.to_string())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

// ============================================================================
// Typed Records
// ============================================================================

fn trigger_key(id: &str) -> String {
    format!("{TRIGGER_DIR}/{id}.json")
}

fn action_key(id: &str) -> String {
    format!("{ACTION_DIR}/{id}.json")
}

/// Raw record by path; absence yields an empty object, per the
/// persistence contract.
fn read_record(storage: &dyn Storage, key: &str) -> serde_json::Value {
    storage
        .read(key)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()))
}

/// Merge a partial config onto the stored record (shallow, new fields
/// win) and parse the result through the closed type registry.
fn merged(storage: &dyn Storage, key: &str, partial: serde_json::Value) -> serde_json::Value {
    let mut base = read_record(storage, key);
    if let (Some(base_map), serde_json::Value::Object(new_map)) = (base.as_object_mut(), partial) {
        for (field, value) in new_map {
            base_map.insert(field, value);
        }
    }
    base
}

pub fn load_trigger(storage: &dyn Storage, id: &str) -> Result<Trigger, EngineError> {
    let key = trigger_key(id);
    if !storage.exists(&key) {
        return Err(EngineError::UnknownTrigger(id.to_string()));
    }
    let bytes = storage
        .read(&key)
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::BadRecord {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

pub fn save_trigger(storage: &dyn Storage, partial: serde_json::Value) -> Result<Trigger, EngineError> {
    let id = partial
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::BadRecord {
            id: "<unset>".to_string(),
            reason: "trigger config needs an 'id'".to_string(),
        })?
        .to_string();
    let record = merged(storage, &trigger_key(&id), partial);
    let trigger: Trigger =
        serde_json::from_value(record).map_err(|e| EngineError::BadRecord {
            id: id.clone(),
            reason: e.to_string(),
        })?;
    persist_trigger(storage, &trigger)?;
    Ok(trigger)
}

/// Write a trigger back verbatim (poll-loop state updates).
pub fn persist_trigger(storage: &dyn Storage, trigger: &Trigger) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(trigger).map_err(|e| EngineError::BadRecord {
        id: trigger.id.clone(),
        reason: e.to_string(),
    })?;
    storage
        .write(&trigger_key(&trigger.id), &bytes)
        .map_err(|e| EngineError::Storage(e.to_string()))
}

pub fn delete_trigger(storage: &dyn Storage, id: &str) -> Result<(), EngineError> {
    storage
        .delete(&trigger_key(id))
        .map_err(|e| EngineError::Storage(e.to_string()))
}

pub fn list_triggers(storage: &dyn Storage) -> Result<Vec<String>, EngineError> {
    storage
        .list(TRIGGER_DIR)
        .map_err(|e| EngineError::Storage(e.to_string()))
}

pub fn load_action(storage: &dyn Storage, id: &str) -> Result<Action, EngineError> {
    let key = action_key(id);
    if !storage.exists(&key) {
        return Err(EngineError::UnknownAction(id.to_string()));
    }
    let bytes = storage
        .read(&key)
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::BadRecord {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

pub fn save_action(storage: &dyn Storage, partial: serde_json::Value) -> Result<Action, EngineError> {
    let id = partial
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::BadRecord {
            id: "<unset>".to_string(),
            reason: "action config needs an 'id'".to_string(),
        })?
        .to_string();
    let record = merged(storage, &action_key(&id), partial);
    let action: Action = serde_json::from_value(record).map_err(|e| EngineError::BadRecord {
        id: id.clone(),
        reason: e.to_string(),
    })?;
    persist_action(storage, &action)?;
    Ok(action)
}

pub fn persist_action(storage: &dyn Storage, action: &Action) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(action).map_err(|e| EngineError::BadRecord {
        id: action.id.clone(),
        reason: e.to_string(),
    })?;
    storage
        .write(&action_key(&action.id), &bytes)
        .map_err(|e| EngineError::Storage(e.to_string()))
}

pub fn delete_action(storage: &dyn Storage, id: &str) -> Result<(), EngineError> {
    storage
        .delete(&action_key(id))
        .map_err(|e| EngineError::Storage(e.to_string()))
}

pub fn list_actions(storage: &dyn Storage) -> Result<Vec<String>, EngineError> {
    storage
        .list(ACTION_DIR)
        .map_err(|e| EngineError::Storage(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
