use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const SETUP_COMPLETED: &str = "setup_completed";
pub const UPDATE_NOTIFICATIONS_ENABLED: &str = "update_notifications_enabled";
pub const LIBRARY_APP_IDS: &str = "library_app_ids";
pub const LAST_UPDATE_CHECK: &str = "last_update_check";
pub const AVAILABLE_UPDATES: &str = "available_updates";
pub const AVAILABLE_UPDATES_JSON: &str = "available_updates_json";

/// Local key-value persistence.
///
/// `update` must apply the closure and store its result under one lock so
/// that read-modify-write of a value cannot lose a concurrent write.
/// `set_many` stores every entry or none of them.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.set_many(vec![(key.to_string(), value)])
    }
    fn set_many(&self, entries: Vec<(String, Value)>) -> anyhow::Result<()>;
    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<Value>) -> Value,
    ) -> anyhow::Result<Value>;
}

/// Store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub values: Mutex<BTreeMap<String, Value>>,
}

/// Store persisted as one JSON object on disk, written through on every change.
pub struct JsonFileStore {
    pub path: PathBuf,
    pub values: Mutex<BTreeMap<String, Value>>,
}

/// Typed access to the persisted preference keys.
#[derive(Clone)]
pub struct Preferences {
    pub store: Arc<dyn KeyValueStore>,
}
