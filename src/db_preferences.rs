pub use crate::db_preferences_stt::*;
use crate::update_check_worker_stt::UpdateRecord;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().ok().and_then(|g| g.get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("Preference store lock poisoned"))?;
        values.extend(entries);
        Ok(())
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<Value>) -> Value) -> Result<Value> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("Preference store lock poisoned"))?;
        let new_value = f(values.get(key).cloned());
        values.insert(key.to_string(), new_value.clone());
        Ok(new_value)
    }
}

impl JsonFileStore {
    /// Open the store, loading existing values if the file is present.
    pub fn open(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            let contents =
                fs::read_to_string(path).context("Failed to read preferences file")?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).context("Failed to parse preferences JSON")?
            }
        } else {
            BTreeMap::new()
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create preferences directory")?;
        }

        tracing::debug!("Opened preferences at {:?} ({} keys)", path, values.len());

        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }

    // Caller holds the lock, so writes to the file are serialized.
    fn persist(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        let json =
            serde_json::to_string_pretty(values).context("Failed to serialize preferences")?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).context("Failed to write preferences file")?;
        fs::rename(&tmp_path, &self.path).context("Failed to replace preferences file")?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().ok().and_then(|g| g.get(key).cloned())
    }

    // Changes are written to disk first and only then become visible.
    fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("Preference store lock poisoned"))?;
        let mut next = values.clone();
        next.extend(entries);
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<Value>) -> Value) -> Result<Value> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("Preference store lock poisoned"))?;
        let new_value = f(values.get(key).cloned());
        let mut next = values.clone();
        next.insert(key.to_string(), new_value.clone());
        self.persist(&next)?;
        *values = next;
        Ok(new_value)
    }
}

fn to_string_set(value: Option<Value>) -> BTreeSet<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => BTreeSet::new(),
    }
}

fn from_string_set(set: &BTreeSet<String>) -> Value {
    Value::Array(set.iter().cloned().map(Value::String).collect())
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.store
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    fn string_set(&self, key: &str) -> BTreeSet<String> {
        to_string_set(self.store.get(key))
    }

    fn update_string_set<F>(&self, key: &str, mut f: F) -> Result<BTreeSet<String>>
    where
        F: FnMut(&mut BTreeSet<String>),
    {
        let value = self.store.update(key, &mut |current| {
            let mut set = to_string_set(current);
            f(&mut set);
            from_string_set(&set)
        })?;
        Ok(to_string_set(Some(value)))
    }

    // === Setup & settings ===

    pub fn is_setup_completed(&self) -> bool {
        self.get_bool(SETUP_COMPLETED, false)
    }

    pub fn set_setup_completed(&self, completed: bool) -> Result<()> {
        self.store.set(SETUP_COMPLETED, Value::Bool(completed))
    }

    pub fn is_update_notifications_enabled(&self) -> bool {
        self.get_bool(UPDATE_NOTIFICATIONS_ENABLED, true)
    }

    pub fn set_update_notifications_enabled(&self, enabled: bool) -> Result<()> {
        self.store
            .set(UPDATE_NOTIFICATIONS_ENABLED, Value::Bool(enabled))
    }

    // === Library ===

    pub fn library_app_ids(&self) -> BTreeSet<String> {
        self.string_set(LIBRARY_APP_IDS)
    }

    pub fn add_to_library(&self, package_name: &str) -> Result<BTreeSet<String>> {
        self.update_string_set(LIBRARY_APP_IDS, |set| {
            set.insert(package_name.to_string());
        })
    }

    /// Add several packages in one atomic update.
    pub fn add_all_to_library<I>(&self, package_names: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut names: Vec<String> = package_names.into_iter().collect();
        self.update_string_set(LIBRARY_APP_IDS, |set| {
            set.extend(names.drain(..));
        })
    }

    pub fn remove_from_library(&self, package_name: &str) -> Result<BTreeSet<String>> {
        self.update_string_set(LIBRARY_APP_IDS, |set| {
            set.remove(package_name);
        })
    }

    // === Update check results ===

    pub fn last_update_check(&self) -> i64 {
        self.store
            .get(LAST_UPDATE_CHECK)
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    pub fn available_updates(&self) -> BTreeSet<String> {
        self.string_set(AVAILABLE_UPDATES)
    }

    pub fn available_updates_json(&self) -> String {
        self.store
            .get(AVAILABLE_UPDATES_JSON)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "[]".to_string())
    }

    /// Store the result of an update check: the package names, the record
    /// list and the check time, written together.
    pub fn save_update_check(&self, updates: &[UpdateRecord], checked_at: i64) -> Result<()> {
        let names: BTreeSet<String> = updates.iter().map(|u| u.package_name.clone()).collect();
        let json = serde_json::to_string(updates).context("Failed to serialize update records")?;
        self.store.set_many(vec![
            (AVAILABLE_UPDATES.to_string(), from_string_set(&names)),
            (AVAILABLE_UPDATES_JSON.to_string(), Value::String(json)),
            (LAST_UPDATE_CHECK.to_string(), Value::from(checked_at)),
        ])
    }

    /// Decoded update snapshot. An unreadable snapshot reads as empty.
    pub fn available_update_records(&self) -> Vec<UpdateRecord> {
        let json = self.available_updates_json();
        match serde_json::from_str::<Vec<UpdateRecord>>(&json) {
            Ok(records) => records,
            Err(e) => {
                log::warn!("Ignoring unreadable update snapshot: {}", e);
                Vec::new()
            }
        }
    }

    pub fn has_available_updates(&self) -> bool {
        !self.available_updates().is_empty()
    }

    pub fn clear_available_updates(&self) -> Result<()> {
        self.store.set_many(vec![
            (AVAILABLE_UPDATES.to_string(), from_string_set(&BTreeSet::new())),
            (AVAILABLE_UPDATES_JSON.to_string(), Value::String("[]".to_string())),
        ])
    }
}
