use crate::api_catalog_stt::AppDescriptor;
pub use crate::shared_store_stt::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore {
    pub fn new() -> Self {
        use crossbeam_queue::SegQueue;
        use std::sync::Mutex;

        Self {
            cached_apps: Mutex::new(Vec::new()),
            download_progress: Mutex::new(HashMap::new()),
            ui_state: Mutex::new(UiState::Loading),
            inputs_changed: AtomicBool::new(false),
            update_queue: SegQueue::new(),
        }
    }

    /// Process all pending updates from the queue
    pub fn process_updates(&self) -> usize {
        let mut processed = 0;
        while let Some(update) = self.update_queue.pop() {
            match update {
                SharedStoreUpdate::CachedApps(apps) => self.set_cached_apps(apps),
                SharedStoreUpdate::UiState(state) => self.set_ui_state(state),
            }
            processed += 1;
        }
        processed
    }

    fn mark_changed(&self) {
        self.inputs_changed.store(true, Ordering::SeqCst);
    }

    /// True if the catalog or the progress map changed since the last call.
    pub fn take_inputs_changed(&self) -> bool {
        self.inputs_changed.swap(false, Ordering::SeqCst)
    }

    // === Catalog cache ===

    pub fn get_cached_apps(&self) -> Vec<AppDescriptor> {
        self.cached_apps
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn has_cached_apps(&self) -> bool {
        self.cached_apps
            .lock()
            .map(|g| !g.is_empty())
            .unwrap_or(false)
    }

    pub fn set_cached_apps(&self, apps: Vec<AppDescriptor>) {
        if let Ok(mut cache) = self.cached_apps.lock() {
            *cache = apps;
            self.mark_changed();
        }
    }

    pub fn queue_cached_apps(&self, apps: Vec<AppDescriptor>) {
        self.update_queue.push(SharedStoreUpdate::CachedApps(apps));
    }

    // === Download progress ===

    pub fn get_download_progress(&self) -> HashMap<String, f32> {
        self.download_progress
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn is_downloading(&self, key: &str) -> bool {
        self.download_progress
            .lock()
            .map(|g| g.contains_key(key))
            .unwrap_or(false)
    }

    /// Mark `key` as downloading. Returns false if it already is, which
    /// makes this the single-flight guard for downloads.
    pub fn begin_download(&self, key: &str) -> bool {
        match self.download_progress.lock() {
            Ok(mut progress) => {
                if progress.contains_key(key) {
                    false
                } else {
                    progress.insert(key.to_string(), 0.0);
                    self.mark_changed();
                    true
                }
            }
            Err(_) => false,
        }
    }

    /// Record progress for an in-flight download. Ignored once finished.
    pub fn set_download_progress(&self, key: &str, fraction: f32) {
        if let Ok(mut progress) = self.download_progress.lock() {
            if let Some(entry) = progress.get_mut(key) {
                let fraction = fraction.clamp(0.0, 1.0);
                if *entry != fraction {
                    *entry = fraction;
                    self.mark_changed();
                }
            }
        }
    }

    pub fn finish_download(&self, key: &str) {
        if let Ok(mut progress) = self.download_progress.lock() {
            if progress.remove(key).is_some() {
                self.mark_changed();
            }
        }
    }

    // === UI state ===

    pub fn get_ui_state(&self) -> UiState {
        self.ui_state
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn set_ui_state(&self, state: UiState) {
        if let Ok(mut s) = self.ui_state.lock() {
            *s = state;
        }
    }

    pub fn queue_ui_state(&self, state: UiState) {
        self.update_queue.push(SharedStoreUpdate::UiState(state));
    }
}
