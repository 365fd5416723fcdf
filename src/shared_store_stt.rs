use crate::api_catalog_stt::AppDescriptor;
use crate::calc_appstate_stt::AppViewState;
use crossbeam_queue::SegQueue;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

/// What the store screen shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UiState {
    #[default]
    Loading,
    Success(Vec<AppViewState>),
    Error(String),
}

/// Update types for the shared store queue
pub enum SharedStoreUpdate {
    /// Catalog fetched off the UI path (e.g. by the update worker)
    CachedApps(Vec<AppDescriptor>),
    /// Replace the UI state
    UiState(UiState),
}

/// State shared between the view model, the download queue and the update worker.
pub struct SharedStore {
    /// Last successfully fetched catalog
    pub cached_apps: Mutex<Vec<AppDescriptor>>,
    /// package key -> download fraction, present only while downloading
    pub download_progress: Mutex<HashMap<String, f32>>,
    pub ui_state: Mutex<UiState>,
    /// Set when the catalog or the progress map changed after the last publish
    pub inputs_changed: AtomicBool,
    /// Update queue for thread-safe updates from background threads
    pub update_queue: SegQueue<SharedStoreUpdate>,
}
