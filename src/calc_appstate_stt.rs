use crate::api_catalog_stt::AppDescriptor;

/// Per-app state shown in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    NotInstalled,
    Installed,
    UpdateAvailable,
    Downloading,
}

/// Catalog entry merged with device, library and download state.
#[derive(Debug, Clone, PartialEq)]
pub struct AppViewState {
    pub app: AppDescriptor,
    pub state: AppState,
    pub installed_version: Option<String>,
    /// Download fraction in [0, 1], 0.0 unless downloading
    pub progress: f32,
}

/// Views split the way the store tabs show them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreTabs {
    pub library: Vec<AppViewState>,
    pub discover: Vec<AppViewState>,
    pub updates: Vec<AppViewState>,
}
