use crate::android_packagemanager::{open_app, PackageCandidates};
use crate::api_catalog::StoreError;
use crate::api_catalog_stt::AppDescriptor;
use crate::calc_appstate::{apply_badge, apps_to_adopt, partition_tabs, reconcile};
use crate::calc_appstate_stt::{AppState, AppViewState, StoreTabs};
use crate::shared_store_stt::UiState;
pub use crate::store_view_stt::*;

impl StoreViewModel {
    /// Current screen state, republished first if the catalog or a
    /// download changed since it was last computed.
    pub fn ui_state(&self) -> UiState {
        let store = &self.shared_store;
        store.process_updates();
        if store.has_cached_apps() && store.take_inputs_changed() {
            self.recompute();
        }
        store.get_ui_state()
    }

    /// Fetch the catalog. Loading and error states only replace the screen
    /// when there is no cached catalog to show.
    pub fn load_apps(&self) -> Result<Vec<AppViewState>, StoreError> {
        let store = &self.shared_store;
        store.process_updates();

        if !store.has_cached_apps() {
            store.set_ui_state(UiState::Loading);
        }

        match self.api.fetch_apps() {
            Ok(apps) => {
                tracing::info!("Loaded {} apps from catalog", apps.len());
                store.set_cached_apps(apps);
                Ok(self.recompute())
            }
            Err(e) => {
                if store.has_cached_apps() {
                    tracing::warn!("Catalog refresh failed, keeping cached apps: {}", e);
                } else {
                    tracing::error!("Failed to load apps: {}", e);
                    store.set_ui_state(UiState::Error(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Recompute every app's state from the cached catalog, update the
    /// badge and adopt installed apps into the library.
    pub fn refresh_app_states(&self) -> Vec<AppViewState> {
        let store = &self.shared_store;
        store.process_updates();

        if !store.has_cached_apps() && !matches!(store.get_ui_state(), UiState::Success(_)) {
            return Vec::new();
        }
        self.recompute()
    }

    fn recompute(&self) -> Vec<AppViewState> {
        self.shared_store.take_inputs_changed();
        let apps = self.shared_store.get_cached_apps();
        let progress = self.shared_store.get_download_progress();
        let library = self.prefs.library_app_ids();

        let views = reconcile(&apps, &library, &progress, self.packages.as_ref());
        apply_badge(self.badge.as_ref(), &views);

        let adopt = apps_to_adopt(&views, &library, &self.self_package_prefix);
        if !adopt.is_empty() {
            log::info!("Adding {} installed app(s) to library", adopt.len());
            if let Err(e) = self.prefs.add_all_to_library(adopt) {
                log::error!("Failed to update library: {:#}", e);
            }
        }

        self.shared_store.set_ui_state(UiState::Success(views.clone()));
        views
    }

    pub fn on_app_action(&self, view: &AppViewState) -> Result<ActionOutcome, StoreError> {
        let outcome = match view.state {
            AppState::Installed => {
                let candidates = PackageCandidates::parse(&view.app.package_name);
                let opened = open_app(self.packages.as_ref(), self.actions.as_ref(), &candidates);
                if !opened {
                    log::warn!("Could not open {}", view.app.name);
                }
                ActionOutcome::Opened(opened)
            }
            AppState::NotInstalled | AppState::UpdateAvailable => {
                self.operations.enqueue_install(view.app.clone())?;
                ActionOutcome::Queued
            }
            AppState::Downloading => ActionOutcome::Ignored,
        };

        if outcome == ActionOutcome::Queued {
            self.refresh_app_states();
        }
        Ok(outcome)
    }

    pub fn uninstall(&self, app: &AppDescriptor) -> bool {
        self.operations.enqueue_uninstall(&app.package_name)
    }

    pub fn add_to_library(&self, package_name: &str) -> anyhow::Result<()> {
        self.prefs.add_to_library(package_name)?;
        self.refresh_app_states();
        Ok(())
    }

    pub fn remove_from_library(&self, package_name: &str) -> anyhow::Result<()> {
        self.prefs.remove_from_library(package_name)?;
        self.refresh_app_states();
        Ok(())
    }

    pub fn find_app(&self, package_name: &str) -> Option<AppViewState> {
        match self.ui_state() {
            UiState::Success(views) => views.into_iter().find(|v| {
                v.app.package_name == package_name
                    || PackageCandidates::parse(&v.app.package_name)
                        .iter()
                        .any(|candidate| candidate == package_name)
            }),
            _ => None,
        }
    }

    /// Library, discover and updates lists for the current state.
    pub fn tabs(&self) -> StoreTabs {
        match self.ui_state() {
            UiState::Success(views) => {
                partition_tabs(&views, &self.prefs.library_app_ids(), &self.self_package_prefix)
            }
            _ => StoreTabs::default(),
        }
    }
}
