use crate::android_packagemanager_stt::{PackageActions, PackageQuery};
use crate::api_catalog::StoreApi;
use crate::app_operations_queue_stt::AppOperationsQueue;
use crate::db_preferences_stt::Preferences;
use crate::notify_stt::LauncherBadge;
use crate::shared_store_stt::SharedStore;
use std::sync::Arc;

/// What `on_app_action` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Launch attempted; false if nothing launchable was installed
    Opened(bool),
    /// Download and install queued
    Queued,
    /// Already downloading
    Ignored,
}

pub struct StoreViewModel {
    pub api: Arc<dyn StoreApi>,
    pub packages: Arc<dyn PackageQuery>,
    pub actions: Arc<dyn PackageActions>,
    pub prefs: Preferences,
    pub badge: Arc<dyn LauncherBadge>,
    pub shared_store: Arc<SharedStore>,
    pub operations: Arc<AppOperationsQueue>,
    pub self_package_prefix: String,
}
