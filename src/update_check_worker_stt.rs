use crate::android_packagemanager_stt::PackageQuery;
use crate::api_catalog::StoreApi;
use crate::db_preferences_stt::Preferences;
use crate::notify_stt::{LauncherBadge, UpdateNotifier};
use crate::shared_store_stt::SharedStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub const PERIODIC_WORK_NAME: &str = "periodic_update_check";
pub const ONE_TIME_WORK_NAME: &str = "immediate_update_check";

/// One pending update, as persisted in the update snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    pub package_name: String,
    pub app_name: String,
    pub current_version: String,
    pub new_version: String,
}

/// Outcome of a single scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    Retry,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts numbered below this are retried after a failure
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// What happens when a job name is scheduled while already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingWorkPolicy {
    Keep,
    Replace,
}

pub struct UpdateCheckWorker {
    pub api: Arc<dyn StoreApi>,
    pub packages: Arc<dyn PackageQuery>,
    pub prefs: Preferences,
    pub badge: Arc<dyn LauncherBadge>,
    pub notifier: Arc<dyn UpdateNotifier>,
    pub retry_policy: RetryPolicy,
    /// Fetched catalogs are pushed here for the view model, if set
    pub shared_store: Option<Arc<SharedStore>>,
    pub(crate) run_lock: Mutex<()>,
}

pub(crate) struct ScheduledJob {
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) handle: JoinHandle<()>,
}

/// Named unique background jobs around one worker.
pub struct UpdateScheduler {
    pub worker: Arc<UpdateCheckWorker>,
    pub period: Duration,
    pub(crate) jobs: Mutex<HashMap<String, ScheduledJob>>,
}
