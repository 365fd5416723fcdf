use crate::android_packagemanager_stt::{PackageActions, PackageQuery};
use crate::api_catalog::StoreApi;
use crate::api_catalog_stt::AppDescriptor;
use crate::shared_store_stt::SharedStore;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum OperationType {
    Install { app: AppDescriptor },
    Uninstall { package_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Pending,
    Processing,
    Success(String), // Success message
    Error(String),
}

#[derive(Debug, Clone)]
pub struct OperationItem {
    pub operation: OperationType,
    pub status: OperationStatus,
}

/// Collaborators an operation needs, cloned into the worker thread.
#[derive(Clone)]
pub struct OperationBackend {
    pub api: Arc<dyn StoreApi>,
    pub packages: Arc<dyn PackageQuery>,
    pub actions: Arc<dyn PackageActions>,
    pub shared_store: Arc<SharedStore>,
    pub download_dir: PathBuf,
}

pub struct AppOperationsQueue {
    pub queue: Arc<Mutex<VecDeque<OperationItem>>>,
    pub results: Arc<Mutex<HashMap<String, OperationStatus>>>,
    pub is_running: Arc<Mutex<bool>>,
    /// Per-package cancel flags for queued or running installs
    pub cancel_flags: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    pub backend: OperationBackend,
}
