use crate::android_packagemanager::{uninstall_app, PackageCandidates};
use crate::api_catalog::StoreError;
use crate::api_catalog_stt::AppDescriptor;
pub use crate::app_operations_queue_stt::*;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl OperationType {
    /// Package key the operation is tracked under.
    pub fn key(&self) -> &str {
        match self {
            OperationType::Install { app } => &app.package_name,
            OperationType::Uninstall { package_name } => package_name,
        }
    }
}

/// File-system safe APK name for a package field.
pub fn apk_file_name(package_field: &str) -> String {
    let candidates = PackageCandidates::parse(package_field);
    let safe_name: String = candidates
        .primary()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe_name = safe_name.trim_matches('.');
    if safe_name.is_empty() {
        "app.apk".to_string()
    } else {
        format!("{}.apk", safe_name)
    }
}

impl AppOperationsQueue {
    pub fn new(backend: OperationBackend) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            results: Arc::new(Mutex::new(HashMap::new())),
            is_running: Arc::new(Mutex::new(false)),
            cancel_flags: Arc::new(Mutex::new(HashMap::new())),
            backend,
        }
    }

    /// Queue a download and install. Fails if a download for the same
    /// package is already in flight.
    pub fn enqueue_install(&self, app: AppDescriptor) -> Result<(), StoreError> {
        let key = app.package_name.clone();
        if !self.backend.shared_store.begin_download(&key) {
            log::info!("Download already in progress for {}", key);
            return Err(StoreError::AlreadyInFlight(key));
        }

        lock(&self.cancel_flags).insert(key.clone(), Arc::new(AtomicBool::new(false)));
        lock(&self.queue).push_back(OperationItem {
            operation: OperationType::Install { app },
            status: OperationStatus::Pending,
        });
        lock(&self.results).insert(key, OperationStatus::Pending);
        Ok(())
    }

    /// Queue an uninstall. Returns false if one is already pending for
    /// this package.
    pub fn enqueue_uninstall(&self, package_name: &str) -> bool {
        let mut queue = lock(&self.queue);
        let mut results = lock(&self.results);

        let busy = queue.iter().any(|item| {
            matches!(&item.operation, OperationType::Uninstall { package_name: p } if p == package_name)
        });
        if busy {
            return false;
        }

        queue.push_back(OperationItem {
            operation: OperationType::Uninstall {
                package_name: package_name.to_string(),
            },
            status: OperationStatus::Pending,
        });
        results.insert(package_name.to_string(), OperationStatus::Pending);
        true
    }

    /// Get the status of an operation
    pub fn get_status(&self, key: &str) -> Option<OperationStatus> {
        lock(&self.results).get(key).cloned()
    }

    /// Get number of pending operations
    pub fn queue_size(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Get number of completed operations
    pub fn completed_count(&self) -> usize {
        lock(&self.results)
            .values()
            .filter(|status| matches!(status, OperationStatus::Success(_) | OperationStatus::Error(_)))
            .count()
    }

    pub fn is_running(&self) -> bool {
        *lock(&self.is_running)
    }

    /// Cancel an install. A queued one is dropped right away, a running one
    /// stops at the next download chunk.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = {
            let mut queue = lock(&self.queue);
            let before = queue.len();
            queue.retain(|item| {
                !matches!(&item.operation, OperationType::Install { app } if app.package_name == key)
            });
            queue.len() != before
        };

        if removed {
            self.release(key);
            lock(&self.results).insert(key.to_string(), OperationStatus::Error("Cancelled".to_string()));
            log::info!("Removed queued install of {}", key);
            return true;
        }

        match lock(&self.cancel_flags).get(key) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                log::info!("Cancelling download of {}", key);
                true
            }
            None => false,
        }
    }

    fn release(&self, key: &str) {
        lock(&self.cancel_flags).remove(key);
        self.backend.shared_store.finish_download(key);
    }

    /// Clear the queue
    pub fn clear_queue(&self) {
        let dropped: Vec<OperationItem> = lock(&self.queue).drain(..).collect();
        for item in &dropped {
            if let OperationType::Install { app } = &item.operation {
                self.release(&app.package_name);
            }
            lock(&self.results).remove(item.operation.key());
        }
        log::info!("App operations queue cleared ({} dropped)", dropped.len());
    }

    /// Clear completed results (call after operations are done and refresh is complete)
    pub fn clear_results(&self) {
        lock(&self.results)
            .retain(|_, status| matches!(status, OperationStatus::Pending | OperationStatus::Processing));
        log::info!("App operations results cleared");
    }

    /// Process every queued operation on the calling thread.
    pub fn run_pending(&self) -> usize {
        Self::drain(&self.queue, &self.results, &self.cancel_flags, &self.backend, None)
    }

    /// Start the background worker thread
    pub fn start_worker(&self) -> bool {
        {
            let mut is_running = lock(&self.is_running);
            if *is_running {
                log::warn!("App operations worker already running");
                return false;
            }
            *is_running = true;
        }

        let queue = self.queue.clone();
        let results = self.results.clone();
        let cancel_flags = self.cancel_flags.clone();
        let backend = self.backend.clone();
        let is_running = self.is_running.clone();

        thread::spawn(move || {
            log::info!("App operations worker thread started");
            let processed = Self::drain(&queue, &results, &cancel_flags, &backend, Some(&is_running));
            log::info!("App operations worker thread stopped after {} operation(s)", processed);
        });
        true
    }

    fn drain(
        queue: &Mutex<VecDeque<OperationItem>>,
        results: &Mutex<HashMap<String, OperationStatus>>,
        cancel_flags: &Mutex<HashMap<String, Arc<AtomicBool>>>,
        backend: &OperationBackend,
        is_running: Option<&Mutex<bool>>,
    ) -> usize {
        let mut processed = 0;

        loop {
            // The running flag is cleared under the queue lock, so an item
            // pushed after this point always finds the worker stopped.
            let next = {
                let mut queue = lock(queue);
                let next = queue.pop_front();
                if next.is_none() {
                    if let Some(is_running) = is_running {
                        *lock(is_running) = false;
                    }
                }
                next
            };
            let Some(item) = next else {
                break;
            };
            let key = item.operation.key().to_string();
            lock(results).insert(key.clone(), OperationStatus::Processing);

            let status = match &item.operation {
                OperationType::Install { app } => {
                    let cancelled = lock(cancel_flags)
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
                    log::info!("Processing install for: {}", app.name);
                    let status = Self::process_install(backend, app, &cancelled);
                    lock(cancel_flags).remove(&key);
                    status
                }
                OperationType::Uninstall { package_name } => {
                    log::info!("Processing uninstall for: {}", package_name);
                    Self::process_uninstall(backend, package_name)
                }
            };

            lock(results).insert(key, status);
            processed += 1;
        }

        processed
    }

    fn process_install(
        backend: &OperationBackend,
        app: &AppDescriptor,
        cancelled: &AtomicBool,
    ) -> OperationStatus {
        let key = app.package_name.as_str();
        let store = &backend.shared_store;

        if let Err(e) = std::fs::create_dir_all(&backend.download_dir) {
            store.finish_download(key);
            return OperationStatus::Error(format!("Failed to create download directory: {}", e));
        }
        let destination = backend.download_dir.join(apk_file_name(key));

        let downloaded = backend.api.download_apk(
            &app.apk_url,
            &destination,
            cancelled,
            &mut |fraction| store.set_download_progress(key, fraction),
        );

        let apk_path = match downloaded {
            Ok(path) => path,
            Err(StoreError::Cancelled) => {
                store.finish_download(key);
                log::info!("Download of {} cancelled", app.name);
                return OperationStatus::Error("Cancelled".to_string());
            }
            Err(e) => {
                store.finish_download(key);
                log::error!("Failed to download {}: {}", app.name, e);
                return OperationStatus::Error(format!("Failed to download APK: {}", e));
            }
        };

        log::info!("APK downloaded to: {:?}", apk_path);
        if let Err(e) = backend.api.send_download_analytics(key, &app.name) {
            log::warn!("Download analytics for {} not sent: {}", key, e);
        }
        store.finish_download(key);

        let status = match backend.actions.install_apk(&apk_path) {
            Ok(()) => OperationStatus::Success(format!("Installed: {}", app.name)),
            Err(e) => {
                log::error!("Failed to install {}: {:#}", app.name, e);
                OperationStatus::Error(format!("Failed to install: {:#}", e))
            }
        };
        Self::remove_apk(&apk_path);
        status
    }

    fn remove_apk(apk_path: &Path) {
        if let Err(e) = std::fs::remove_file(apk_path) {
            log::warn!("Failed to clean up APK file: {}", e);
        }
    }

    fn process_uninstall(backend: &OperationBackend, package_field: &str) -> OperationStatus {
        let candidates = PackageCandidates::parse(package_field);
        match uninstall_app(backend.packages.as_ref(), backend.actions.as_ref(), &candidates) {
            Ok(target) => {
                log::info!("App uninstalled successfully: {}", target);
                OperationStatus::Success(format!("Uninstalled: {}", target))
            }
            Err(e) => {
                log::error!("Failed to uninstall app({}): {:#}", package_field, e);
                OperationStatus::Error(format!("Failed to uninstall: {:#}", e))
            }
        }
    }
}
