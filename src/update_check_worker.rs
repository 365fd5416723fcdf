use crate::android_packagemanager::{resolve_installed, PackageCandidates, PackageQuery};
use crate::api_catalog::{StoreApi, StoreError};
use crate::api_catalog_stt::AppDescriptor;
use crate::calc_version::is_update_available;
use crate::db_preferences_stt::Preferences;
use crate::notify::{clear_launcher_badge, set_launcher_badge};
use crate::notify_stt::*;
use crate::shared_store_stt::SharedStore;
pub use crate::update_check_worker_stt::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(15 * 60),
            max_backoff: Duration::from_secs(5 * 60 * 60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Updates for every catalog entry that is installed with a known,
/// older version.
pub fn find_updates(apps: &[AppDescriptor], packages: &dyn PackageQuery) -> Vec<UpdateRecord> {
    apps.iter()
        .filter_map(|app| {
            let installed = resolve_installed(packages, &PackageCandidates::parse(&app.package_name));
            let current = installed.installed_version?;
            if is_update_available(Some(current.as_str()), &app.version) {
                Some(UpdateRecord {
                    package_name: app.package_name.clone(),
                    app_name: app.name.clone(),
                    current_version: current,
                    new_version: app.version.clone(),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Collapsed notification text listing app names.
pub fn summarize_app_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [one] => one.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] if names.len() <= 4 => format!("{} and {}", init.join(", "), last),
        _ => format!("{} +{} more", names[..3].join(", "), names.len() - 3),
    }
}

pub fn build_notification(updates: &[UpdateRecord]) -> UpdateNotification {
    let count = updates.len();
    let title = if count == 1 {
        "1 update available".to_string()
    } else {
        format!("{} updates available", count)
    };

    let names: Vec<&str> = updates.iter().map(|u| u.app_name.as_str()).collect();
    let expanded_text = updates
        .iter()
        .map(|u| format!("{}: {} → {}", u.app_name, u.current_version, u.new_version))
        .collect::<Vec<_>>()
        .join("\n");

    UpdateNotification {
        id: NOTIFICATION_ID,
        channel_id: CHANNEL_ID.to_string(),
        title,
        short_text: summarize_app_names(&names),
        expanded_text,
        summary_text: "Tap to update".to_string(),
        count,
    }
}

impl UpdateCheckWorker {
    pub fn new(
        api: Arc<dyn StoreApi>,
        packages: Arc<dyn PackageQuery>,
        prefs: Preferences,
        badge: Arc<dyn LauncherBadge>,
        notifier: Arc<dyn UpdateNotifier>,
    ) -> Self {
        Self {
            api,
            packages,
            prefs,
            badge,
            notifier,
            retry_policy: RetryPolicy::default(),
            shared_store: None,
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_shared_store(mut self, shared_store: Arc<SharedStore>) -> Self {
        self.shared_store = Some(shared_store);
        self
    }

    /// Fetch the catalog, persist what needs updating, refresh the badge and
    /// notify. A failed fetch leaves the persisted snapshot as it was.
    pub fn run_check(&self) -> Result<Vec<UpdateRecord>, StoreError> {
        let _guard = self
            .run_lock
            .lock()
            .map_err(|_| StoreError::Storage("update check lock poisoned".to_string()))?;

        let apps = self.api.fetch_apps()?;
        tracing::debug!("Update check fetched {} catalog entries", apps.len());

        if let Some(store) = &self.shared_store {
            store.queue_cached_apps(apps.clone());
        }

        let library = self.prefs.library_app_ids();
        let updates = find_updates(&apps, self.packages.as_ref());
        let in_library = updates
            .iter()
            .filter(|u| library.contains(&u.package_name))
            .count();
        tracing::info!(
            "Update check found {} update(s), {} in library",
            updates.len(),
            in_library
        );

        self.persist_updates(&updates)?;
        set_launcher_badge(self.badge.as_ref(), updates.len());

        if !updates.is_empty() && self.prefs.is_update_notifications_enabled() {
            self.show_notification(&updates);
        }

        Ok(updates)
    }

    fn persist_updates(&self, updates: &[UpdateRecord]) -> Result<(), StoreError> {
        self.prefs
            .save_update_check(updates, chrono::Utc::now().timestamp_millis())
            .map_err(|e| StoreError::Storage(format!("{:#}", e)))
    }

    fn show_notification(&self, updates: &[UpdateRecord]) {
        let notification = build_notification(updates);
        match self.notifier.notify(&notification) {
            Ok(()) => {}
            Err(NotifyError::PermissionDenied) => {
                log::debug!("Notification permission denied, skipping update notification");
            }
            Err(e) => log::warn!("Failed to post update notification: {}", e),
        }
    }

    /// One scheduled attempt. `attempt` counts previous failed attempts.
    pub fn do_work(&self, attempt: u32) -> WorkResult {
        match self.run_check() {
            Ok(_) => WorkResult::Success,
            Err(e) if attempt < self.retry_policy.max_attempts => {
                log::warn!("Update check attempt {} failed, will retry: {}", attempt + 1, e);
                WorkResult::Retry
            }
            Err(e) => {
                log::error!("Update check failed after {} attempts: {}", attempt + 1, e);
                WorkResult::Failure
            }
        }
    }

    pub fn clear_notification(&self) {
        self.notifier.cancel(NOTIFICATION_ID);
        clear_launcher_badge(self.badge.as_ref());
    }

    /// Run with retries until success, terminal failure or cancellation.
    pub fn run_with_retry(&self, cancelled: &AtomicBool) -> WorkResult {
        let mut attempt = 0;
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return WorkResult::Failure;
            }
            match self.do_work(attempt) {
                WorkResult::Retry => {
                    if !sleep_unless_cancelled(self.retry_policy.backoff(attempt), cancelled) {
                        return WorkResult::Failure;
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Returns false if `cancelled` was raised before `duration` elapsed.
fn sleep_unless_cancelled(duration: Duration, cancelled: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
    !cancelled.load(Ordering::SeqCst)
}

impl UpdateScheduler {
    pub fn new(worker: Arc<UpdateCheckWorker>, period: Duration) -> Self {
        Self {
            worker,
            period,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Start periodic checks. A no-op while the periodic job is active.
    pub fn schedule_periodic(&self) -> bool {
        let worker = self.worker.clone();
        let period = self.period;
        self.enqueue_unique(PERIODIC_WORK_NAME, ExistingWorkPolicy::Keep, move |cancelled| loop {
            worker.run_with_retry(&cancelled);
            if !sleep_unless_cancelled(period, &cancelled) {
                break;
            }
        })
    }

    /// Run one check now, replacing any pending on-demand check.
    pub fn check_now(&self) -> bool {
        let worker = self.worker.clone();
        self.enqueue_unique(ONE_TIME_WORK_NAME, ExistingWorkPolicy::Replace, move |cancelled| {
            worker.run_with_retry(&cancelled);
        })
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs
            .lock()
            .map(|jobs| jobs.get(name).is_some_and(|job| !job.handle.is_finished()))
            .unwrap_or(false)
    }

    pub fn cancel_job(&self, name: &str) {
        if let Ok(mut jobs) = self.jobs.lock() {
            if let Some(job) = jobs.remove(name) {
                job.cancelled.store(true, Ordering::SeqCst);
                log::info!("Cancelled {}", name);
            }
        }
    }

    /// Stop both the periodic and the on-demand job.
    pub fn cancel(&self) {
        self.cancel_job(PERIODIC_WORK_NAME);
        self.cancel_job(ONE_TIME_WORK_NAME);
    }

    fn enqueue_unique<F>(&self, name: &str, policy: ExistingWorkPolicy, job: F) -> bool
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let Ok(mut jobs) = self.jobs.lock() else {
            log::error!("Scheduler job table poisoned, {} not scheduled", name);
            return false;
        };

        if let Some(existing) = jobs.get(name) {
            if !existing.handle.is_finished() {
                match policy {
                    ExistingWorkPolicy::Keep => {
                        log::debug!("{} already scheduled, keeping it", name);
                        return false;
                    }
                    ExistingWorkPolicy::Replace => {
                        existing.cancelled.store(true, Ordering::SeqCst);
                        log::debug!("Replacing pending {}", name);
                    }
                }
            }
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let job_name = name.to_string();
        let handle = thread::spawn(move || {
            log::info!("{} started", job_name);
            job(flag);
            log::info!("{} finished", job_name);
        });

        jobs.insert(name.to_string(), ScheduledJob { cancelled, handle });
        true
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::android_packagemanager::PackageSnapshot;
    use crate::db_preferences::{KeyValueStore, MemoryStore, AVAILABLE_UPDATES_JSON};
    use serde_json::Value;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct FakeApi {
        apps: Vec<AppDescriptor>,
        fail: AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeApi {
        fn new(apps: Vec<AppDescriptor>) -> Self {
            Self {
                apps,
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl StoreApi for FakeApi {
        fn fetch_apps(&self) -> Result<Vec<AppDescriptor>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(StoreError::Transport("HTTP 503: Service Unavailable".to_string()))
            } else {
                Ok(self.apps.clone())
            }
        }

        fn send_download_analytics(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Ok(())
        }

        fn download_apk(
            &self,
            _: &str,
            destination: &Path,
            _: &AtomicBool,
            _: &mut dyn FnMut(f32),
        ) -> Result<PathBuf, StoreError> {
            Ok(destination.to_path_buf())
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        posted: Mutex<Vec<UpdateNotification>>,
        cancelled: Mutex<Vec<i32>>,
        deny: bool,
    }

    impl UpdateNotifier for FakeNotifier {
        fn notify(&self, notification: &UpdateNotification) -> Result<(), NotifyError> {
            if self.deny {
                return Err(NotifyError::PermissionDenied);
            }
            self.posted.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn cancel(&self, id: i32) {
            self.cancelled.lock().unwrap().push(id);
        }
    }

    #[derive(Default)]
    struct FakeBadge {
        counts: Mutex<Vec<usize>>,
    }

    impl LauncherBadge for FakeBadge {
        fn apply_count(&self, count: usize) -> Result<(), NotifyError> {
            self.counts.lock().unwrap().push(count);
            Ok(())
        }

        fn remove_count(&self) -> Result<(), NotifyError> {
            self.counts.lock().unwrap().push(0);
            Ok(())
        }
    }

    fn app(package_name: &str, name: &str, version: &str) -> AppDescriptor {
        AppDescriptor {
            package_name: package_name.to_string(),
            name: name.to_string(),
            author: String::new(),
            icon_url: String::new(),
            version: version.to_string(),
            apk_url: String::new(),
            tags: Vec::new(),
            description: String::new(),
            release_date: None,
        }
    }

    fn record(name: &str) -> UpdateRecord {
        UpdateRecord {
            package_name: format!("pkg.{}", name),
            app_name: name.to_string(),
            current_version: "1.0".to_string(),
            new_version: "2.0".to_string(),
        }
    }

    fn worker_with(
        api: Arc<FakeApi>,
        notifier: Arc<FakeNotifier>,
        badge: Arc<FakeBadge>,
    ) -> UpdateCheckWorker {
        let snapshot = PackageSnapshot::from_packages([
            ("x".to_string(), Some("1.0".to_string())),
            ("y".to_string(), Some("2.0".to_string())),
        ]);
        UpdateCheckWorker::new(api, Arc::new(snapshot), Preferences::in_memory(), badge, notifier)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_summarize_app_names() {
        assert_eq!(summarize_app_names(&[]), "");
        assert_eq!(summarize_app_names(&["A"]), "A");
        assert_eq!(summarize_app_names(&["A", "B"]), "A and B");
        assert_eq!(summarize_app_names(&["A", "B", "C"]), "A, B and C");
        assert_eq!(summarize_app_names(&["A", "B", "C", "D"]), "A, B, C and D");
        assert_eq!(summarize_app_names(&["A", "B", "C", "D", "E"]), "A, B, C +2 more");
    }

    #[test]
    fn test_build_notification() {
        let single = build_notification(&[record("Notes")]);
        assert_eq!(single.title, "1 update available");
        assert_eq!(single.short_text, "Notes");
        assert_eq!(single.expanded_text, "Notes: 1.0 → 2.0");
        assert_eq!(single.summary_text, "Tap to update");
        assert_eq!(single.id, NOTIFICATION_ID);

        let many = build_notification(&[record("A"), record("B")]);
        assert_eq!(many.title, "2 updates available");
        assert_eq!(many.expanded_text, "A: 1.0 → 2.0\nB: 1.0 → 2.0");
        assert_eq!(many.count, 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(15 * 60));
        assert_eq!(policy.backoff(1), Duration::from_secs(30 * 60));
        assert_eq!(policy.backoff(2), Duration::from_secs(60 * 60));
        assert_eq!(policy.backoff(10), Duration::from_secs(5 * 60 * 60));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5 * 60 * 60));
    }

    #[test]
    fn test_run_check_persists_and_notifies() {
        let api = Arc::new(FakeApi::new(vec![
            app("x", "X", "1.1"),
            app("y", "Y", "2.0"),
            app("z", "Z", "9.0"),
        ]));
        let notifier = Arc::new(FakeNotifier::default());
        let badge = Arc::new(FakeBadge::default());
        let worker = worker_with(api, notifier.clone(), badge.clone());

        let updates = worker.run_check().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].current_version, "1.0");
        assert_eq!(updates[0].new_version, "1.1");

        assert_eq!(
            worker.prefs.available_updates().into_iter().collect::<Vec<_>>(),
            vec!["x".to_string()]
        );
        assert_eq!(worker.prefs.available_update_records(), updates);
        assert!(worker.prefs.last_update_check() > 0);
        assert_eq!(*badge.counts.lock().unwrap(), vec![1]);
        assert_eq!(notifier.posted.lock().unwrap()[0].short_text, "X");
    }

    #[test]
    fn test_notifications_disabled_or_denied() {
        let api = Arc::new(FakeApi::new(vec![app("x", "X", "1.1")]));
        let notifier = Arc::new(FakeNotifier::default());
        let badge = Arc::new(FakeBadge::default());
        let worker = worker_with(api.clone(), notifier.clone(), badge.clone());
        worker.prefs.set_update_notifications_enabled(false).unwrap();

        assert_eq!(worker.run_check().unwrap().len(), 1);
        assert!(notifier.posted.lock().unwrap().is_empty());
        assert_eq!(*badge.counts.lock().unwrap(), vec![1]);

        let denied = Arc::new(FakeNotifier {
            deny: true,
            ..Default::default()
        });
        let worker = worker_with(api, denied, badge);
        assert!(worker.run_check().is_ok());
    }

    #[test]
    fn test_failed_fetch_keeps_previous_snapshot() {
        let api = Arc::new(FakeApi::new(vec![app("x", "X", "1.1")]));
        let badge = Arc::new(FakeBadge::default());
        let worker = worker_with(api.clone(), Arc::new(FakeNotifier::default()), badge.clone());

        worker.run_check().unwrap();
        let json_before = worker.prefs.available_updates_json();
        let checked_before = worker.prefs.last_update_check();

        api.fail.store(true, Ordering::SeqCst);
        assert!(matches!(worker.run_check(), Err(StoreError::Transport(_))));
        assert_eq!(worker.prefs.available_updates_json(), json_before);
        assert_eq!(worker.prefs.last_update_check(), checked_before);
        assert_eq!(*badge.counts.lock().unwrap(), vec![1]);
    }

    /// Rejects any write that touches the update list while `fail` is set.
    #[derive(Default)]
    struct ListRejectingStore {
        inner: MemoryStore,
        fail: AtomicBool,
    }

    impl KeyValueStore for ListRejectingStore {
        fn get(&self, key: &str) -> Option<Value> {
            self.inner.get(key)
        }

        fn set_many(&self, entries: Vec<(String, Value)>) -> anyhow::Result<()> {
            let touches_list = entries
                .iter()
                .any(|(key, _)| key == AVAILABLE_UPDATES_JSON);
            if touches_list && self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.set_many(entries)
        }

        fn update(
            &self,
            key: &str,
            f: &mut dyn FnMut(Option<Value>) -> Value,
        ) -> anyhow::Result<Value> {
            self.inner.update(key, f)
        }
    }

    #[test]
    fn test_failed_persist_leaves_snapshot_consistent() {
        let api = Arc::new(FakeApi::new(vec![app("x", "X", "1.1")]));
        let store = Arc::new(ListRejectingStore::default());
        let badge = Arc::new(FakeBadge::default());
        let notifier = Arc::new(FakeNotifier::default());
        let snapshot = PackageSnapshot::from_packages([
            ("x".to_string(), Some("1.0".to_string())),
            ("y".to_string(), Some("1.0".to_string())),
        ]);
        let worker = UpdateCheckWorker::new(
            api,
            Arc::new(snapshot),
            Preferences::new(store.clone()),
            badge.clone(),
            notifier.clone(),
        );
        worker.run_check().unwrap();
        let checked_before = worker.prefs.last_update_check();

        let worker = UpdateCheckWorker {
            api: Arc::new(FakeApi::new(vec![app("x", "X", "1.1"), app("y", "Y", "3.0")])),
            ..worker
        };
        store.fail.store(true, Ordering::SeqCst);
        assert!(matches!(worker.run_check(), Err(StoreError::Storage(_))));

        let names: Vec<String> = worker.prefs.available_updates().into_iter().collect();
        assert_eq!(names, vec!["x".to_string()]);
        assert_eq!(worker.prefs.available_update_records().len(), 1);
        assert_eq!(worker.prefs.last_update_check(), checked_before);
        assert_eq!(*badge.counts.lock().unwrap(), vec![1]);
        assert_eq!(notifier.posted.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_do_work_retry_bound() {
        let api = Arc::new(FakeApi::new(Vec::new()));
        api.fail.store(true, Ordering::SeqCst);
        let worker = worker_with(api.clone(), Arc::new(FakeNotifier::default()), Arc::new(FakeBadge::default()));

        assert_eq!(worker.do_work(0), WorkResult::Retry);
        assert_eq!(worker.do_work(2), WorkResult::Retry);
        assert_eq!(worker.do_work(3), WorkResult::Failure);

        api.fail.store(false, Ordering::SeqCst);
        assert_eq!(worker.do_work(3), WorkResult::Success);
    }

    #[test]
    fn test_run_with_retry_stops_after_max_attempts() {
        let api = Arc::new(FakeApi::new(Vec::new()));
        api.fail.store(true, Ordering::SeqCst);
        let worker = worker_with(api.clone(), Arc::new(FakeNotifier::default()), Arc::new(FakeBadge::default()))
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            });

        assert_eq!(worker.run_with_retry(&AtomicBool::new(false)), WorkResult::Failure);
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_clear_notification() {
        let notifier = Arc::new(FakeNotifier::default());
        let badge = Arc::new(FakeBadge::default());
        let worker = worker_with(Arc::new(FakeApi::new(Vec::new())), notifier.clone(), badge.clone());

        worker.clear_notification();
        assert_eq!(*notifier.cancelled.lock().unwrap(), vec![NOTIFICATION_ID]);
        assert_eq!(*badge.counts.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_periodic_job_keeps_existing() {
        let api = Arc::new(FakeApi::new(Vec::new()));
        let worker = Arc::new(worker_with(
            api.clone(),
            Arc::new(FakeNotifier::default()),
            Arc::new(FakeBadge::default()),
        ));
        let scheduler = UpdateScheduler::new(worker, Duration::from_secs(3600));

        assert!(scheduler.schedule_periodic());
        assert!(!scheduler.schedule_periodic());
        assert!(wait_until(|| api.calls.load(Ordering::SeqCst) == 1));
        assert!(scheduler.is_scheduled(PERIODIC_WORK_NAME));

        scheduler.cancel();
        assert!(!scheduler.is_scheduled(PERIODIC_WORK_NAME));
        assert!(scheduler.schedule_periodic());
    }

    #[test]
    fn test_check_now_replaces_pending() {
        let api = Arc::new(FakeApi::new(Vec::new()));
        api.fail.store(true, Ordering::SeqCst);
        let worker = Arc::new(worker_with(
            api.clone(),
            Arc::new(FakeNotifier::default()),
            Arc::new(FakeBadge::default()),
        ));
        let scheduler = UpdateScheduler::new(worker, Duration::from_secs(3600));

        assert!(scheduler.check_now());
        assert!(wait_until(|| api.calls.load(Ordering::SeqCst) == 1));
        let first_flag = scheduler.jobs.lock().unwrap()[ONE_TIME_WORK_NAME].cancelled.clone();

        // first job is now sleeping in its backoff
        assert!(scheduler.check_now());
        assert!(first_flag.load(Ordering::SeqCst));
        assert!(wait_until(|| api.calls.load(Ordering::SeqCst) == 2));

        let jobs = scheduler.jobs.lock().unwrap();
        assert!(!jobs[ONE_TIME_WORK_NAME].cancelled.load(Ordering::SeqCst));
    }
}
