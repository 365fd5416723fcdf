mod common;

use common::{app, FakeApi, NoopActions, RecordingBadge};
use mindapps::android_packagemanager::PackageSnapshot;
use mindapps::app_operations_queue::{AppOperationsQueue, OperationBackend, OperationStatus};
use mindapps::calc_appstate::AppState;
use mindapps::db_preferences::Preferences;
use mindapps::shared_store::{SharedStore, UiState};
use mindapps::store_view::{ActionOutcome, StoreViewModel};
use std::path::Path;
use std::sync::Arc;

fn view_model(api: Arc<FakeApi>, prefs: Preferences, download_dir: &Path) -> StoreViewModel {
    let packages = Arc::new(PackageSnapshot::from_packages([(
        "com.example.reader".to_string(),
        Some("1.0".to_string()),
    )]));
    let shared_store = Arc::new(SharedStore::new());
    let operations = Arc::new(AppOperationsQueue::new(OperationBackend {
        api: api.clone(),
        packages: packages.clone(),
        actions: Arc::new(NoopActions),
        shared_store: shared_store.clone(),
        download_dir: download_dir.to_path_buf(),
    }));

    StoreViewModel {
        api,
        packages,
        actions: Arc::new(NoopActions),
        prefs,
        badge: Arc::new(RecordingBadge::default()),
        shared_store,
        operations,
        self_package_prefix: "com.mindapps".to_string(),
    }
}

#[test]
fn transport_error_without_cache_shows_error_and_keeps_prefs() {
    let dir = tempfile::tempdir().unwrap();
    let prefs = Preferences::in_memory();
    let vm = view_model(Arc::new(FakeApi::failing()), prefs.clone(), dir.path());

    assert!(vm.load_apps().is_err());
    assert_eq!(
        vm.ui_state(),
        UiState::Error("HTTP 503: Service Unavailable".to_string())
    );

    assert!(prefs.available_updates().is_empty());
    assert_eq!(prefs.available_updates_json(), "[]");
    assert_eq!(prefs.last_update_check(), 0);
    assert!(prefs.library_app_ids().is_empty());
}

#[test]
fn install_flow_goes_through_downloading_and_back() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi::new(vec![
        app("com.example.reader", "Reader", "1.1"),
        app("com.example.timer", "Timer", "1.0"),
    ]));
    let vm = view_model(api, Preferences::in_memory(), dir.path());

    let views = vm.load_apps().unwrap();
    assert_eq!(views[0].state, AppState::UpdateAvailable);
    assert_eq!(views[1].state, AppState::NotInstalled);
    assert_eq!(vm.tabs().updates.len(), 1);

    assert_eq!(vm.on_app_action(&views[1]).unwrap(), ActionOutcome::Queued);
    assert_eq!(
        vm.find_app("com.example.timer").map(|v| v.state),
        Some(AppState::Downloading)
    );

    assert_eq!(vm.operations.run_pending(), 1);
    assert_eq!(
        vm.operations.get_status("com.example.timer"),
        Some(OperationStatus::Success("Installed: Timer".to_string()))
    );
    assert_eq!(
        vm.find_app("com.example.timer").map(|v| v.state),
        Some(AppState::NotInstalled)
    );

    let views = vm.refresh_app_states();
    assert_eq!(views[1].state, AppState::NotInstalled);
    assert_eq!(views[1].progress, 0.0);
}
