use crate::android_packagemanager::{resolve_installed, PackageCandidates, PackageQuery};
use crate::api_catalog_stt::AppDescriptor;
pub use crate::calc_appstate_stt::*;
use crate::calc_version::is_update_available;
use crate::notify::{set_launcher_badge, LauncherBadge};
use std::collections::{BTreeSet, HashMap};

/// Derive the state of one catalog entry.
pub fn resolve_app_state(
    app: &AppDescriptor,
    progress: &HashMap<String, f32>,
    packages: &dyn PackageQuery,
) -> AppViewState {
    let installed = resolve_installed(packages, &PackageCandidates::parse(&app.package_name));
    let download_progress = progress.get(&app.package_name).copied();

    let state = if download_progress.is_some() {
        AppState::Downloading
    } else if !installed.is_installed() {
        AppState::NotInstalled
    } else if is_update_available(installed.installed_version.as_deref(), &app.version) {
        AppState::UpdateAvailable
    } else {
        AppState::Installed
    };

    AppViewState {
        app: app.clone(),
        state,
        installed_version: installed.installed_version,
        progress: download_progress.unwrap_or(0.0),
    }
}

/// Merge catalog, device packages and in-flight downloads into view states.
///
/// Library membership does not change an entry's state; it is taken so
/// that every reconciliation input goes through one call.
pub fn reconcile(
    catalog: &[AppDescriptor],
    _library_ids: &BTreeSet<String>,
    progress: &HashMap<String, f32>,
    packages: &dyn PackageQuery,
) -> Vec<AppViewState> {
    catalog
        .iter()
        .map(|app| resolve_app_state(app, progress, packages))
        .collect()
}

pub fn count_updates(views: &[AppViewState]) -> usize {
    views
        .iter()
        .filter(|v| v.state == AppState::UpdateAvailable)
        .count()
}

/// Set the launcher badge to the number of available updates.
pub fn apply_badge(badge: &dyn LauncherBadge, views: &[AppViewState]) -> usize {
    let count = count_updates(views);
    set_launcher_badge(badge, count);
    count
}

fn is_self_package(package_name: &str, self_prefix: &str) -> bool {
    !self_prefix.is_empty() && package_name.starts_with(self_prefix)
}

/// Installed apps that should join the library automatically.
pub fn apps_to_adopt(
    views: &[AppViewState],
    library_ids: &BTreeSet<String>,
    self_prefix: &str,
) -> BTreeSet<String> {
    views
        .iter()
        .filter(|v| matches!(v.state, AppState::Installed | AppState::UpdateAvailable))
        .map(|v| &v.app.package_name)
        .filter(|pkg| !is_self_package(pkg, self_prefix))
        .filter(|pkg| !library_ids.contains(*pkg))
        .cloned()
        .collect()
}

/// Split views into library, discover and updates lists.
///
/// The store's own package never shows in library or discover, but its
/// update is listed.
pub fn partition_tabs(
    views: &[AppViewState],
    library_ids: &BTreeSet<String>,
    self_prefix: &str,
) -> StoreTabs {
    let mut tabs = StoreTabs::default();

    for view in views {
        let pkg = &view.app.package_name;
        let is_self = is_self_package(pkg, self_prefix);
        let in_library = library_ids.contains(pkg);

        if !is_self {
            if in_library {
                tabs.library.push(view.clone());
            } else {
                tabs.discover.push(view.clone());
            }
        }

        if view.state == AppState::UpdateAvailable && (in_library || is_self) {
            tabs.updates.push(view.clone());
        }
    }

    tabs
}
