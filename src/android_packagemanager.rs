// Package manager capabilities and fallback-name resolution.
//
// reference
// https://developer.android.com/reference/android/content/pm/PackageManager
// getPackageInfo
// getLaunchIntentForPackage

pub use crate::android_packagemanager_stt::*;
use std::collections::HashMap;

impl PackageCandidates {
    /// Parse a package field that may contain `|`-separated fallbacks.
    /// Whitespace around names is trimmed and empty names are dropped.
    pub fn parse(package_field: &str) -> Self {
        let names = package_field
            .split('|')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Self {
            raw: package_field.to_string(),
            names,
        }
    }

    /// First candidate, or the raw field when it holds no usable name.
    pub fn primary(&self) -> &str {
        self.names.first().map(|s| s.as_str()).unwrap_or(&self.raw)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    /// First candidate the package query knows about.
    pub fn find_installed(&self, query: &dyn PackageQuery) -> Option<PackageInfo> {
        self.iter().find_map(|name| query.lookup(name))
    }
}

/// Resolve the installed state of a catalog entry by trying each candidate.
pub fn resolve_installed(query: &dyn PackageQuery, candidates: &PackageCandidates) -> InstalledState {
    match candidates.find_installed(query) {
        Some(info) => InstalledState {
            installed_package: Some(info.package_name),
            installed_version: info.version_name,
        },
        None => InstalledState::default(),
    }
}

impl InstalledState {
    pub fn is_installed(&self) -> bool {
        self.installed_package.is_some()
    }
}

/// Package to act on for uninstall: the installed variant, else the primary name.
pub fn uninstall_target(query: &dyn PackageQuery, candidates: &PackageCandidates) -> String {
    candidates
        .find_installed(query)
        .map(|info| info.package_name)
        .unwrap_or_else(|| candidates.primary().to_string())
}

/// Launch the first installed variant. Returns false if none is installed
/// or the launch itself did not happen.
pub fn open_app(
    query: &dyn PackageQuery,
    actions: &dyn PackageActions,
    candidates: &PackageCandidates,
) -> bool {
    let Some(info) = candidates.find_installed(query) else {
        log::debug!("open_app: nothing installed for {}", candidates.raw);
        return false;
    };

    match actions.launch(&info.package_name) {
        Ok(launched) => launched,
        Err(e) => {
            log::warn!("Failed to launch {}: {:#}", info.package_name, e);
            false
        }
    }
}

/// Uninstall whichever variant is installed (or the primary name).
pub fn uninstall_app(
    query: &dyn PackageQuery,
    actions: &dyn PackageActions,
    candidates: &PackageCandidates,
) -> anyhow::Result<String> {
    let target = uninstall_target(query, candidates);
    actions.uninstall(&target)?;
    Ok(target)
}

impl PackageSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packages<I>(packages: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        Self {
            packages: packages.into_iter().collect::<HashMap<_, _>>(),
        }
    }

    pub fn insert(&mut self, package_name: &str, version_name: Option<&str>) {
        self.packages
            .insert(package_name.to_string(), version_name.map(|v| v.to_string()));
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageQuery for PackageSnapshot {
    fn lookup(&self, package_name: &str) -> Option<PackageInfo> {
        self.packages
            .get(package_name)
            .map(|version_name| PackageInfo {
                package_name: package_name.to_string(),
                version_name: version_name.clone(),
            })
    }
}
