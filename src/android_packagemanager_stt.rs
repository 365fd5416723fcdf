use std::collections::HashMap;
use std::path::Path;

/// Ordered list of alternative package names for one logical app.
///
/// A catalog entry may declare `"com.app.main|com.app.alt"`; every lookup,
/// launch and uninstall tries the candidates in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCandidates {
    pub raw: String,
    pub names: Vec<String>,
}

/// Package registry entry as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub package_name: String,
    /// `None` when the package is installed but reports no version name
    pub version_name: Option<String>,
}

/// Installed state of a catalog entry, derived on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledState {
    /// The candidate that matched, if any
    pub installed_package: Option<String>,
    pub installed_version: Option<String>,
}

/// Read side of the device package manager.
pub trait PackageQuery: Send + Sync {
    /// Look up a single package name. Not-found is `None`.
    fn lookup(&self, package_name: &str) -> Option<PackageInfo>;
}

/// Write side of the device package manager.
pub trait PackageActions: Send + Sync {
    /// Hand a downloaded APK to the platform installer.
    fn install_apk(&self, apk_path: &Path) -> anyhow::Result<()>;
    /// Launch the app. Returns false when it has no launchable activity.
    fn launch(&self, package_name: &str) -> anyhow::Result<bool>;
    fn uninstall(&self, package_name: &str) -> anyhow::Result<()>;
}

/// Point-in-time copy of the device registry: package name -> version name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSnapshot {
    pub packages: HashMap<String, Option<String>>,
}
