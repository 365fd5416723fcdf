/// Package manager backed by the `adb` tool on the host.
///
/// With no device serial, adb picks the only connected device.
#[derive(Debug, Clone)]
pub struct AdbPackageManager {
    pub device: Option<String>,
    pub adb_path: String,
}

/// One `Package [...]` block from `dumpsys package` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpsysPackage {
    pub pkg: String,
    pub version_name: Option<String>,
    pub version_code: Option<i64>,
}
