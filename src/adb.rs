// interface for adb commands wrapper
// get_devices : return value of "adb devices"
// dump_package : version info of one package via dumpsys
// list_packages : version info of every package via dumpsys
// install_apk : install apk on connected device
// uninstall_app : uninstall app from connected device
// launch_app : start the launcher activity of a package

pub use crate::adb_stt::*;
use crate::android_packagemanager::{PackageActions, PackageInfo, PackageQuery, PackageSnapshot};
use regex::Regex;
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, error};

impl Default for AdbPackageManager {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AdbPackageManager {
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            adb_path: "adb".to_string(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(device) = &self.device {
            cmd.arg("-s").arg(device);
        }
        cmd
    }

    fn run(&self, args: &[&str]) -> std::io::Result<String> {
        debug!("adb {:?} (device: {:?})", args, self.device);
        let output = self.command().args(args).output()?;
        output_to_result(output)
    }

    /// Version info for one package, `None` when it is not installed.
    pub fn dump_package(&self, package_name: &str) -> std::io::Result<Option<DumpsysPackage>> {
        let text = self.run(&["shell", "dumpsys", "package", package_name])?;
        Ok(parse_dumpsys_packages(&text)
            .into_iter()
            .find(|p| p.pkg == package_name))
    }

    /// Snapshot of every installed package in a single adb round trip.
    pub fn list_packages(&self) -> std::io::Result<PackageSnapshot> {
        let text = self.run(&["shell", "dumpsys", "package", "packages"])?;
        debug!("Received {} bytes of package data", text.len());

        let mut snapshot = PackageSnapshot::new();
        for p in parse_dumpsys_packages(&text) {
            // hidden system packages repeat the name with the factory version
            if !snapshot.packages.contains_key(&p.pkg) {
                snapshot.packages.insert(p.pkg, p.version_name);
            }
        }
        debug!("Parsed {} packages", snapshot.len());
        Ok(snapshot)
    }

    pub fn install_apk(&self, apk_path: &Path) -> std::io::Result<String> {
        let path = apk_path.to_string_lossy().to_string();
        let result = self.run(&["install", "-r", &path])?;
        // older adb versions exit 0 even when pm reports a failure
        if result.contains("Failure") {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, result));
        }
        Ok(result)
    }

    pub fn uninstall_app(&self, package_name: &str) -> std::io::Result<String> {
        self.run(&["uninstall", package_name])
    }

    /// Start the launcher activity. Ok(false) when the package has none.
    pub fn launch_app(&self, package_name: &str) -> std::io::Result<bool> {
        let result = self.run(&[
            "shell",
            "monkey",
            "-p",
            package_name,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])?;
        Ok(!result.contains("No activities found"))
    }
}

fn output_to_result(output: Output) -> std::io::Result<String> {
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let err = String::from_utf8_lossy(&output.stderr).to_string();
        error!("ADB command failed: {}", err);
        Err(std::io::Error::new(std::io::ErrorKind::Other, err))
    }
}

pub fn get_devices() -> std::io::Result<Vec<String>> {
    let output = Command::new("adb").arg("devices").arg("-l").output()?;
    let devices = output_to_result(output)?;
    Ok(parse_devices(&devices))
}

fn parse_devices(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            // Skip empty lines and the header line
            if line.trim().is_empty() || line.starts_with("List of devices") {
                return None;
            }

            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            match tokens.next() {
                Some("device") => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Parse `Package [name] (hash):` blocks out of dumpsys output.
pub fn parse_dumpsys_packages(text: &str) -> Vec<DumpsysPackage> {
    let package_re = Regex::new(r"Package \[([^\]]+)\] \(([^)]+)\)").unwrap();
    let version_name_re = Regex::new(r"versionName=(\S*)").unwrap();
    let version_code_re = Regex::new(r"versionCode=(\d+)").unwrap();

    let mut packages: Vec<DumpsysPackage> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = package_re.captures(line) {
            packages.push(DumpsysPackage {
                pkg: caps[1].to_string(),
                version_name: None,
                version_code: None,
            });
            continue;
        }

        let Some(current) = packages.last_mut() else {
            continue;
        };

        if current.version_name.is_none() {
            if let Some(caps) = version_name_re.captures(line) {
                let vn = caps[1].trim();
                if !vn.is_empty() && vn != "null" {
                    current.version_name = Some(vn.to_string());
                }
            }
        }
        if current.version_code.is_none() {
            if let Some(caps) = version_code_re.captures(line) {
                current.version_code = caps[1].parse().ok();
            }
        }
    }

    packages
}

impl PackageQuery for AdbPackageManager {
    fn lookup(&self, package_name: &str) -> Option<PackageInfo> {
        match self.dump_package(package_name) {
            Ok(found) => found.map(|p| PackageInfo {
                package_name: p.pkg,
                version_name: p.version_name,
            }),
            Err(e) => {
                error!("Failed to query package {}: {}", package_name, e);
                None
            }
        }
    }
}

impl PackageActions for AdbPackageManager {
    fn install_apk(&self, apk_path: &Path) -> anyhow::Result<()> {
        let result = AdbPackageManager::install_apk(self, apk_path)?;
        log::info!("APK installed: {}", result.trim());
        Ok(())
    }

    fn launch(&self, package_name: &str) -> anyhow::Result<bool> {
        Ok(self.launch_app(package_name)?)
    }

    fn uninstall(&self, package_name: &str) -> anyhow::Result<()> {
        let result = self.uninstall_app(package_name)?;
        log::info!("Uninstalled {}: {}", package_name, result.trim());
        Ok(())
    }
}
