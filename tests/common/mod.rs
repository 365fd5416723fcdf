#![allow(dead_code)]

use mindapps::android_packagemanager::PackageActions;
use mindapps::api_catalog::{StoreApi, StoreError};
use mindapps::api_catalog_stt::AppDescriptor;
use mindapps::notify::{LauncherBadge, NotifyError, UpdateNotification, UpdateNotifier};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

pub fn app(package_name: &str, name: &str, version: &str) -> AppDescriptor {
    AppDescriptor {
        package_name: package_name.to_string(),
        name: name.to_string(),
        author: "Mind Apps".to_string(),
        icon_url: String::new(),
        version: version.to_string(),
        apk_url: format!("https://example.com/{}.apk", package_name),
        tags: Vec::new(),
        description: String::new(),
        release_date: None,
    }
}

pub struct FakeApi {
    pub apps: Vec<AppDescriptor>,
    pub fail: AtomicBool,
}

impl FakeApi {
    pub fn new(apps: Vec<AppDescriptor>) -> Self {
        Self {
            apps,
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            apps: Vec::new(),
            fail: AtomicBool::new(true),
        }
    }
}

impl StoreApi for FakeApi {
    fn fetch_apps(&self) -> Result<Vec<AppDescriptor>, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("HTTP 503: Service Unavailable".to_string()));
        }
        Ok(self.apps.clone())
    }

    fn send_download_analytics(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn download_apk(
        &self,
        _: &str,
        destination: &Path,
        _: &AtomicBool,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<PathBuf, StoreError> {
        std::fs::write(destination, b"apk")?;
        on_progress(1.0);
        Ok(destination.to_path_buf())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub posted: Mutex<Vec<UpdateNotification>>,
}

impl UpdateNotifier for RecordingNotifier {
    fn notify(&self, notification: &UpdateNotification) -> Result<(), NotifyError> {
        self.posted.lock().unwrap().push(notification.clone());
        Ok(())
    }

    fn cancel(&self, _: i32) {}
}

#[derive(Default)]
pub struct RecordingBadge {
    pub count: Mutex<Option<usize>>,
}

impl LauncherBadge for RecordingBadge {
    fn apply_count(&self, count: usize) -> Result<(), NotifyError> {
        *self.count.lock().unwrap() = Some(count);
        Ok(())
    }

    fn remove_count(&self) -> Result<(), NotifyError> {
        *self.count.lock().unwrap() = Some(0);
        Ok(())
    }
}

#[derive(Default)]
pub struct NoopActions;

impl PackageActions for NoopActions {
    fn install_apk(&self, _: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn launch(&self, _: &str) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn uninstall(&self, _: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A canned HTTP response.
#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    /// Content-Length to announce when it should not match the body
    pub declared_length: Option<usize>,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            declared_length: None,
        }
    }

    /// A 200 that announces `declared_length` bytes and closes early.
    pub fn truncated(body: impl Into<Vec<u8>>, declared_length: usize) -> Self {
        Self {
            declared_length: Some(declared_length),
            ..Self::ok(body)
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            declared_length: None,
        }
    }
}

/// Request line and body of every request the server saw.
pub type RequestLog = Arc<Mutex<Vec<(String, String)>>>;

/// Serve `routes` on a local port; returns the base URL ending in '/'.
pub fn serve(routes: HashMap<String, Route>) -> (String, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}/", listener.local_addr().unwrap());
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            if reader.read_line(&mut request_line).is_err() {
                continue;
            }
            let mut content_length = 0usize;
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header).is_err() || header.trim().is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body);

            let path = request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or("/")
                .trim_start_matches('/')
                .to_string();
            seen.lock()
                .unwrap()
                .push((request_line.trim().to_string(), String::from_utf8_lossy(&body).to_string()));

            let route = routes.get(&path).cloned().unwrap_or(Route::status(404));
            let reason = match route.status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                _ => "Unknown",
            };
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                route.status,
                reason,
                route.declared_length.unwrap_or(route.body.len())
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&route.body);
            let _ = stream.flush();
        }
    });

    (base_url, requests)
}
