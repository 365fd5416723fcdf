pub use crate::api_catalog_stt::*;
use crate::Settings;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const CHUNK_SIZE: usize = 8192;

/// Error types for the store backend and downloads
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Non-2xx status or network failure
    #[error("{0}")]
    Transport(String),
    #[error("Empty response body")]
    EmptyBody,
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Download cancelled")]
    Cancelled,
    #[error("Download already in progress for {0}")]
    AlreadyInFlight(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ureq::Error> for StoreError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, resp) => {
                StoreError::Transport(format!("HTTP {}: {}", code, resp.status_text()))
            }
            ureq::Error::Transport(t) => StoreError::Transport(t.to_string()),
        }
    }
}

/// Store backend operations used by the update worker and the download queue.
pub trait StoreApi: Send + Sync {
    fn fetch_apps(&self) -> Result<Vec<AppDescriptor>, StoreError>;

    fn send_download_analytics(&self, package_name: &str, app_name: &str)
        -> Result<(), StoreError>;

    /// Stream `apk_url` into `destination`, reporting progress in [0, 1].
    /// `cancel` is checked between chunks.
    fn download_apk(
        &self,
        apk_url: &str,
        destination: &Path,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<PathBuf, StoreError>;
}

/// Parse the catalog body `{ "apps": [...] }`.
pub fn parse_catalog(body: &str) -> Result<Vec<AppDescriptor>, StoreError> {
    if body.trim().is_empty() {
        return Err(StoreError::EmptyBody);
    }
    let response: CatalogResponse = serde_json::from_str(body)?;
    Ok(response.apps)
}

/// Copy `reader` into `writer` chunk by chunk.
///
/// Progress is reported after each chunk when `content_length` is known,
/// and once more with 1.0 at the end. Returns the number of bytes copied.
/// Read failures are network failures and come back as `Transport`; write
/// failures stay `Io`.
pub fn copy_with_progress(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    content_length: Option<u64>,
    cancel: &AtomicBool,
    on_progress: &mut dyn FnMut(f32),
) -> Result<u64, StoreError> {
    let mut buffer = [0u8; CHUNK_SIZE];
    let mut total_bytes_read: u64 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(StoreError::Cancelled);
        }

        let bytes_read = match reader.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::Transport(format!("Download interrupted: {}", e))),
        };
        if bytes_read == 0 {
            break;
        }

        writer.write_all(&buffer[..bytes_read])?;
        total_bytes_read += bytes_read as u64;

        if let Some(len) = content_length.filter(|len| *len > 0) {
            let fraction = (total_bytes_read as f64 / len as f64).min(1.0);
            on_progress(fraction as f32);
        }
    }

    if total_bytes_read == 0 {
        return Err(StoreError::EmptyBody);
    }

    writer.flush()?;
    on_progress(1.0);
    Ok(total_bytes_read)
}

impl CatalogClient {
    pub fn new(settings: &Settings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(settings.connect_timeout_secs))
            .timeout_read(Duration::from_secs(settings.read_timeout_secs))
            .user_agent(USER_AGENT)
            .build();

        Self {
            base_url: settings.api_base_url.clone(),
            apps_endpoint: settings.apps_endpoint.clone(),
            data_endpoint: settings.data_endpoint.clone(),
            secret_key: settings.secret_key.clone(),
            agent,
        }
    }

    pub fn apps_url(&self) -> String {
        format!("{}{}", self.base_url, self.apps_endpoint)
    }

    pub fn data_url(&self) -> String {
        format!("{}{}", self.base_url, self.data_endpoint)
    }
}

impl StoreApi for CatalogClient {
    fn fetch_apps(&self) -> Result<Vec<AppDescriptor>, StoreError> {
        let url = self.apps_url();
        tracing::info!("Fetching app catalog from {}", url);

        let response = self.agent.get(&url).call()?;
        log::trace!("Catalog HTTP response status: {}", response.status());

        let body = response.into_string()?;
        let apps = parse_catalog(&body)?;

        tracing::info!("Catalog contains {} apps", apps.len());
        Ok(apps)
    }

    fn send_download_analytics(
        &self,
        package_name: &str,
        app_name: &str,
    ) -> Result<(), StoreError> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();

        self.agent.post(&self.data_url()).send_form(&[
            ("secret_key", self.secret_key.as_str()),
            ("package_name", package_name),
            ("app_name", app_name),
            ("action", "download"),
            ("timestamp", timestamp.as_str()),
        ])?;

        log::debug!("Download analytics sent for {}", package_name);
        Ok(())
    }

    fn download_apk(
        &self,
        apk_url: &str,
        destination: &Path,
        cancel: &AtomicBool,
        on_progress: &mut dyn FnMut(f32),
    ) -> Result<PathBuf, StoreError> {
        tracing::info!("Downloading APK from {} to {:?}", apk_url, destination);

        let response = self.agent.get(apk_url).call()?;
        let content_length = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let part_path = destination.with_extension("apk.part");
        let mut file = File::create(&part_path)?;
        let mut reader = response.into_reader();

        let copied = copy_with_progress(&mut reader, &mut file, content_length, cancel, on_progress);
        drop(file);

        match copied {
            Ok(bytes) => {
                fs::rename(&part_path, destination)?;
                tracing::info!("Downloaded {} bytes to {:?}", bytes, destination);
                Ok(destination.to_path_buf())
            }
            Err(e) => {
                if let Err(e2) = fs::remove_file(&part_path) {
                    log::warn!("Failed to clean up partial download: {}", e2);
                }
                Err(e)
            }
        }
    }
}
