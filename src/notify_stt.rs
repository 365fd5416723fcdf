pub const CHANNEL_ID: &str = "mind_apps_updates";
pub const NOTIFICATION_ID: i32 = 1001;

/// Error types for notification and badge presenters
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification permission denied")]
    PermissionDenied,
    #[error("Launcher badges are not supported")]
    BadgeUnsupported,
    #[error("{0}")]
    Other(String),
}

/// Grouped "updates available" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotification {
    pub id: i32,
    pub channel_id: String,
    pub title: String,
    /// Collapsed text: app names only
    pub short_text: String,
    /// One line per update with old and new version
    pub expanded_text: String,
    pub summary_text: String,
    pub count: usize,
}

pub trait UpdateNotifier: Send + Sync {
    fn notify(&self, notification: &UpdateNotification) -> Result<(), NotifyError>;
    fn cancel(&self, id: i32);
}

pub trait LauncherBadge: Send + Sync {
    fn apply_count(&self, count: usize) -> Result<(), NotifyError>;
    fn remove_count(&self) -> Result<(), NotifyError>;
}

/// Notifier that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

/// Badge for launchers without badge support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBadge;
