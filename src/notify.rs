pub use crate::notify_stt::*;

/// Show `count` on the launcher icon, or clear it at zero.
/// Badge errors never reach the caller.
pub fn set_launcher_badge(badge: &dyn LauncherBadge, count: usize) {
    let result = if count > 0 {
        badge.apply_count(count)
    } else {
        badge.remove_count()
    };

    if let Err(e) = result {
        log::debug!("Launcher badge not updated: {}", e);
    }
}

pub fn clear_launcher_badge(badge: &dyn LauncherBadge) {
    if let Err(e) = badge.remove_count() {
        log::debug!("Launcher badge not cleared: {}", e);
    }
}

impl UpdateNotifier for LogNotifier {
    fn notify(&self, notification: &UpdateNotification) -> Result<(), NotifyError> {
        tracing::info!(
            "[{}] {}: {}",
            notification.channel_id,
            notification.title,
            notification.short_text
        );
        for line in notification.expanded_text.lines() {
            tracing::info!("  {}", line);
        }
        Ok(())
    }

    fn cancel(&self, id: i32) {
        tracing::debug!("Notification {} dismissed", id);
    }
}

impl LauncherBadge for UnsupportedBadge {
    fn apply_count(&self, _count: usize) -> Result<(), NotifyError> {
        Err(NotifyError::BadgeUnsupported)
    }

    fn remove_count(&self) -> Result<(), NotifyError> {
        Err(NotifyError::BadgeUnsupported)
    }
}
