use crate::LogLevel;
use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const MAX_LINES: usize = 500;

struct LogBuffer {
    lines: VecDeque<String>,
    level: LogLevel,
}

static LOG_BUFFER: OnceLock<Mutex<LogBuffer>> = OnceLock::new();

fn get_log_buffer() -> &'static Mutex<LogBuffer> {
    LOG_BUFFER.get_or_init(|| {
        Mutex::new(LogBuffer {
            lines: VecDeque::with_capacity(MAX_LINES),
            level: LogLevel::Info,
        })
    })
}

/// Capture events at `level` and above.
pub fn set_capture_level(level: LogLevel) {
    if let Ok(mut buffer) = get_log_buffer().lock() {
        buffer.level = level;
    }
}

pub fn append_log(level: LogLevel, message: String) {
    if let Ok(mut buffer) = get_log_buffer().lock() {
        if level > buffer.level {
            return;
        }
        if buffer.lines.len() == MAX_LINES {
            buffer.lines.pop_front();
        }
        buffer.lines.push_back(message);
    }
}

/// Most recent captured lines, oldest first.
pub fn recent_logs(limit: usize) -> Vec<String> {
    match get_log_buffer().lock() {
        Ok(buffer) => {
            let skip = buffer.lines.len().saturating_sub(limit);
            buffer.lines.iter().skip(skip).cloned().collect()
        }
        Err(_) => Vec::new(),
    }
}

pub fn clear_logs() {
    if let Ok(mut buffer) = get_log_buffer().lock() {
        buffer.lines.clear();
    }
}

pub struct LogCaptureLayer;

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        struct MessageVisitor {
            message: String,
        }

        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = format!("{:?}", value);
                }
            }

            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = value.to_string();
                }
            }
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let log_line = format!(
            "{} [{}] {}: {}",
            chrono::Local::now().format("%H:%M:%S"),
            metadata.level(),
            metadata.target(),
            visitor.message
        );
        append_log(LogLevel::from(*metadata.level()), log_line);
    }
}

type ReloadFn = Box<dyn Fn(LogLevel) + Send + Sync>;

static RELOAD_FN: OnceLock<ReloadFn> = OnceLock::new();

/// Register how the installed subscriber swaps its filter. Only the first
/// registration is kept; returns false for later ones.
pub fn set_reload_fn<F>(reload_fn: F) -> bool
where
    F: Fn(LogLevel) + Send + Sync + 'static,
{
    RELOAD_FN.set(Box::new(reload_fn)).is_ok()
}

/// Switch the subscriber filter and the capture buffer to `level`.
pub fn update_tracing_level(level: LogLevel) {
    if let Some(reload_fn) = RELOAD_FN.get() {
        reload_fn(level);
    }
    set_capture_level(level);
}
