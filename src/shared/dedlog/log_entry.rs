use dashmap::DashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn as warn_event;

use crate::dedlog::consts;
use crate::dedlog::sanitizer::{Sanitizer, WithCollapseSpaces};

/// One aggregated message of the current flush window.
struct LogEntry {
    err: Option<String>,
    reason: String,
    extra: Option<String>,
    count: usize,
}

impl LogEntry {
    fn new(err: Option<String>, extra: Option<String>, reason: String) -> Self {
        Self {
            err,
            reason,
            extra,
            count: 1,
        }
    }
}

// Set once the background logger is running; until then entries are dropped.
// std Mutex with try_lock keeps the hot path synchronous and non-blocking.
static SINK: once_cell::sync::Lazy<Mutex<Option<mpsc::Sender<LogEntry>>>> =
    once_cell::sync::Lazy::new(|| Mutex::new(None));

fn sender() -> Option<mpsc::Sender<LogEntry>> {
    SINK.try_lock().ok().and_then(|guard| guard.clone())
}

fn install_sender(tx: mpsc::Sender<LogEntry>) {
    if let Ok(mut guard) = SINK.lock() {
        *guard = Some(tx);
    }
}

/// Reports a warning-level message without blocking the caller.
pub fn warn(err: Option<&dyn std::error::Error>, extra: Option<&str>, msg: &str) {
    if let Some(tx) = sender() {
        let entry = LogEntry::new(
            err.map(|e| e.to_string()),
            extra.map(|s| s.to_string()),
            msg.to_string(),
        );
        let _ = tx.try_send(entry);
    }
}

/// Collapses `entry` into the window; the first error and extra of a reason win.
fn fold(window: &DashMap<String, LogEntry>, entry: LogEntry) {
    if let Some(mut existing) = window.get_mut(&entry.reason) {
        existing.count += 1;
        return;
    }
    window.insert(entry.reason.clone(), entry);
}

/// Starts the deduplicated logger; runs until `ctx` is cancelled.
pub async fn start_dedup_logger(ctx: CancellationToken) {
    let (tx, mut rx) = mpsc::channel(consts::CHANNEL_CAPACITY);
    install_sender(tx);

    let mut window: DashMap<String, LogEntry> = DashMap::new();

    let mut interval = tokio::time::interval(consts::FLUSH_EVERY);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let sanitizer = Sanitizer::new(WithCollapseSpaces(true));

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                flush(&sanitizer, std::mem::take(&mut window));
                break;
            }
            entry = rx.recv() => {
                if let Some(entry) = entry {
                    fold(&window, entry);
                }
            }
            _ = interval.tick() => {
                flush(&sanitizer, std::mem::take(&mut window));
            }
        }
    }
}

fn flush(sanitizer: &Sanitizer, window: DashMap<String, LogEntry>) {
    for (_, entry) in window.into_iter() {
        let err = entry.err.as_deref().map(|e| sanitizer.sanitize(e)).unwrap_or_default();
        let extra = entry.extra.as_deref().unwrap_or_default();
        warn_event!(
            component = consts::COMPONENT,
            count = entry.count,
            err = %err,
            extra = %extra,
            "{}", entry.reason
        );
    }
}
