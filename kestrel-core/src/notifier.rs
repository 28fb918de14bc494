//! Process-wide event notifier seam
//!
//! Session transitions and recoverable runtime errors are surfaced here
//! instead of being thrown across module boundaries. The runner decides
//! where they go (log, message queue, operator console).

use crate::core::CoreError;

pub trait EventNotifier: Send + Sync {
    /// A trading session began (`began = true`) or ended.
    fn on_session_event(&self, trading_date: u32, began: bool);

    /// A recoverable runtime error, keyed by its kind tag.
    fn on_runtime_event(&self, kind: &str, message: &str);
}

/// Forward a core error through a (possibly absent) notifier.
pub fn notify_error(notifier: Option<&dyn EventNotifier>, err: &CoreError) {
    if let Some(n) = notifier {
        n.on_runtime_event(err.kind(), &err.to_string());
    }
}

/// Notifier that only logs; the default when the runner wires nothing in.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl EventNotifier for LogNotifier {
    fn on_session_event(&self, trading_date: u32, began: bool) {
        if began {
            tracing::info!("session event: trading day {} begun", trading_date);
        } else {
            tracing::info!("session event: trading day {} ended", trading_date);
        }
    }

    fn on_runtime_event(&self, kind: &str, message: &str) {
        tracing::warn!("runtime event [{}]: {}", kind, message);
    }
}
