use std::time::Duration;

use crate::session::events::{SessionEvent, SessionEvents};
use crate::session::{self, sweep_expired, SweepReport};
use crate::store::SessionStore;

/// 清理超过 TTL 的会话（索引与日志一并删除），并通知仍在监听的连接
pub async fn run<S>(store: &S, events: &SessionEvents, ttl: Duration) -> Option<SweepReport>
where
    S: SessionStore + ?Sized,
{
    tracing::debug!("session_sweep: start");
    match sweep_expired(store, session::timestamp(), ttl) {
        Ok(report) => {
            if report.removed.is_empty() {
                tracing::debug!(scanned = report.scanned, "session_sweep: nothing expired");
            } else {
                tracing::info!(
                    scanned = report.scanned,
                    removed = report.removed.len(),
                    skipped = report.skipped_malformed.len(),
                    "session_sweep: done"
                );
            }
            for code in &report.removed {
                events.publish(SessionEvent::Closed { code: code.clone() });
            }
            Some(report)
        }
        Err(e) => {
            tracing::error!(error = %e, "session_sweep failed");
            None
        }
    }
}
