use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::middleware::rate_limit::RateLimits;
use crate::session::events::SessionEvents;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    events: SessionEvents,
    rate_limits: Arc<RateLimits>,
    config: Arc<Config>,
    sse_connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        events: SessionEvents,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            events,
            rate_limits: Arc::new(RateLimits::new(&config.rate_limit)),
            config: Arc::new(config.clone()),
            sse_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn rate_limits(&self) -> &Arc<RateLimits> {
        &self.rate_limits
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reserves an event-stream slot, or returns `None` when the configured cap is reached.
    pub fn try_acquire_sse(&self) -> Option<SseSlot> {
        let max = self.config.limits.max_sse_connections;
        self.sse_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| SseSlot {
                counter: Arc::clone(&self.sse_connections),
            })
    }

    pub fn sse_connections(&self) -> usize {
        self.sse_connections.load(Ordering::Acquire)
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Held for the lifetime of one event stream; releases its slot on drop.
pub struct SseSlot {
    counter: Arc<AtomicUsize>,
}

impl Drop for SseSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
