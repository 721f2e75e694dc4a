pub mod session_sweep;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::{SessionConfig, WorkerConfig};
use crate::session::events::SessionEvents;
use crate::store::Store;

/// Upper bound on a single job run.
const JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Grace period between the shutdown signal and stopping the scheduler.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid schedule for {worker}: {source}")]
    Schedule {
        worker: &'static str,
        source: JobSchedulerError,
    },
    #[error(transparent)]
    Scheduler(#[from] JobSchedulerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    SessionSweep,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionSweep => "session_sweep",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: String,
}

/// Runs the periodic session sweep on the leader instance until shutdown.
pub struct WorkerManager {
    store: Arc<Store>,
    events: SessionEvents,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
    session: SessionConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        events: SessionEvents,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
        session: &SessionConfig,
    ) -> Self {
        Self {
            store,
            events,
            shutdown_rx,
            config: config.clone(),
            session: session.clone(),
        }
    }

    /// Jobs this instance schedules; empty unless it is the worker leader.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }
        vec![JobSpec {
            name: WorkerName::SessionSweep,
            cron: self.config.sweep_cron.clone(),
        }]
    }

    /// Schedule every planned job and block until shutdown. A job that cannot be
    /// scheduled fails startup.
    pub async fn start(mut self) -> Result<(), WorkerError> {
        let jobs = self.planned_jobs();
        if jobs.is_empty() {
            tracing::info!("Not the worker leader; no jobs scheduled");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        for spec in &jobs {
            self.schedule(&scheduler, spec).await?;
            tracing::info!(worker = spec.name.as_str(), cron = %spec.cron, "Scheduled worker");
        }
        scheduler.start().await?;

        let _ = self.shutdown_rx.recv().await;
        tracing::info!(drain_ms = DRAIN_TIMEOUT.as_millis() as u64, "Stopping workers");
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Scheduler did not shut down cleanly");
        }
        Ok(())
    }

    async fn schedule(&self, scheduler: &JobScheduler, spec: &JobSpec) -> Result<(), WorkerError> {
        match spec.name {
            WorkerName::SessionSweep => {
                let store = Arc::clone(&self.store);
                let events = self.events.clone();
                let ttl = self.session.ttl();
                add_job(scheduler, spec, move || {
                    let store = Arc::clone(&store);
                    let events = events.clone();
                    async move {
                        session_sweep::run(store.as_ref(), &events, ttl).await;
                    }
                })
                .await
            }
        }
    }
}

/// Set while a job runs; a tick that finds it set is skipped.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn add_job<F, Fut>(scheduler: &JobScheduler, spec: &JobSpec, run: F) -> Result<(), WorkerError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let worker = spec.name.as_str();
    let in_flight = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(spec.cron.as_str(), move |_id, _scheduler| {
        let Some(guard) = InFlight::try_acquire(&in_flight) else {
            tracing::warn!(worker, "Previous run still in progress; skipping tick");
            return Box::pin(async {});
        };
        let fut = run();
        Box::pin(async move {
            let _guard = guard;
            if tokio::time::timeout(JOB_TIMEOUT, fut).await.is_err() {
                tracing::error!(worker, timeout_secs = JOB_TIMEOUT.as_secs(), "Worker timed out");
            }
        })
    })
    .map_err(|source| WorkerError::Schedule { worker, source })?;

    scheduler.add(job).await?;
    Ok(())
}
