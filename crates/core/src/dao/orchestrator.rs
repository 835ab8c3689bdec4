//! Background refresh of many DAOs with a small worker pool.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::CoreError;

use super::worksheet_dao::WorksheetDao;

pub const DEFAULT_WORKERS: usize = 6;
pub const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

type RefreshFn = dyn Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync;

/// One refresh callable, typically `dao.get(force)` or `dao.access(force)`.
/// The callable is invoked again on each retry.
#[derive(Clone)]
pub struct RefreshTask {
    label: String,
    call: Arc<RefreshFn>,
}

impl RefreshTask {
    pub fn new<F>(label: impl Into<String>, call: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            call: Arc::new(call),
        }
    }

    /// Refresh through [`WorksheetDao::get`].
    pub fn get(dao: Arc<WorksheetDao>, force: bool) -> Self {
        let label = dao.name().to_string();
        Self::new(label, move || {
            let dao = dao.clone();
            Box::pin(async move { dao.get(force).await.map(|_| ()) })
        })
    }

    /// Refresh through [`WorksheetDao::access`].
    pub fn access(dao: Arc<WorksheetDao>, force: bool) -> Self {
        let label = dao.name().to_string();
        Self::new(label, move || {
            let dao = dao.clone();
            Box::pin(async move { dao.access(force).await.map(|_| ()) })
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for RefreshTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTask").field("label", &self.label).finish()
    }
}

/// Outcome of one refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Attempts beyond the first, over all tasks.
    pub retries: usize,
    /// `(task label, error)` of every failed task.
    pub failures: Vec<(String, String)>,
}

/// Runs refresh tasks in parallel.
///
/// Each worker retries its task on transport errors, up to `retries`
/// attempts in total. Failures are logged and reported, never propagated.
/// Every finished run bumps the counter observed through
/// [`finished`](Self::finished).
#[derive(Clone)]
pub struct RefreshOrchestrator {
    workers: usize,
    retries: u32,
    retry_delay: Duration,
    finished: Arc<watch::Sender<u64>>,
}

impl RefreshOrchestrator {
    pub fn new(workers: usize, retries: u32) -> Self {
        let (finished, _) = watch::channel(0);
        Self {
            workers: workers.max(1),
            retries: retries.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
            finished: Arc::new(finished),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Receiver of the number of completed runs.
    pub fn finished(&self) -> watch::Receiver<u64> {
        self.finished.subscribe()
    }

    /// Run `tasks` to completion.
    #[instrument(skip(self, tasks), fields(tasks = tasks.len(), workers = self.workers))]
    pub async fn run(&self, tasks: Vec<RefreshTask>) -> RefreshReport {
        let total = tasks.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let report = Arc::new(Mutex::new(RefreshReport {
            total,
            ..RefreshReport::default()
        }));

        let mut handles = Vec::new();
        for worker_id in 0..self.workers.min(total.max(1)) {
            let queue = Arc::clone(&queue);
            let report = Arc::clone(&report);
            let retries = self.retries;
            let retry_delay = self.retry_delay;
            handles.push(tokio::spawn(async move {
                worker(worker_id, queue, report, retries, retry_delay).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "refresh worker aborted");
            }
        }

        let mut report = report.lock().clone();
        // Tasks of an aborted worker never reported back.
        let lost = report.total - report.succeeded - report.failed;
        if lost > 0 {
            report.failed += lost;
        }

        self.finished.send_modify(|runs| *runs += 1);
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            retries = report.retries,
            "refresh finished"
        );
        report
    }

    /// Run `tasks` in the background.
    pub fn spawn(&self, tasks: Vec<RefreshTask>) -> JoinHandle<RefreshReport> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run(tasks).await })
    }
}

impl Default for RefreshOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_RETRIES)
    }
}

async fn worker(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<RefreshTask>>>,
    report: Arc<Mutex<RefreshReport>>,
    retries: u32,
    retry_delay: Duration,
) {
    loop {
        let Some(task) = queue.lock().pop_front() else {
            break;
        };
        debug!(worker_id, task = task.label(), "refresh started");

        let mut attempt = 1;
        let outcome = loop {
            match (task.call)().await {
                Ok(()) => break Ok(()),
                Err(e) if e.is_retryable() && attempt < retries => {
                    warn!(worker_id, task = task.label(), attempt, error = %e, "refresh failed, retrying");
                    attempt += 1;
                    if !retry_delay.is_zero() {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
                Err(e) => break Err(e),
            }
        };

        let mut totals = report.lock();
        totals.retries += (attempt - 1) as usize;
        match outcome {
            Ok(()) => totals.succeeded += 1,
            Err(e) => {
                error!(worker_id, task = task.label(), error = %e, "refresh failed");
                totals.failed += 1;
                totals.failures.push((task.label().to_string(), e.to_string()));
            }
        }
        drop(totals);
    }
}
