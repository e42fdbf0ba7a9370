use alert_engine::{ScanSummary, Scanner, Store};
use automations::{task_types, Action, Executor, TaskType};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Name of the durable task which drives recurring scans.
/// Registering it is idempotent, so any number of servers may do so.
pub const SCAN_TASK_NAME: &str = "scan-15m";

/// Scheduler drives recurring scans until `shutdown` resolves.
pub trait Scheduler {
    fn run<F>(self, shutdown: F) -> impl Future<Output = anyhow::Result<()>> + Send
    where
        F: Future<Output = ()> + Send;
}

/// IntervalScheduler scans immediately, and then on every interval
/// using an in-process timer. Scans don't survive process restarts,
/// and every running process scans independently.
pub struct IntervalScheduler<S> {
    scanner: Arc<Scanner<S>>,
    interval: Duration,
}

impl<S: Store> IntervalScheduler<S> {
    pub fn new(scanner: Arc<Scanner<S>>, interval: Duration) -> Self {
        Self { scanner, interval }
    }
}

impl<S: Store> Scheduler for IntervalScheduler<S> {
    async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!(interval = ?self.interval, "scheduling scans with an in-process timer");

        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticks.tick() => (),
                () = &mut shutdown => break,
            }

            // A started scan runs to completion, even if `shutdown` resolves meanwhile.
            if let Err(err) = self.scanner.run_scan(Utc::now()).await {
                tracing::error!(?err, "scan failed (will retry next interval)");
            }
        }

        tracing::info!("interval scheduler stopped");
        Ok(())
    }
}

/// DurableScheduler drives scans through a durable task queue.
///
/// The scan task is named and persisted, so its cadence survives restarts,
/// and its heartbeat lease ensures that only one server scans at a time.
pub struct DurableScheduler<S> {
    executor: ScanExecutor<S>,
    pool: sqlx::PgPool,
    dequeue_interval: Duration,
    heartbeat_timeout: Duration,
}

impl<S: Store> DurableScheduler<S> {
    /// Register the recurring scan task with the queue database `pool`.
    pub async fn register(
        scanner: Arc<Scanner<S>>,
        pool: sqlx::PgPool,
        config: &QueueConfig,
    ) -> anyhow::Result<Self> {
        automations::register_task(&pool, SCAN_TASK_NAME, ScanExecutor::<S>::TASK_TYPE).await?;

        Ok(Self {
            executor: ScanExecutor::new(scanner, config.scan_interval),
            pool,
            dequeue_interval: config.dequeue_interval,
            heartbeat_timeout: config.heartbeat_timeout,
        })
    }
}

impl<S: Store> Scheduler for DurableScheduler<S> {
    async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tracing::info!(
            task_name = SCAN_TASK_NAME,
            interval = ?self.executor.interval,
            "scheduling scans with the durable task queue"
        );

        automations::Server::new()
            .register(self.executor)
            .serve(
                1,
                self.pool,
                self.dequeue_interval,
                self.heartbeat_timeout,
                shutdown,
            )
            .await;

        tracing::info!("durable scheduler stopped");
        Ok(())
    }
}

/// ScanExecutor runs a scan on each poll of the recurring scan task.
pub struct ScanExecutor<S> {
    scanner: Arc<Scanner<S>>,
    interval: Duration,
}

/// Persisted state of the recurring scan task.
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<ScanSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Number of consecutive failed scans.
    #[serde(default)]
    pub failures: u32,
}

impl<S: Store> ScanExecutor<S> {
    pub fn new(scanner: Arc<Scanner<S>>, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    /// Run a scan as of `now`, recording its outcome into `state`,
    /// and return the delay until the next scan is due.
    pub async fn scan(&self, now: DateTime<Utc>, state: &mut ScanState) -> Duration {
        let started = tokio::time::Instant::now();

        match self.scanner.run_scan(now).await {
            Ok(summary) => {
                state.last_summary = Some(summary);
                state.last_error = None;
                state.failures = 0;
            }
            Err(err) => {
                tracing::error!(?err, failures = state.failures + 1, "scan failed (will retry next interval)");
                state.last_error = Some(format!("{err:#}"));
                state.failures += 1;
            }
        }
        state.last_scan_at = Some(now);

        self.interval.saturating_sub(started.elapsed())
    }
}

impl<S: Store> Executor for ScanExecutor<S> {
    const TASK_TYPE: TaskType = task_types::ALERT_SCAN;

    type State = ScanState;

    async fn poll<'s>(
        &'s self,
        _pool: &'s sqlx::PgPool,
        _task_name: &'s str,
        state: &'s mut Self::State,
    ) -> anyhow::Result<Action> {
        let sleep = self.scan(Utc::now(), state).await;
        Ok(Action::Sleep(sleep))
    }
}

/// Configuration of the durable task queue, if any.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub queue_database_url: Option<url::Url>,
    pub database_ca: Option<String>,
    pub require_durable_queue: bool,
    pub scan_interval: Duration,
    pub dequeue_interval: Duration,
    pub heartbeat_timeout: Duration,
}

/// A Scheduler chosen at startup.
pub enum SelectedScheduler<S> {
    Durable(DurableScheduler<S>),
    Interval(IntervalScheduler<S>),
}

impl<S: Store> Scheduler for SelectedScheduler<S> {
    async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        match self {
            SelectedScheduler::Durable(scheduler) => scheduler.run(shutdown).await,
            SelectedScheduler::Interval(scheduler) => scheduler.run(shutdown).await,
        }
    }
}

/// Select the durable scheduler if a queue database is configured and reachable,
/// and otherwise fall back to an interval scheduler.
///
/// When the durable queue is required, its absence or failure is an error.
pub async fn select_scheduler<S: Store>(
    scanner: Arc<Scanner<S>>,
    config: &QueueConfig,
) -> anyhow::Result<SelectedScheduler<S>> {
    let Some(url) = &config.queue_database_url else {
        if config.require_durable_queue {
            anyhow::bail!("a durable task queue is required, but no queue database is configured");
        }
        tracing::warn!("no queue database is configured; falling back to an in-process timer");

        return Ok(SelectedScheduler::Interval(IntervalScheduler::new(
            scanner,
            config.scan_interval,
        )));
    };

    let durable = async {
        let pool = crate::connect(url, config.database_ca.as_deref(), "alert-scanner-queue").await?;
        DurableScheduler::register(scanner.clone(), pool, config).await
    };

    match durable.await {
        Ok(durable) => Ok(SelectedScheduler::Durable(durable)),
        Err(err) if config.require_durable_queue => {
            Err(err.context("a durable task queue is required, but is unavailable"))
        }
        Err(err) => {
            tracing::error!(?err, "failed to set up durable task queue");
            tracing::warn!("falling back to an in-process timer");

            Ok(SelectedScheduler::Interval(IntervalScheduler::new(
                scanner,
                config.scan_interval,
            )))
        }
    }
}
