use super::{executors, BoxedRaw, Executor, Server, TaskType};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;

impl Server {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Register an Executor to be served by this Server.
    pub fn register<E: Executor>(mut self, executor: E) -> Self {
        let index = match self
            .0
            .binary_search_by_key(&E::TASK_TYPE, |entry| entry.task_type())
        {
            Ok(_index) => panic!("an Executor for {:?} is already registered", E::TASK_TYPE),
            Err(index) => index,
        };

        self.0.insert(index, Arc::new(executor));
        self
    }

    /// Serve this Server until signaled to stop by `shutdown`.
    ///
    /// At most `permits` tasks are polled at once. Upon `shutdown`, no further
    /// tasks are dequeued and serve() returns once running polls complete.
    pub async fn serve(
        self,
        permits: u32,
        pool: sqlx::PgPool,
        dequeue_interval: std::time::Duration,
        heartbeat_timeout: std::time::Duration,
        shutdown: impl std::future::Future<Output = ()>,
    ) {
        serve(
            self,
            permits,
            pool,
            dequeue_interval,
            heartbeat_timeout,
            shutdown,
        )
        .await
    }

    pub(crate) fn task_types(&self) -> Vec<i16> {
        self.0.iter().map(|e| e.task_type().0).collect()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ReadyTask {
    pub executor: Arc<dyn executors::ObjSafe>,
    pub permit: tokio::sync::OwnedSemaphorePermit,
    pub pool: sqlx::PgPool,
    pub task: DequeuedTask,
}

#[derive(sqlx::FromRow)]
pub struct DequeuedTask {
    pub task_name: String,
    pub task_type: TaskType,
    pub inner_state: Option<SqlJson<BoxedRaw>>,
    pub last_heartbeat: String,
}

pub async fn serve(
    executors: Server,
    permits: u32,
    pool: sqlx::PgPool,
    dequeue_interval: std::time::Duration,
    heartbeat_timeout: std::time::Duration,
    shutdown: impl std::future::Future<Output = ()>,
) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(permits as usize));
    let task_types = executors.task_types();
    tokio::pin!(shutdown);

    // Poll for ready tasks and start them until `shutdown` is signaled.
    loop {
        let ready = tokio::select! {
            ready = ready_tasks(&executors, &pool, &semaphore, &task_types, heartbeat_timeout) => ready,
            () = &mut shutdown => break,
        };

        let ready = match ready {
            Ok(ready) => ready,
            Err(err) => {
                tracing::error!(?err, "failed to poll for tasks (will retry)");
                Vec::new()
            }
        };
        let idle = semaphore.available_permits() != 0;

        for ready in ready {
            tokio::spawn(async move {
                let (task_name, task_type) = (ready.task.task_name.clone(), ready.task.task_type);

                if let Err(err) = executors::poll_task(ready, heartbeat_timeout).await {
                    tracing::warn!(
                        %task_name,
                        ?task_type,
                        ?err,
                        "task executor failed and will be retried after heartbeat timeout"
                    );
                }
            });
        }

        // If permits remain, there were not enough tasks to dequeue.
        // Sleep for up-to `dequeue_interval`, cancelling early if a task completes.
        if idle {
            // Jitter dequeue by 10% in either direction, to ensure
            // distribution of tasks and retries across servers.
            let jitter = 0.9 + rand::random::<f64>() * 0.2; // [0.9, 1.1)

            tokio::select! {
                () = tokio::time::sleep(dequeue_interval.mul_f64(jitter)) => (),
                () = &mut shutdown => break,
            }
        }
    }
    tracing::info!("task polling loop signaled to stop and is awaiting running tasks");

    // Acquiring all permits only happens after all running tasks have finished.
    let _ = semaphore.acquire_many(permits).await;
}

/// Block until a permit is available, and then dequeue up to as many tasks
/// as there are available permits.
async fn ready_tasks(
    executors: &Server,
    pool: &sqlx::PgPool,
    semaphore: &Arc<tokio::sync::Semaphore>,
    task_types: &[i16],
    heartbeat_timeout: std::time::Duration,
) -> sqlx::Result<Vec<ReadyTask>> {
    // Permits are released by completed polls. The semaphore is never closed.
    if let Ok(permit) = semaphore.acquire().await {
        drop(permit);
    }
    let limit = semaphore.available_permits() as i64;

    let dequeued = sqlx::query_as::<_, DequeuedTask>(
        r#"
        with picked as (
            select task_name
            from internal.tasks
            where
                task_type = any($1) and
                wake_at   < now() and
                heartbeat < now() - $2 * interval '1 second'
            order by wake_at
            limit $3
            for update skip locked
        )
        update internal.tasks
        set heartbeat = now()
        where task_name in (select task_name from picked)
        returning
            task_name,
            task_type,
            inner_state,
            heartbeat::text as last_heartbeat
        "#,
    )
    .bind(task_types)
    .bind(heartbeat_timeout.as_secs_f64())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    tracing::debug!(dequeued = dequeued.len(), "completed task dequeue");

    let mut ready = Vec::with_capacity(dequeued.len());
    for task in dequeued {
        let Ok(index) = task_types.binary_search(&task.task_type.0) else {
            panic!("polled {:?} with unexpected {:?}", task.task_name, task.task_type);
        };
        // Only this loop acquires permits, so each dequeued task has one.
        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            tracing::warn!(task_name = %task.task_name, "no permit for dequeued task (will retry)");
            continue;
        };
        ready.push(ReadyTask {
            executor: executors.0[index].clone(),
            permit,
            pool: pool.clone(),
            task,
        });
    }

    Ok(ready)
}
