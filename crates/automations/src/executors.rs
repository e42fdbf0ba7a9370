use super::{server, Action, BoxedRaw, Executor, TaskType};
use anyhow::Context;
use futures::future::{BoxFuture, FutureExt};
use sqlx::types::Json as SqlJson;

/// ObjSafe is an object-safe and type-erased trait which is implemented for all Executors.
pub trait ObjSafe: Send + Sync + 'static {
    fn task_type(&self) -> TaskType;

    fn poll<'s>(
        &'s self,
        pool: &'s sqlx::PgPool,
        task_name: &'s str,
        state: Option<SqlJson<BoxedRaw>>,
    ) -> BoxFuture<'s, anyhow::Result<()>>;
}

impl<E: Executor> ObjSafe for E {
    fn task_type(&self) -> TaskType {
        E::TASK_TYPE
    }

    #[tracing::instrument(skip_all, fields(task_name = %task_name))]
    fn poll<'s>(
        &'s self,
        pool: &'s sqlx::PgPool,
        task_name: &'s str,
        state: Option<SqlJson<BoxedRaw>>,
    ) -> BoxFuture<'s, anyhow::Result<()>> {
        async move {
            let mut state_parsed: E::State = if let Some(state) = state {
                serde_json::from_str(state.get()).context("failed to decode task state")?
            } else {
                E::State::default()
            };

            let action = E::poll(self, pool, task_name, &mut state_parsed).await?;

            // Re-encode state for persistence.
            let state = SqlJson(
                serde_json::value::to_raw_value(&state_parsed)
                    .context("failed to encode inner state")?,
            );

            let mut txn = pool.begin().await?;
            () = persist_action(action, &mut *txn, task_name, state).await?;

            Ok(txn.commit().await?)
        }
        .boxed()
    }
}

pub async fn poll_task(
    server::ReadyTask {
        executor,
        permit: _guard,
        pool,
        task:
            server::DequeuedTask {
                task_name,
                task_type: _,
                inner_state,
                mut last_heartbeat,
            },
    }: server::ReadyTask,
    heartbeat_timeout: std::time::Duration,
) -> anyhow::Result<()> {
    let mut heartbeat_ticks = tokio::time::interval(heartbeat_timeout / 2);
    let _instant = heartbeat_ticks.tick().await; // Discard immediate first tick.

    // Build a Future which forever maintains our heartbeat or fails.
    let update_heartbeats = async {
        loop {
            let _instant = heartbeat_ticks.tick().await;

            last_heartbeat =
                match update_heartbeat(&pool, &task_name, heartbeat_timeout, last_heartbeat).await
                {
                    Ok(last_heartbeat) => last_heartbeat,
                    Err(err) => return err,
                }
        }
    };
    tokio::pin!(update_heartbeats);

    // Poll `executor` and `update_heartbeats` in tandem, so that a failure
    // to update our heartbeat also cancels the executor.
    tokio::select! {
        result = executor.poll(&pool, &task_name, inner_state) => result,
        err = &mut update_heartbeats => Err(err),
    }
}

async fn update_heartbeat(
    pool: &sqlx::PgPool,
    task_name: &str,
    heartbeat_timeout: std::time::Duration,
    expect_heartbeat: String,
) -> anyhow::Result<String> {
    let update = sqlx::query_scalar::<_, String>(
        r#"
        update internal.tasks
        set heartbeat = now()
        where task_name = $1 and heartbeat::text = $2
        returning heartbeat::text
        "#,
    )
    .bind(task_name)
    .bind(&expect_heartbeat)
    .fetch_optional(pool);

    // Bound the update by a fraction of `heartbeat_timeout`, so that a stalled
    // database fails our paired executor before another server may claim the task.
    let updated = match tokio::time::timeout(heartbeat_timeout / 4, update).await {
        Ok(Ok(Some(updated))) => updated,
        Ok(Ok(None)) => anyhow::bail!("task heartbeat was unexpectedly updated externally"),
        Ok(Err(err)) => return Err(anyhow::anyhow!(err).context("failed to update task heartbeat")),
        Err(err) => return Err(anyhow::anyhow!(err).context("timed out updating task heartbeat")),
    };

    tracing::debug!(
        last = expect_heartbeat,
        next = updated,
        "updated task heartbeat"
    );

    Ok(updated)
}

async fn persist_action(
    action: Action,
    txn: &mut sqlx::PgConnection,
    task_name: &str,
    state: SqlJson<BoxedRaw>,
) -> anyhow::Result<()> {
    // Releasing the heartbeat makes the task immediately available
    // to any server once `wake_at` passes.
    let updated = sqlx::query(
        r#"
        update internal.tasks set
            heartbeat = '0001-01-01T00:00:00Z',
            inner_state = $2::json,
            wake_at = now() + $3 * interval '1 second'
        where task_name = $1
        "#,
    )
    .bind(task_name)
    .bind(state)
    .bind(action.wake_after().as_secs_f64())
    .execute(&mut *txn)
    .await
    .context("failed to update task row")?;

    if updated.rows_affected() != 1 {
        anyhow::bail!("task {task_name:?} was removed while it was polled");
    }

    tracing::debug!(?action, "persisted task action");
    Ok(())
}
