use std::sync::Arc;

mod executors;
pub mod server;

/// BoxedRaw is a type-erased raw JSON message.
type BoxedRaw = Box<serde_json::value::RawValue>;

/// SQL schema of the `internal.tasks` table.
pub const SCHEMA: &str = include_str!("../schema.sql");

/// TaskType is the type of a task, and maps it to an Executor.
#[derive(
    Debug,
    serde::Deserialize,
    serde::Serialize,
    sqlx::Type,
    PartialOrd,
    PartialEq,
    Ord,
    Eq,
    Clone,
    Copy,
)]
#[sqlx(transparent)]
pub struct TaskType(pub i16);

/// Task types must be globally unique, as a task row is polled by whichever
/// Executor is registered for its type. These must not change once in use.
pub mod task_types {
    use super::TaskType;

    pub const ALERT_SCAN: TaskType = TaskType(1);
}

/// Action undertaken by an Executor task poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Sleep for the indicated Duration, then poll again.
    Sleep(std::time::Duration),
}

/// Executor is the core trait implemented by executors of various task types.
pub trait Executor: Send + Sync + 'static {
    const TASK_TYPE: TaskType;

    type State: Default + serde::de::DeserializeOwned + serde::Serialize + Send;

    /// Poll the named task. Updates of `state` are persisted with the returned
    /// Action. An error leaves the task's state as it was, and the task is
    /// retried once its heartbeat lapses.
    fn poll<'s>(
        &'s self,
        pool: &'s sqlx::PgPool,
        task_name: &'s str,
        state: &'s mut Self::State,
    ) -> impl std::future::Future<Output = anyhow::Result<Action>> + Send + 's;
}

/// Server holds registered implementations of Executors and serves them.
pub struct Server(Vec<Arc<dyn executors::ObjSafe>>);

/// Apply `SCHEMA`, which is idempotent.
pub async fn apply_schema(pool: &sqlx::PgPool) -> sqlx::Result<()> {
    use sqlx::Executor;

    pool.execute(SCHEMA).await?;
    Ok(())
}

/// Register a named task of the given type, which is idempotent.
///
/// A task which doesn't exist is created and is ready to run immediately.
/// An existing task keeps its state and schedule. Registering the same name
/// with a different type is an error.
pub async fn register_task(
    pool: &sqlx::PgPool,
    task_name: &str,
    task_type: TaskType,
) -> anyhow::Result<()> {
    let registered = sqlx::query_scalar::<_, TaskType>(
        r#"
        insert into internal.tasks (task_name, task_type, wake_at)
        values ($1, $2, now())
        on conflict (task_name) do update set
            task_type = internal.tasks.task_type
        returning task_type
        "#,
    )
    .bind(task_name)
    .bind(task_type)
    .fetch_one(pool)
    .await?;

    if registered != task_type {
        anyhow::bail!(
            "task {task_name:?} is already registered with {registered:?}, not {task_type:?}"
        );
    }
    tracing::debug!(task_name, ?task_type, "registered task");

    Ok(())
}

impl Action {
    /// Delay after which a task taking this Action is polled again.
    pub fn wake_after(&self) -> std::time::Duration {
        match self {
            Action::Sleep(interval) => *interval,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_wake_after() {
        assert_eq!(
            Action::Sleep(Duration::from_secs(900)).wake_after(),
            Duration::from_secs(900)
        );
        assert_eq!(Action::Sleep(Duration::ZERO).wake_after(), Duration::ZERO);
    }

    #[test]
    fn test_register_is_sorted_by_type() {
        struct Noop<const T: i16>;

        impl<const T: i16> Executor for Noop<T> {
            const TASK_TYPE: TaskType = TaskType(T);
            type State = ();

            async fn poll<'s>(
                &'s self,
                _pool: &'s sqlx::PgPool,
                _task_name: &'s str,
                _state: &'s mut Self::State,
            ) -> anyhow::Result<Action> {
                Ok(Action::Sleep(std::time::Duration::ZERO))
            }
        }

        let server = Server::new()
            .register(Noop::<3>)
            .register(Noop::<1>)
            .register(Noop::<2>);

        assert_eq!(server.task_types(), vec![1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_register_rejects_duplicate_types() {
        struct Noop;

        impl Executor for Noop {
            const TASK_TYPE: TaskType = task_types::ALERT_SCAN;
            type State = ();

            async fn poll<'s>(
                &'s self,
                _pool: &'s sqlx::PgPool,
                _task_name: &'s str,
                _state: &'s mut Self::State,
            ) -> anyhow::Result<Action> {
                Ok(Action::Sleep(std::time::Duration::ZERO))
            }
        }

        let _ = Server::new().register(Noop).register(Noop);
    }
}
