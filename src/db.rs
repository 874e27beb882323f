//! Counter persisted as a single row in Postgres.

use crate::model::Counter;
use crate::model::COUNTER_ID;
use crate::pool::DbPool;
use crate::schema;
use crate::store::CounterStore;
use crate::store::StoreError;
use anyhow::Context;
use async_bb8_diesel::AsyncRunQueryDsl;
use async_bb8_diesel::AsyncSimpleConnection;
use async_trait::async_trait;
use diesel::prelude::*;
use slog::debug;
use slog::info;

const BOOTSTRAP_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS counter (
        id INT4 PRIMARY KEY,
        count INT8 NOT NULL DEFAULT 0
    );
    INSERT INTO counter (id, count) VALUES (1, 0) ON CONFLICT (id) DO NOTHING;
"#;

pub struct PostgresCounterStore {
    log: slog::Logger,
    pool: DbPool,
}

impl PostgresCounterStore {
    /// Creates the counter table and its row if they do not exist yet.
    /// Safe to run on every startup; an existing count is left untouched.
    pub async fn bootstrap(
        log: slog::Logger,
        pool: DbPool,
    ) -> anyhow::Result<PostgresCounterStore> {
        pool.batch_execute_async(BOOTSTRAP_SQL)
            .await
            .context("bootstrapping counter table")?;
        let store = PostgresCounterStore { log, pool };
        let count = store.read().await.context("reading bootstrapped counter")?;
        info!(&store.log, "counter table ready"; "count" => count);
        Ok(store)
    }
}

fn unavailable(error: anyhow::Error) -> StoreError {
    StoreError::StorageUnavailable(format!("{:#}", error))
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn read(&self) -> Result<i64, StoreError> {
        use schema::counter::dsl;

        let rows: Vec<Counter> = dsl::counter
            .filter(dsl::id.eq(COUNTER_ID))
            .select(Counter::as_select())
            .load_async(&self.pool)
            .await
            .context("loading counter")
            .map_err(unavailable)?;
        rows.first().map(|row| row.count).ok_or(StoreError::NotInitialized)
    }

    async fn increment(&self) -> Result<i64, StoreError> {
        use schema::counter::dsl;

        // Single statement: the row lock serializes concurrent increments.
        let counts: Vec<i64> =
            diesel::update(dsl::counter.filter(dsl::id.eq(COUNTER_ID)))
                .set(dsl::count.eq(dsl::count + 1))
                .returning(dsl::count)
                .get_results_async(&self.pool)
                .await
                .context("executing update")
                .map_err(unavailable)?;
        let count = counts.first().copied().ok_or(StoreError::NotInitialized)?;
        debug!(&self.log, "bumped counter"; "count" => count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::create_pool;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio::sync::MutexGuard;

    const TEST_DB_ENV: &str = "COUNTER_TEST_DATABASE_URL";

    // Tests below share the one counter row.
    static SHARED_ROW: Mutex<()> = Mutex::const_new(());

    fn test_log() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn test_db_url(test: &str) -> Option<String> {
        let url = std::env::var(TEST_DB_ENV).ok().filter(|url| !url.is_empty());
        if url.is_none() {
            eprintln!("skipping {}: {} is not set", test, TEST_DB_ENV);
        }
        url
    }

    async fn open_store(db_url: &str) -> PostgresCounterStore {
        let pool = create_pool(test_log(), db_url, 8).await.unwrap();
        PostgresCounterStore::bootstrap(test_log(), pool).await.unwrap()
    }

    async fn lock_row() -> MutexGuard<'static, ()> {
        SHARED_ROW.lock().await
    }

    #[tokio::test]
    async fn bootstrap_keeps_existing_count() {
        let Some(db_url) = test_db_url("bootstrap_keeps_existing_count") else {
            return;
        };
        let _row = lock_row().await;

        let store = open_store(&db_url).await;
        let count = store.increment().await.unwrap();
        assert!(count > 0);

        store.pool.batch_execute_async(BOOTSTRAP_SQL).await.unwrap();
        store.pool.batch_execute_async(BOOTSTRAP_SQL).await.unwrap();
        assert_eq!(store.read().await.unwrap(), count);
    }

    #[tokio::test]
    async fn sequential_increments_add_n() {
        let Some(db_url) = test_db_url("sequential_increments_add_n") else {
            return;
        };
        let _row = lock_row().await;

        let store = open_store(&db_url).await;
        let start = store.read().await.unwrap();
        for n in 1..=5 {
            assert_eq!(store.increment().await.unwrap(), start + n);
        }
        assert_eq!(store.read().await.unwrap(), start + 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_lose_nothing() {
        let Some(db_url) = test_db_url("concurrent_increments_lose_nothing")
        else {
            return;
        };
        let _row = lock_row().await;

        let store = Arc::new(open_store(&db_url).await);
        let before = store.read().await.unwrap();
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment().await.unwrap() })
            })
            .collect();
        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap());
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 32);
        assert_eq!(store.read().await.unwrap(), before + 32);
    }

    #[tokio::test]
    async fn reopened_store_keeps_count() {
        let Some(db_url) = test_db_url("reopened_store_keeps_count") else {
            return;
        };
        let _row = lock_row().await;

        let store = open_store(&db_url).await;
        let count = store.increment().await.unwrap();
        drop(store);

        let reopened = open_store(&db_url).await;
        assert_eq!(reopened.read().await.unwrap(), count);
    }

    #[tokio::test]
    async fn missing_row_is_not_initialized() {
        let Some(db_url) = test_db_url("missing_row_is_not_initialized") else {
            return;
        };
        // A single-connection pool keeps the temporary table visible, and
        // it shadows the shared one for this session only.
        let pool = create_pool(test_log(), &db_url, 1).await.unwrap();
        pool.batch_execute_async(
            "CREATE TEMPORARY TABLE counter (id INT4 PRIMARY KEY, count INT8 NOT NULL)",
        )
        .await
        .unwrap();
        let store = PostgresCounterStore { log: test_log(), pool };

        assert!(matches!(store.read().await, Err(StoreError::NotInitialized)));
        assert!(matches!(
            store.increment().await,
            Err(StoreError::NotInitialized)
        ));
    }
}
