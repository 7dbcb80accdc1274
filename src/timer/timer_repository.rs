use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::timer_models::TimerState;
use crate::{db::DbPool, error::Result};

/// Timer storage shared by every view. Writers do read-then-write with no
/// locking; a lost duplicate start is acceptable.
#[async_trait]
pub trait TimerStorage: Send + Sync + 'static {
    async fn load(&self, task_id: &str) -> Result<Option<TimerState>>;
    async fn load_all(&self) -> Result<Vec<TimerState>>;
    async fn save(&self, timer: &TimerState) -> Result<()>;
    async fn remove(&self, task_id: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteTimerStorage {
    pool: DbPool,
}

impl SqliteTimerStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimerStorage for SqliteTimerStorage {
    async fn load(&self, task_id: &str) -> Result<Option<TimerState>> {
        let timer = sqlx::query_as::<_, TimerState>(
            "SELECT task_id, end_time, start_time, duration FROM timers WHERE task_id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(timer)
    }

    async fn load_all(&self) -> Result<Vec<TimerState>> {
        let timers = sqlx::query_as::<_, TimerState>(
            "SELECT task_id, end_time, start_time, duration FROM timers ORDER BY end_time ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(timers)
    }

    async fn save(&self, timer: &TimerState) -> Result<()> {
        sqlx::query(
            "INSERT INTO timers (task_id, end_time, start_time, duration)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(task_id) DO UPDATE SET
                end_time = excluded.end_time,
                start_time = excluded.start_time,
                duration = excluded.duration",
        )
        .bind(&timer.task_id)
        .bind(timer.end_time)
        .bind(timer.start_time)
        .bind(timer.duration)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, task_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM timers WHERE task_id = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Process-local storage; clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryTimerStorage {
    timers: Arc<DashMap<String, TimerState>>,
}

impl MemoryTimerStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimerStorage for MemoryTimerStorage {
    async fn load(&self, task_id: &str) -> Result<Option<TimerState>> {
        Ok(self.timers.get(task_id).map(|entry| entry.value().clone()))
    }

    async fn load_all(&self) -> Result<Vec<TimerState>> {
        let mut timers: Vec<_> = self.timers.iter().map(|entry| entry.value().clone()).collect();
        timers.sort_by_key(|t| t.end_time);
        Ok(timers)
    }

    async fn save(&self, timer: &TimerState) -> Result<()> {
        self.timers.insert(timer.task_id.clone(), timer.clone());
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> Result<bool> {
        Ok(self.timers.remove(task_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};

    async fn exercise(storage: &dyn TimerStorage) {
        assert_eq!(storage.load("T1").await.unwrap(), None);

        storage.save(&TimerState::new("T1", 1_000, 30)).await.unwrap();
        storage.save(&TimerState::until("T2", 5_000)).await.unwrap();
        storage.save(&TimerState::new("T1", 2_000, 60)).await.unwrap();

        let t1 = storage.load("T1").await.unwrap().unwrap();
        assert_eq!(t1.end_time, 62_000);
        assert_eq!(t1.start_time, Some(2_000));
        assert_eq!(t1.duration, Some(60));

        let all: Vec<_> = storage
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(all, vec!["T2".to_string(), "T1".to_string()]);

        assert!(storage.remove("T2").await.unwrap());
        assert!(!storage.remove("T2").await.unwrap());
        assert_eq!(storage.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_storage() {
        exercise(&MemoryTimerStorage::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_storage() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        exercise(&SqliteTimerStorage::new(pool)).await;
    }

    #[tokio::test]
    async fn test_sqlite_file_shared_between_pools() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("timers.db").display());

        let first = create_pool(&url).await.unwrap();
        run_migrations(&first).await.unwrap();
        let second = create_pool(&url).await.unwrap();

        let writer = SqliteTimerStorage::new(first);
        let reader = SqliteTimerStorage::new(second);

        writer.save(&TimerState::new("T1", 0, 120)).await.unwrap();
        assert_eq!(reader.load("T1").await.unwrap().unwrap().end_time, 120_000);

        assert!(reader.remove("T1").await.unwrap());
        assert_eq!(writer.load("T1").await.unwrap(), None);
    }
}
