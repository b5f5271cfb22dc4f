use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::PerformanceRecord;

/// Storage port for per-(user, topic, difficulty) rolling aggregates.
/// The adaptive engine is injected with an implementation and never opens
/// its own storage connections.
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    /// Fetch the aggregate for one exact key. Difficulty keys are stored
    /// lower-cased; callers pass them already normalized.
    async fn get_performance(
        &self,
        user_id: Uuid,
        topic: &str,
        difficulty: &str,
    ) -> Result<Option<PerformanceRecord>>;

    /// Insert or replace the aggregate for the record's key.
    async fn upsert_performance(&self, record: &PerformanceRecord) -> Result<()>;

    async fn performances_for_user(&self, user_id: Uuid) -> Result<Vec<PerformanceRecord>>;
}

/// Storage port for the per-user skill level.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Current skill level, or `None` for an unknown user. Callers fall
    /// back to medium rather than treating absence as an error.
    async fn skill_level(&self, user_id: Uuid) -> Result<Option<String>>;

    async fn set_skill_level(&self, user_id: Uuid, skill_level: &str) -> Result<()>;
}

/// In-memory performance store backed by a mutexed map. Used by the engine
/// test suite and handy for embedders that do not want a database.
#[derive(Default)]
pub struct MemoryPerformanceStore {
    records: Mutex<HashMap<(Uuid, String, String), PerformanceRecord>>,
}

impl MemoryPerformanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PerformanceStore for MemoryPerformanceStore {
    async fn get_performance(
        &self,
        user_id: Uuid,
        topic: &str,
        difficulty: &str,
    ) -> Result<Option<PerformanceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(user_id, topic.to_string(), difficulty.to_lowercase()))
            .cloned())
    }

    async fn upsert_performance(&self, record: &PerformanceRecord) -> Result<()> {
        let key = (
            record.user_id,
            record.topic.clone(),
            record.difficulty.to_lowercase(),
        );
        self.records.lock().unwrap().insert(key, record.clone());
        Ok(())
    }

    async fn performances_for_user(&self, user_id: Uuid) -> Result<Vec<PerformanceRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// In-memory user store holding only the skill level field.
#[derive(Default)]
pub struct MemoryUserStore {
    levels: Mutex<HashMap<Uuid, String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skill_level(user_id: Uuid, skill_level: &str) -> Self {
        let store = Self::default();
        store
            .levels
            .lock()
            .unwrap()
            .insert(user_id, skill_level.to_string());
        store
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn skill_level(&self, user_id: Uuid) -> Result<Option<String>> {
        Ok(self.levels.lock().unwrap().get(&user_id).cloned())
    }

    async fn set_skill_level(&self, user_id: Uuid, skill_level: &str) -> Result<()> {
        self.levels
            .lock()
            .unwrap()
            .insert(user_id, skill_level.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(user_id: Uuid, topic: &str, difficulty: &str) -> PerformanceRecord {
        PerformanceRecord {
            user_id,
            topic: topic.to_string(),
            difficulty: difficulty.to_string(),
            total_questions: 1,
            correct_answers: 1,
            accuracy: 1.0,
            average_response_time: 4.0,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_performance_store_round_trip() {
        let store = MemoryPerformanceStore::new();
        let user = Uuid::new_v4();

        assert!(
            store
                .get_performance(user, "algebra", "easy")
                .await
                .unwrap()
                .is_none()
        );

        store
            .upsert_performance(&record(user, "algebra", "easy"))
            .await
            .unwrap();
        let found = store
            .get_performance(user, "algebra", "easy")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.total_questions, 1);

        // Keys are difficulty-case-insensitive
        assert!(
            store
                .get_performance(user, "algebra", "Easy")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_memory_performance_store_lists_per_user() {
        let store = MemoryPerformanceStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .upsert_performance(&record(user, "algebra", "easy"))
            .await
            .unwrap();
        store
            .upsert_performance(&record(user, "algebra", "hard"))
            .await
            .unwrap();
        store
            .upsert_performance(&record(other, "algebra", "easy"))
            .await
            .unwrap();

        assert_eq!(store.performances_for_user(user).await.unwrap().len(), 2);
        assert_eq!(store.performances_for_user(other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_user_store_skill_level() {
        let user = Uuid::new_v4();
        let store = MemoryUserStore::new();
        assert!(store.skill_level(user).await.unwrap().is_none());

        store.set_skill_level(user, "hard").await.unwrap();
        assert_eq!(store.skill_level(user).await.unwrap().unwrap(), "hard");
    }
}
