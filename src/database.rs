use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::*;
use crate::store::{PerformanceStore, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory SQLite database exists per connection; keep a single
        // connection so every query sees the same database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                skill_level TEXT NOT NULL DEFAULT 'medium',
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quizzes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                topic TEXT NOT NULL,
                questions TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT 'medium',
                quiz_length INTEGER NOT NULL,
                score REAL,
                status TEXT NOT NULL DEFAULT 'in_progress',
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS performances (
                user_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                difficulty TEXT NOT NULL,
                accuracy REAL NOT NULL DEFAULT 0.0,
                total_questions INTEGER NOT NULL DEFAULT 0,
                correct_answers INTEGER NOT NULL DEFAULT 0,
                average_response_time REAL NOT NULL DEFAULT 0.0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, topic, difficulty),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // User operations
    pub async fn create_user(&self, username: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            skill_level: "medium".to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO users (id, username, skill_level, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.skill_level)
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            Ok(Some(Self::row_to_user(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            Ok(Some(Self::row_to_user(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Remove a user; quizzes and performance rows cascade with them.
    pub async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        Ok(User {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            username: row.get("username"),
            skill_level: row.get("skill_level"),
            created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))?
                .with_timezone(&Utc),
        })
    }

    // Quiz operations
    pub async fn create_quiz(&self, quiz: &Quiz) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quizzes (id, user_id, title, topic, questions, difficulty, quiz_length, score, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(quiz.id.to_string())
        .bind(quiz.user_id.to_string())
        .bind(&quiz.title)
        .bind(&quiz.topic)
        .bind(serde_json::to_string(&quiz.questions)?)
        .bind(&quiz.difficulty)
        .bind(quiz.quiz_length as i64)
        .bind(quiz.score)
        .bind(&quiz.status)
        .bind(quiz.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>> {
        let row = sqlx::query("SELECT * FROM quizzes WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            Ok(Some(Self::row_to_quiz(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_quizzes_for_user(&self, user_id: Uuid) -> Result<Vec<Quiz>> {
        let rows = sqlx::query("SELECT * FROM quizzes WHERE user_id = ?1 ORDER BY created_at DESC")
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut quizzes = Vec::new();
        for row in rows {
            quizzes.push(Self::row_to_quiz(&row)?);
        }
        Ok(quizzes)
    }

    /// Mark a quiz completed with its final percentage score.
    pub async fn complete_quiz(&self, id: Uuid, score: f64) -> Result<()> {
        sqlx::query("UPDATE quizzes SET score = ?1, status = 'completed' WHERE id = ?2")
            .bind(score)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_quiz(row: &sqlx::sqlite::SqliteRow) -> Result<Quiz> {
        Ok(Quiz {
            id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))?,
            title: row.get("title"),
            topic: row.get("topic"),
            questions: serde_json::from_str(&row.get::<String, _>("questions"))?,
            difficulty: row.get("difficulty"),
            quiz_length: row.get::<i64, _>("quiz_length") as usize,
            score: row.get("score"),
            status: row.get("status"),
            created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))?
                .with_timezone(&Utc),
        })
    }

    fn row_to_performance(row: &sqlx::sqlite::SqliteRow) -> Result<PerformanceRecord> {
        Ok(PerformanceRecord {
            user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))?,
            topic: row.get("topic"),
            difficulty: row.get("difficulty"),
            total_questions: row.get("total_questions"),
            correct_answers: row.get("correct_answers"),
            accuracy: row.get("accuracy"),
            average_response_time: row.get("average_response_time"),
            updated_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("updated_at"))?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl PerformanceStore for Database {
    async fn get_performance(
        &self,
        user_id: Uuid,
        topic: &str,
        difficulty: &str,
    ) -> Result<Option<PerformanceRecord>> {
        let row = sqlx::query(
            "SELECT * FROM performances WHERE user_id = ?1 AND topic = ?2 AND difficulty = ?3",
        )
        .bind(user_id.to_string())
        .bind(topic)
        .bind(difficulty.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            Ok(Some(Self::row_to_performance(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn upsert_performance(&self, record: &PerformanceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO performances
                (user_id, topic, difficulty, accuracy, total_questions, correct_answers, average_response_time, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (user_id, topic, difficulty) DO UPDATE SET
                accuracy = excluded.accuracy,
                total_questions = excluded.total_questions,
                correct_answers = excluded.correct_answers,
                average_response_time = excluded.average_response_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.user_id.to_string())
        .bind(&record.topic)
        .bind(record.difficulty.to_lowercase())
        .bind(record.accuracy)
        .bind(record.total_questions)
        .bind(record.correct_answers)
        .bind(record.average_response_time)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn performances_for_user(&self, user_id: Uuid) -> Result<Vec<PerformanceRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM performances WHERE user_id = ?1 ORDER BY topic, difficulty",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::row_to_performance(&row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl UserStore for Database {
    async fn skill_level(&self, user_id: Uuid) -> Result<Option<String>> {
        let row = sqlx::query("SELECT skill_level FROM users WHERE id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("skill_level")))
    }

    async fn set_skill_level(&self, user_id: Uuid, skill_level: &str) -> Result<()> {
        sqlx::query("UPDATE users SET skill_level = ?1 WHERE id = ?2")
            .bind(skill_level)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
