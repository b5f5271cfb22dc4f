use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;
use uuid::Uuid;

use crate::adaptive_engine;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub skill_level: String, // easy, medium, hard; new users start at medium
    pub created_at: DateTime<Utc>,
}

/// One entry of a generated question pool. The adaptive engine only reads
/// `id` and `difficulty`; everything else is presentation data for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub question_text: String,
    pub question_type: String, // "mcq", "true_false", "checkbox", "short_answer"
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub difficulty: String, // compared case-insensitively
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub topic: String,
    pub questions: Vec<Question>, // immutable pool, stored as JSON
    pub difficulty: String,       // starting difficulty, seeded from the user's skill level
    pub quiz_length: usize,       // questions to serve; the pool is larger for throttling headroom
    pub score: Option<f64>,
    pub status: String, // "in_progress", "completed"
    pub created_at: DateTime<Utc>,
}

/// Rolling aggregate for one (user, topic, difficulty) key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PerformanceRecord {
    pub user_id: Uuid,
    pub topic: String,
    pub difficulty: String, // stored lower-cased
    pub total_questions: i64,
    pub correct_answers: i64,
    pub accuracy: f64,
    pub average_response_time: f64, // EMA, seconds
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: Uuid,
    pub user_answer: String,
    pub difficulty: String,
    pub is_correct: bool,
    pub response_time_secs: f64,
    pub question_type: String,
}

/// Live state of one adaptive quiz run. Held and passed in by the caller on
/// every service call; nothing in the engine keeps session state between calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSession {
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub difficulty_index: i32, // always within [0, 2]
    pub answered: Vec<AnsweredQuestion>,
    pub correct_count: u32,
    pub quiz_length: usize,
    pub started_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn new(quiz_id: Uuid, user_id: Uuid, start_difficulty: &str, quiz_length: usize) -> Self {
        Self {
            quiz_id,
            user_id,
            difficulty_index: adaptive_engine::difficulty_index(start_difficulty),
            answered: Vec::new(),
            correct_count: 0,
            quiz_length,
            started_at: Utc::now(),
        }
    }

    /// Ids of every question already served in this session.
    pub fn answered_ids(&self) -> HashSet<Uuid> {
        self.answered.iter().map(|a| a.question_id).collect()
    }

    pub fn answered_count(&self) -> usize {
        self.answered.len()
    }

    /// The session has served the requested number of questions.
    pub fn is_complete(&self) -> bool {
        self.answered.len() >= self.quiz_length
    }

    /// Percentage score over answered questions; 0 when nothing was answered.
    pub fn score_percent(&self) -> f64 {
        if self.answered.is_empty() {
            0.0
        } else {
            f64::from(self.correct_count) / self.answered.len() as f64 * 100.0
        }
    }

    /// Difficulty bucket the next question should be drawn from.
    pub fn required_difficulty(&self) -> &'static str {
        adaptive_engine::difficulty_by_index(self.difficulty_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuizRequest {
    pub user_id: Uuid,
    pub topic: String,
    pub content: Option<String>, // source text; falls back to a topic prompt
    pub num_questions: usize,    // questions the user will answer, not the pool size
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    pub answer: String,
    pub response_time_secs: f64,
}

/// Outcome of one submitted answer, returned to the caller for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerEvaluation {
    pub question_id: Uuid,
    pub is_correct: bool,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub next_difficulty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSummary {
    pub quiz_id: Uuid,
    pub total_answered: usize,
    pub total_correct: u32,
    pub score_percent: f64,
    pub new_skill_level: String,
}
