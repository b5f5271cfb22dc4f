use anyhow::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{PerformanceRecord, Question};
use crate::store::{PerformanceStore, UserStore};

/// The ordered difficulty scale. All difficulty ordering and comparison in
/// the crate routes through `difficulty_index`/`difficulty_by_index`; no
/// other code compares difficulty strings directly.
pub const DIFFICULTY_LEVELS: [&str; 3] = ["easy", "medium", "hard"];

const MEDIUM_INDEX: i32 = 1;
const MAX_INDEX: i32 = DIFFICULTY_LEVELS.len() as i32 - 1;

// EMA weights for average response time: new samples contribute 30%.
const EMA_PREVIOUS_WEIGHT: f64 = 0.7;
const EMA_SAMPLE_WEIGHT: f64 = 0.3;

// Fixed quiz-score thresholds for the post-quiz skill transition.
const PROMOTE_SCORE: f64 = 80.0;
const DEMOTE_SCORE: f64 = 50.0;

/// Case-insensitive difficulty lookup. Unrecognized difficulties map to the
/// middle of the scale instead of failing a quiz over a data-quality issue.
pub fn difficulty_index(difficulty: &str) -> i32 {
    let needle = difficulty.trim().to_lowercase();
    DIFFICULTY_LEVELS
        .iter()
        .position(|level| *level == needle)
        .map(|i| i as i32)
        .unwrap_or(MEDIUM_INDEX)
}

/// Difficulty name for an index. Out-of-range indices saturate at the
/// nearest bound.
pub fn difficulty_by_index(index: i32) -> &'static str {
    DIFFICULTY_LEVELS[index.clamp(0, MAX_INDEX) as usize]
}

/// One step of the in-quiz difficulty walk: up on a correct answer, down on
/// an incorrect one, clamped to the scale.
pub fn advance_difficulty_index(index: i32, was_correct: bool) -> i32 {
    if was_correct {
        (index + 1).min(MAX_INDEX)
    } else {
        (index - 1).max(0)
    }
}

/// Adaptive difficulty controller.
///
/// Stateless between calls apart from the injected stores and the coin-flip
/// RNG used to break the Medium fallback tie; all live quiz state is the
/// caller's `QuizSession` value.
pub struct AdaptiveEngine {
    performance: Arc<dyn PerformanceStore>,
    users: Arc<dyn UserStore>,
    rng: Mutex<StdRng>,
}

impl AdaptiveEngine {
    pub fn new(performance: Arc<dyn PerformanceStore>, users: Arc<dyn UserStore>) -> Self {
        Self::with_rng(performance, users, StdRng::from_entropy())
    }

    /// Engine with a caller-supplied RNG, letting tests fix the Medium
    /// fallback coin-flip by seeding.
    pub fn with_rng(
        performance: Arc<dyn PerformanceStore>,
        users: Arc<dyn UserStore>,
        rng: StdRng,
    ) -> Self {
        Self {
            performance,
            users,
            rng: Mutex::new(rng),
        }
    }

    /// Select the next question to serve at `required_difficulty`, falling
    /// back to adjacent buckets when that bucket has no unanswered question
    /// left, then to any unanswered question at all. Returns `None` only
    /// when the pool is fully exhausted, which callers treat as quiz
    /// completion rather than an error.
    pub fn select_next_question<'a>(
        &self,
        required_difficulty: &str,
        pool: &'a [Question],
        answered_ids: &HashSet<Uuid>,
    ) -> Option<&'a Question> {
        let required = difficulty_by_index(difficulty_index(required_difficulty));
        let medium_coin = required == "medium" && self.rng.lock().unwrap().gen_bool(0.5);

        for difficulty in fallback_order(required, medium_coin) {
            let found = pool.iter().find(|q| {
                q.difficulty.eq_ignore_ascii_case(difficulty) && !answered_ids.contains(&q.id)
            });
            if let Some(question) = found {
                if difficulty != required {
                    debug!(
                        required = required,
                        served = difficulty,
                        question_id = %question.id,
                        "Throttled to an adjacent difficulty bucket"
                    );
                }
                return Some(question);
            }
        }

        // Adaptive path exhausted: serve any unanswered question in pool order.
        let leftover = pool.iter().find(|q| !answered_ids.contains(&q.id));
        match leftover {
            Some(question) => {
                debug!(
                    required = required,
                    question_id = %question.id,
                    "Question pool exhausted for the adaptive path, serving next available"
                );
                Some(question)
            }
            None => None,
        }
    }

    /// Fold one answered-question outcome into the (user, topic, difficulty)
    /// aggregate. Must be called exactly once per real answered question.
    pub async fn record_outcome(
        &self,
        user_id: Uuid,
        topic: &str,
        difficulty: &str,
        is_correct: bool,
        response_time_secs: f64,
    ) -> Result<PerformanceRecord> {
        let difficulty = difficulty.trim().to_lowercase();
        let now = Utc::now();

        let record = match self
            .performance
            .get_performance(user_id, topic, &difficulty)
            .await?
        {
            Some(mut record) => {
                record.total_questions += 1;
                if is_correct {
                    record.correct_answers += 1;
                }
                record.accuracy = record.correct_answers as f64 / record.total_questions as f64;
                // A zero average means no real sample has landed yet; the
                // first one seeds the EMA unsmoothed.
                record.average_response_time = if record.average_response_time == 0.0 {
                    response_time_secs
                } else {
                    EMA_PREVIOUS_WEIGHT * record.average_response_time
                        + EMA_SAMPLE_WEIGHT * response_time_secs
                };
                record.updated_at = now;
                record
            }
            None => PerformanceRecord {
                user_id,
                topic: topic.to_string(),
                difficulty: difficulty.clone(),
                total_questions: 1,
                correct_answers: if is_correct { 1 } else { 0 },
                accuracy: if is_correct { 1.0 } else { 0.0 },
                average_response_time: response_time_secs,
                updated_at: now,
            },
        };

        self.performance.upsert_performance(&record).await?;

        debug!(
            user_id = %user_id,
            topic = topic,
            difficulty = %difficulty,
            is_correct = is_correct,
            total_questions = record.total_questions,
            accuracy = record.accuracy,
            "Recorded question outcome"
        );

        Ok(record)
    }

    /// Compute the user's new overall skill level from a completed quiz's
    /// percentage score. Reads the current level (medium for unknown users)
    /// and moves one step up at 80% or better, one step down below 50%.
    /// Persisting the result is the caller's responsibility.
    pub async fn compute_skill_transition(
        &self,
        user_id: Uuid,
        topic: &str,
        score_percent: f64,
    ) -> Result<&'static str> {
        let current = self
            .users
            .skill_level(user_id)
            .await?
            .unwrap_or_else(|| "medium".to_string());
        let current_index = difficulty_index(&current);

        let next_index = if score_percent >= PROMOTE_SCORE {
            (current_index + 1).min(MAX_INDEX)
        } else if score_percent < DEMOTE_SCORE {
            (current_index - 1).max(0)
        } else {
            current_index
        };

        let next = difficulty_by_index(next_index);
        info!(
            user_id = %user_id,
            topic = topic,
            score_percent = score_percent,
            from = %current,
            to = next,
            "Computed skill-level transition"
        );
        Ok(next)
    }
}

/// Priority order of difficulty buckets to scan for the next question.
/// Hard and Easy fall toward the middle first; Medium breaks the tie
/// between its neighbors with the supplied coin-flip so an imbalanced pool
/// is not drained in a fixed direction.
fn fallback_order(required: &'static str, medium_coin: bool) -> [&'static str; 3] {
    match required {
        "hard" => ["hard", "medium", "easy"],
        "easy" => ["easy", "medium", "hard"],
        _ => {
            if medium_coin {
                ["medium", "hard", "easy"]
            } else {
                ["medium", "easy", "hard"]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryPerformanceStore, MemoryUserStore};

    fn question(difficulty: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            question_text: format!("{difficulty} question"),
            question_type: "mcq".to_string(),
            options: Some(vec!["A".to_string(), "B".to_string()]),
            correct_answer: Some("A".to_string()),
            explanation: None,
            difficulty: difficulty.to_string(),
            topic: "testing".to_string(),
        }
    }

    fn engine() -> AdaptiveEngine {
        AdaptiveEngine::with_rng(
            Arc::new(MemoryPerformanceStore::new()),
            Arc::new(MemoryUserStore::new()),
            StdRng::seed_from_u64(7),
        )
    }

    fn engine_with_users(users: MemoryUserStore) -> AdaptiveEngine {
        AdaptiveEngine::with_rng(
            Arc::new(MemoryPerformanceStore::new()),
            Arc::new(users),
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn test_difficulty_index_known_levels() {
        assert_eq!(difficulty_index("easy"), 0);
        assert_eq!(difficulty_index("medium"), 1);
        assert_eq!(difficulty_index("hard"), 2);
        // Case and whitespace are irrelevant
        assert_eq!(difficulty_index("Easy"), 0);
        assert_eq!(difficulty_index("HARD"), 2);
        assert_eq!(difficulty_index("  Medium  "), 1);
    }

    #[test]
    fn test_difficulty_index_unknown_defaults_to_medium() {
        for junk in ["", "expert", "super-hard", "42", "mediun"] {
            assert_eq!(difficulty_index(junk), 1, "input {junk:?}");
        }
    }

    #[test]
    fn test_difficulty_by_index_clamps() {
        assert_eq!(difficulty_by_index(0), "easy");
        assert_eq!(difficulty_by_index(1), "medium");
        assert_eq!(difficulty_by_index(2), "hard");
        assert_eq!(difficulty_by_index(-1), "easy");
        assert_eq!(difficulty_by_index(-100), "easy");
        assert_eq!(difficulty_by_index(3), "hard");
        assert_eq!(difficulty_by_index(99), "hard");
    }

    #[test]
    fn test_mapping_round_trip_is_stable() {
        for i in -2..5 {
            let once = difficulty_index(difficulty_by_index(i));
            let twice = difficulty_index(difficulty_by_index(once));
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_advance_difficulty_index_bounds() {
        for i in 0..=2 {
            let up = advance_difficulty_index(i, true);
            assert!(up >= i && up <= 2);
            let down = advance_difficulty_index(i, false);
            assert!(down <= i && down >= 0);
        }
        assert_eq!(advance_difficulty_index(2, true), 2);
        assert_eq!(advance_difficulty_index(0, false), 0);
        assert_eq!(advance_difficulty_index(1, true), 2);
        assert_eq!(advance_difficulty_index(1, false), 0);
    }

    #[test]
    fn test_fallback_order_hard_and_easy_are_fixed() {
        assert_eq!(fallback_order("hard", false), ["hard", "medium", "easy"]);
        assert_eq!(fallback_order("hard", true), ["hard", "medium", "easy"]);
        assert_eq!(fallback_order("easy", false), ["easy", "medium", "hard"]);
        assert_eq!(fallback_order("easy", true), ["easy", "medium", "hard"]);
    }

    #[test]
    fn test_fallback_order_medium_follows_coin() {
        assert_eq!(fallback_order("medium", true), ["medium", "hard", "easy"]);
        assert_eq!(fallback_order("medium", false), ["medium", "easy", "hard"]);
    }

    #[test]
    fn test_select_prefers_required_difficulty() {
        let pool = vec![question("Easy"), question("Medium"), question("Hard")];
        let selected = engine()
            .select_next_question("hard", &pool, &HashSet::new())
            .unwrap();
        assert!(selected.difficulty.eq_ignore_ascii_case("hard"));
    }

    #[test]
    fn test_select_falls_back_when_bucket_answered() {
        let pool = vec![question("Easy"), question("Medium"), question("Hard")];
        let mut answered = HashSet::new();
        answered.insert(pool[2].id); // the hard question

        let selected = engine()
            .select_next_question("hard", &pool, &answered)
            .unwrap();
        assert!(selected.difficulty.eq_ignore_ascii_case("medium"));
    }

    #[test]
    fn test_select_easy_falls_toward_medium_first() {
        let pool = vec![question("Medium"), question("Hard")];
        let selected = engine()
            .select_next_question("easy", &pool, &HashSet::new())
            .unwrap();
        assert!(selected.difficulty.eq_ignore_ascii_case("medium"));
    }

    #[test]
    fn test_select_exhausted_pool_returns_none() {
        let pool = vec![question("Easy"), question("Hard")];
        let answered: HashSet<Uuid> = pool.iter().map(|q| q.id).collect();
        assert!(engine().select_next_question("medium", &pool, &answered).is_none());
        assert!(engine().select_next_question("medium", &[], &HashSet::new()).is_none());
    }

    #[test]
    fn test_select_serves_unlabeled_leftovers_last() {
        // A question whose difficulty matches no bucket is unreachable via
        // the fallback scan but must still be served before ending the quiz.
        let pool = vec![question("bonus")];
        let selected = engine()
            .select_next_question("hard", &pool, &HashSet::new())
            .unwrap();
        assert_eq!(selected.id, pool[0].id);
    }

    #[test]
    fn test_select_medium_fallback_is_deterministic_per_seed() {
        let pool = vec![question("Easy"), question("Hard")];
        let first = engine()
            .select_next_question("medium", &pool, &HashSet::new())
            .unwrap()
            .id;
        let second = engine()
            .select_next_question("medium", &pool, &HashSet::new())
            .unwrap()
            .id;
        // Fresh engines with the same seed draw the same coin
        assert_eq!(first, second);
    }

    #[test]
    fn test_select_unknown_required_treated_as_medium() {
        let pool = vec![question("Medium"), question("Hard")];
        let selected = engine()
            .select_next_question("impossible", &pool, &HashSet::new())
            .unwrap();
        assert!(selected.difficulty.eq_ignore_ascii_case("medium"));
    }

    #[tokio::test]
    async fn test_record_outcome_first_sample_seeds_aggregate() {
        let eng = engine();
        let user = Uuid::new_v4();

        let record = eng
            .record_outcome(user, "algebra", "Medium", true, 10.0)
            .await
            .unwrap();

        assert_eq!(record.total_questions, 1);
        assert_eq!(record.correct_answers, 1);
        assert_eq!(record.accuracy, 1.0);
        assert_eq!(record.average_response_time, 10.0);
        assert_eq!(record.difficulty, "medium"); // stored lower-cased
    }

    #[tokio::test]
    async fn test_record_outcome_applies_ema_and_recomputes_accuracy() {
        let eng = engine();
        let user = Uuid::new_v4();

        eng.record_outcome(user, "algebra", "medium", true, 10.0)
            .await
            .unwrap();
        let record = eng
            .record_outcome(user, "algebra", "medium", false, 20.0)
            .await
            .unwrap();

        assert_eq!(record.total_questions, 2);
        assert_eq!(record.correct_answers, 1);
        assert_eq!(record.accuracy, 0.5);
        // 0.7 * 10 + 0.3 * 20
        assert!((record.average_response_time - 13.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_record_outcome_keys_are_independent() {
        let eng = engine();
        let user = Uuid::new_v4();

        eng.record_outcome(user, "algebra", "easy", true, 5.0)
            .await
            .unwrap();
        let hard = eng
            .record_outcome(user, "algebra", "hard", false, 30.0)
            .await
            .unwrap();

        // The hard-bucket aggregate starts fresh
        assert_eq!(hard.total_questions, 1);
        assert_eq!(hard.correct_answers, 0);
        assert_eq!(hard.accuracy, 0.0);
        assert_eq!(hard.average_response_time, 30.0);
    }

    #[tokio::test]
    async fn test_skill_transition_thresholds() {
        let user = Uuid::new_v4();
        let eng = engine_with_users(MemoryUserStore::with_skill_level(user, "medium"));

        assert_eq!(eng.compute_skill_transition(user, "algebra", 85.0).await.unwrap(), "hard");
        assert_eq!(eng.compute_skill_transition(user, "algebra", 45.0).await.unwrap(), "easy");
        assert_eq!(eng.compute_skill_transition(user, "algebra", 65.0).await.unwrap(), "medium");
    }

    #[tokio::test]
    async fn test_skill_transition_boundary_scores() {
        let user = Uuid::new_v4();
        let eng = engine_with_users(MemoryUserStore::with_skill_level(user, "medium"));

        // Exactly 80 promotes; exactly 50 holds (demotion requires < 50)
        assert_eq!(eng.compute_skill_transition(user, "algebra", 80.0).await.unwrap(), "hard");
        assert_eq!(eng.compute_skill_transition(user, "algebra", 50.0).await.unwrap(), "medium");
        assert_eq!(eng.compute_skill_transition(user, "algebra", 49.9).await.unwrap(), "easy");
    }

    #[tokio::test]
    async fn test_skill_transition_saturates_at_scale_ends() {
        let user = Uuid::new_v4();
        let eng = engine_with_users(MemoryUserStore::with_skill_level(user, "hard"));
        assert_eq!(eng.compute_skill_transition(user, "algebra", 100.0).await.unwrap(), "hard");

        let user = Uuid::new_v4();
        let eng = engine_with_users(MemoryUserStore::with_skill_level(user, "easy"));
        assert_eq!(eng.compute_skill_transition(user, "algebra", 0.0).await.unwrap(), "easy");
    }

    #[tokio::test]
    async fn test_skill_transition_unknown_user_starts_at_medium() {
        let eng = engine();
        let user = Uuid::new_v4();
        assert_eq!(eng.compute_skill_transition(user, "algebra", 90.0).await.unwrap(), "hard");
        assert_eq!(eng.compute_skill_transition(user, "algebra", 60.0).await.unwrap(), "medium");
    }
}
