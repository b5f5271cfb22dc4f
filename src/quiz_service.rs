use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adaptive_engine::{self, AdaptiveEngine};
use crate::database::Database;
use crate::errors::QuizError;
use crate::models::*;
use crate::question_generator::QuestionGenerator;
use crate::store::UserStore;

/// Pool headroom for adaptive quizzes: generate three questions for every
/// one the user will answer, so each difficulty bucket stays stocked.
const ADAPTIVE_POOL_FACTOR: usize = 3;

/// Drives the full quiz lifecycle: creation, session start, answer
/// submission, next-question selection and finalization. The live
/// `QuizSession` is always passed in and out by the caller; the service
/// holds no per-quiz state of its own.
#[derive(Clone)]
pub struct QuizService {
    db: Database,
    engine: Arc<AdaptiveEngine>,
    generator: QuestionGenerator,
}

impl QuizService {
    pub fn new(db: Database, generator: QuestionGenerator) -> Self {
        let engine = AdaptiveEngine::new(Arc::new(db.clone()), Arc::new(db.clone()));
        Self::with_engine(db, generator, engine)
    }

    /// Service with a caller-built engine, e.g. one with a seeded RNG.
    pub fn with_engine(db: Database, generator: QuestionGenerator, engine: AdaptiveEngine) -> Self {
        Self {
            db,
            engine: Arc::new(engine),
            generator,
        }
    }

    pub fn engine(&self) -> &AdaptiveEngine {
        &self.engine
    }

    /// Create an adaptive quiz: generate a pool three times the requested
    /// length and seed the starting difficulty from the user's skill level.
    pub async fn create_quiz(&self, request: CreateQuizRequest) -> Result<Quiz> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(QuizError::Validation("quiz topic must not be empty".to_string()).into());
        }
        if request.num_questions == 0 {
            return Err(
                QuizError::Validation("quiz must have at least one question".to_string()).into(),
            );
        }

        let content = request
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Generate questions about {topic}"));

        let pool = self
            .generator
            .generate_pool(topic, &content, request.num_questions * ADAPTIVE_POOL_FACTOR)
            .await?;
        if pool.is_empty() {
            return Err(QuizError::Generation(format!(
                "could not generate any questions for topic '{topic}'"
            ))
            .into());
        }

        self.create_quiz_from_pool(request.user_id, topic, pool, request.num_questions)
            .await
    }

    /// Persist a quiz over an already-built question pool. Used internally
    /// after generation and directly by callers that bring their own pool.
    pub async fn create_quiz_from_pool(
        &self,
        user_id: Uuid,
        topic: &str,
        pool: Vec<Question>,
        quiz_length: usize,
    ) -> Result<Quiz> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| QuizError::NotFound(format!("user {user_id}")))?;

        let difficulty = user.skill_level.to_lowercase();
        let quiz = Quiz {
            id: Uuid::new_v4(),
            user_id,
            title: format!("{topic} Quiz ({difficulty} - adaptive)"),
            topic: topic.to_string(),
            questions: pool,
            difficulty,
            quiz_length,
            score: None,
            status: "in_progress".to_string(),
            created_at: chrono::Utc::now(),
        };

        self.db.create_quiz(&quiz).await?;
        info!(
            quiz_id = %quiz.id,
            user_id = %user_id,
            topic = topic,
            pool_size = quiz.questions.len(),
            quiz_length = quiz_length,
            difficulty = %quiz.difficulty,
            "Quiz created"
        );
        Ok(quiz)
    }

    /// Begin an adaptive session for a quiz, returning the session value and
    /// the first question to serve. The first question prefers the seeded
    /// starting difficulty, then scans medium, easy, hard, then takes
    /// whatever the pool has.
    pub async fn start_session(
        &self,
        quiz_id: Uuid,
        user_id: Uuid,
    ) -> Result<(QuizSession, Question)> {
        let quiz = self
            .db
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| QuizError::NotFound(format!("quiz {quiz_id}")))?;
        if quiz.user_id != user_id {
            return Err(
                QuizError::Validation("quiz does not belong to this user".to_string()).into(),
            );
        }
        if quiz.questions.is_empty() {
            return Err(QuizError::Validation("quiz question pool is empty".to_string()).into());
        }

        let session = QuizSession::new(quiz.id, user_id, &quiz.difficulty, quiz.quiz_length);

        let initial = quiz
            .questions
            .iter()
            .find(|q| q.difficulty.eq_ignore_ascii_case(&quiz.difficulty))
            .or_else(|| {
                ["medium", "easy", "hard"].into_iter().find_map(|fallback| {
                    quiz.questions
                        .iter()
                        .find(|q| q.difficulty.eq_ignore_ascii_case(fallback))
                })
            })
            // Pool holds only unrecognized difficulty labels; serve it anyway
            .unwrap_or(&quiz.questions[0])
            .clone();

        info!(
            quiz_id = %quiz.id,
            user_id = %user_id,
            start_difficulty = %quiz.difficulty,
            first_question = %initial.id,
            "Quiz session started"
        );
        Ok((session, initial))
    }

    /// Evaluate one submitted answer: score it, log it into the session,
    /// fold it into the performance aggregate immediately, and take one step
    /// of the difficulty walk. Answers are processed strictly in submission
    /// order; a question can only be submitted once per session.
    pub async fn submit_answer(
        &self,
        session: &mut QuizSession,
        request: SubmitAnswerRequest,
    ) -> Result<AnswerEvaluation> {
        let quiz = self
            .db
            .get_quiz(session.quiz_id)
            .await?
            .ok_or_else(|| QuizError::NotFound(format!("quiz {}", session.quiz_id)))?;

        let question = quiz
            .questions
            .iter()
            .find(|q| q.id == request.question_id)
            .ok_or_else(|| {
                QuizError::NotFound(format!("question {} in quiz pool", request.question_id))
            })?;

        if session.answered_ids().contains(&question.id) {
            return Err(QuizError::Validation(format!(
                "question {} was already answered in this session",
                question.id
            ))
            .into());
        }

        let is_correct = evaluate_answer(question, &request.answer);
        if is_correct {
            session.correct_count += 1;
        }
        session.answered.push(AnsweredQuestion {
            question_id: question.id,
            user_answer: request.answer,
            difficulty: question.difficulty.clone(),
            is_correct,
            response_time_secs: request.response_time_secs,
            question_type: question.question_type.clone(),
        });

        // Durable immediately, whether or not the quiz is ever finalized.
        self.engine
            .record_outcome(
                session.user_id,
                &quiz.topic,
                &question.difficulty,
                is_correct,
                request.response_time_secs,
            )
            .await?;

        session.difficulty_index =
            adaptive_engine::advance_difficulty_index(session.difficulty_index, is_correct);

        info!(
            quiz_id = %quiz.id,
            question_id = %question.id,
            is_correct = is_correct,
            next_difficulty = session.required_difficulty(),
            answered = session.answered_count(),
            "Answer submitted"
        );

        Ok(AnswerEvaluation {
            question_id: question.id,
            is_correct,
            correct_answer: question.correct_answer.clone(),
            explanation: question.explanation.clone(),
            next_difficulty: session.required_difficulty().to_string(),
        })
    }

    /// The next question to serve, or `None` when the session has run its
    /// length or the pool is exhausted; either way the caller finalizes.
    pub async fn next_question(&self, session: &QuizSession) -> Result<Option<Question>> {
        if session.is_complete() {
            return Ok(None);
        }

        let quiz = self
            .db
            .get_quiz(session.quiz_id)
            .await?
            .ok_or_else(|| QuizError::NotFound(format!("quiz {}", session.quiz_id)))?;

        let next = self
            .engine
            .select_next_question(
                session.required_difficulty(),
                &quiz.questions,
                &session.answered_ids(),
            )
            .cloned();

        if next.is_none() {
            warn!(
                quiz_id = %quiz.id,
                answered = session.answered_count(),
                "Question pool exhausted before requested quiz length"
            );
        }
        Ok(next)
    }

    /// Close out a session: compute the final score, run the skill-level
    /// transition, persist the new level and the completed quiz row. The
    /// session is consumed; no transient state survives finalization.
    pub async fn finalize_quiz(&self, session: QuizSession) -> Result<QuizSummary> {
        let quiz = self
            .db
            .get_quiz(session.quiz_id)
            .await?
            .ok_or_else(|| QuizError::NotFound(format!("quiz {}", session.quiz_id)))?;

        let score_percent = session.score_percent();
        let new_skill_level = self
            .engine
            .compute_skill_transition(session.user_id, &quiz.topic, score_percent)
            .await?;

        self.db
            .set_skill_level(session.user_id, new_skill_level)
            .await?;
        self.db.complete_quiz(quiz.id, score_percent).await?;

        info!(
            quiz_id = %quiz.id,
            user_id = %session.user_id,
            score_percent = score_percent,
            new_skill_level = new_skill_level,
            total_answered = session.answered_count(),
            "Quiz finalized"
        );

        Ok(QuizSummary {
            quiz_id: quiz.id,
            total_answered: session.answered_count(),
            total_correct: session.correct_count,
            score_percent,
            new_skill_level: new_skill_level.to_string(),
        })
    }
}

/// Local answer evaluation per question type. Comparison is trimmed and
/// case-insensitive; checkbox answers compare as selection sets; short
/// answers match by containment in the expected answer.
pub fn evaluate_answer(question: &Question, user_answer: &str) -> bool {
    let user_answer = user_answer.trim();
    let correct_answer = match question.correct_answer.as_deref().map(str::trim) {
        Some(c) if !c.is_empty() => c,
        _ => return false,
    };
    if user_answer.is_empty() {
        return false;
    }

    match question.question_type.as_str() {
        "checkbox" => {
            let split = |s: &str| {
                s.split(',')
                    .map(|part| part.trim().to_lowercase())
                    .filter(|part| !part.is_empty())
                    .collect::<std::collections::HashSet<_>>()
            };
            split(user_answer) == split(correct_answer)
        }
        "true_false" | "mcq" | "dropdown" => user_answer.eq_ignore_ascii_case(correct_answer),
        "short_answer" => correct_answer
            .to_lowercase()
            .contains(&user_answer.to_lowercase()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(question_type: &str, correct: Option<&str>) -> Question {
        Question {
            id: Uuid::new_v4(),
            question_text: "Q".to_string(),
            question_type: question_type.to_string(),
            options: None,
            correct_answer: correct.map(str::to_string),
            explanation: None,
            difficulty: "medium".to_string(),
            topic: "testing".to_string(),
        }
    }

    #[test]
    fn test_evaluate_mcq_is_case_insensitive() {
        let q = question("mcq", Some("Paris"));
        assert!(evaluate_answer(&q, "paris"));
        assert!(evaluate_answer(&q, "  PARIS  "));
        assert!(!evaluate_answer(&q, "London"));
    }

    #[test]
    fn test_evaluate_true_false() {
        let q = question("true_false", Some("True"));
        assert!(evaluate_answer(&q, "true"));
        assert!(!evaluate_answer(&q, "false"));
    }

    #[test]
    fn test_evaluate_checkbox_is_order_insensitive() {
        let q = question("checkbox", Some("Red, Blue"));
        assert!(evaluate_answer(&q, "blue,red"));
        assert!(evaluate_answer(&q, "Red , Blue"));
        assert!(!evaluate_answer(&q, "red"));
        assert!(!evaluate_answer(&q, "red,blue,green"));
    }

    #[test]
    fn test_evaluate_short_answer_matches_by_containment() {
        let q = question("short_answer", Some("The Rust borrow checker"));
        assert!(evaluate_answer(&q, "borrow checker"));
        assert!(evaluate_answer(&q, "RUST"));
        assert!(!evaluate_answer(&q, "garbage collector"));
    }

    #[test]
    fn test_evaluate_rejects_empty_and_missing_answers() {
        let q = question("mcq", Some("A"));
        assert!(!evaluate_answer(&q, ""));
        assert!(!evaluate_answer(&q, "   "));

        let q = question("mcq", None);
        assert!(!evaluate_answer(&q, "A"));

        let q = question("essay", Some("A"));
        assert!(!evaluate_answer(&q, "A")); // unknown type never passes
    }
}
