pub mod adaptive_engine;
pub mod config;
pub mod database;
pub mod errors;
pub mod llm_providers;
pub mod logging;
pub mod models;
pub mod question_generator;
pub mod quiz_service;
pub mod store;

pub use adaptive_engine::{
    AdaptiveEngine, DIFFICULTY_LEVELS, advance_difficulty_index, difficulty_by_index,
    difficulty_index,
};
pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use llm_providers::{LlmProvider, LlmProviderKind};
pub use models::*;
pub use question_generator::QuestionGenerator;
pub use quiz_service::{QuizService, evaluate_answer};
pub use store::{MemoryPerformanceStore, MemoryUserStore, PerformanceStore, UserStore};
