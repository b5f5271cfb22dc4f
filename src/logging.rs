//! Standardized logging macros for consistent field names and message
//! patterns across the application, plus the subscriber setup used by
//! embedding binaries. Tracing macros are referenced inside the macro
//! definitions, so call sites only import the macro itself.

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize console + daily-rolling-file logging. The returned guard must
/// stay alive for the life of the process or file output stops flushing.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer = if config.console_enabled {
        Some(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(true),
        )
    } else {
        None
    };

    let (file_layer, guard) = if config.file_enabled {
        std::fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create log directory: {e}");
        });
        let file_appender =
            tracing_appender::rolling::daily(&config.log_directory, "smart-quizzer.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(non_blocking_file);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    registry.with(console_layer).with(file_layer).init();

    info!(
        log_directory = %config.log_directory,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );
    Ok(guard)
}

// ============================================================================
// Quiz Operation Logging Macros
// ============================================================================

/// Log the start of a quiz operation with consistent fields
#[macro_export]
macro_rules! log_quiz_start {
    ($operation:expr, quiz_id = $quiz_id:expr) => {
        tracing::debug!(
            operation = $operation,
            quiz_id = %$quiz_id,
            "Quiz operation started"
        );
    };
    ($operation:expr, user_id = $user_id:expr) => {
        tracing::debug!(
            operation = $operation,
            user_id = %$user_id,
            "Quiz operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "Quiz operation started"
        );
    };
}

/// Log successful completion of a quiz operation
#[macro_export]
macro_rules! log_quiz_success {
    ($operation:expr, quiz_id = $quiz_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            quiz_id = %$quiz_id,
            "Quiz operation completed: {}", $msg
        );
    };
    ($operation:expr, user_id = $user_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            user_id = %$user_id,
            "Quiz operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "Quiz operation completed: {}", $msg
        );
    };
    ($operation:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            "Quiz operation completed: {}", $msg
        );
    };
}

/// Log quiz operation errors with consistent structure
#[macro_export]
macro_rules! log_quiz_error {
    ($operation:expr, quiz_id = $quiz_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            quiz_id = %$quiz_id,
            error = %$error,
            "Quiz operation failed: {}", $msg
        );
    };
    ($operation:expr, user_id = $user_id:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            user_id = %$user_id,
            error = %$error,
            "Quiz operation failed: {}", $msg
        );
    };
    ($operation:expr, error = $error:expr, $msg:expr) => {
        tracing::error!(
            operation = $operation,
            error = %$error,
            "Quiz operation failed: {}", $msg
        );
    };
}

// ============================================================================
// Adaptive Engine Logging Macros
// ============================================================================

/// Log adaptive-engine decisions with session context
#[macro_export]
macro_rules! log_engine_event {
    ($operation:expr, user_id = $user_id:expr, topic = $topic:expr, $msg:expr) => {
        tracing::debug!(
            component = "adaptive_engine",
            operation = $operation,
            user_id = %$user_id,
            topic = %$topic,
            "Engine event: {}", $msg
        );
    };
    ($operation:expr, difficulty = $difficulty:expr, $msg:expr) => {
        tracing::debug!(
            component = "adaptive_engine",
            operation = $operation,
            difficulty = %$difficulty,
            "Engine event: {}", $msg
        );
    };
}

// ============================================================================
// Store Operation Logging Macros
// ============================================================================

/// Log store operation results
#[macro_export]
macro_rules! log_store_operation {
    (debug, $operation:expr, user_id = $user_id:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "store",
            operation = $operation,
            user_id = %$user_id,
            duration_ms = $duration,
            "Store operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "store",
            operation = $operation,
            "Store operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "store",
            operation = $operation,
            error = %$error,
            "Store operation failed"
        );
    };
}

// ============================================================================
// LLM Logging Macros
// ============================================================================

/// Log question-generation operations with provider context
#[macro_export]
macro_rules! log_llm_operation {
    (start, $operation:expr, provider = $provider:expr, pool_size = $pool_size:expr) => {
        tracing::info!(
            component = "question_generator",
            operation = $operation,
            provider = %$provider,
            pool_size = $pool_size,
            "LLM operation started"
        );
    };
    (success, $operation:expr, provider = $provider:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = "question_generator",
            operation = $operation,
            provider = %$provider,
            duration_ms = $duration,
            "LLM operation completed successfully"
        );
    };
    (error, $operation:expr, provider = $provider:expr, error = $error:expr) => {
        tracing::error!(
            component = "question_generator",
            operation = $operation,
            provider = %$provider,
            error = %$error,
            "LLM operation failed"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
