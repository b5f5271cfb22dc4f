use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm_providers::LlmProvider;
use crate::models::Question;

/// Question shape as the model returns it, before ids and normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub question_type: String,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub difficulty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPool {
    pub questions: Vec<GeneratedQuestion>,
}

/// Generates mixed-difficulty question pools through an LLM provider,
/// degrading to a deterministic local pool when the model fails or
/// under-delivers.
#[derive(Clone)]
pub struct QuestionGenerator {
    provider: LlmProvider,
}

impl QuestionGenerator {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Generate a pool of `pool_size` questions about `content`, tagged
    /// with `topic` and distributed across the three difficulty buckets.
    pub async fn generate_pool(
        &self,
        topic: &str,
        content: &str,
        pool_size: usize,
    ) -> Result<Vec<Question>> {
        info!(
            provider = self.provider.provider_name(),
            topic = topic,
            pool_size = pool_size,
            content_length = content.len(),
            "Generating question pool"
        );

        let prompt = build_pool_prompt(topic, content, pool_size);
        let system_message = "You are a quiz author. Always respond with valid JSON \
                              in the requested format and nothing else.";

        let response = match self.provider.complete(Some(system_message), &prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    provider = self.provider.provider_name(),
                    topic = topic,
                    error = %e,
                    "LLM request failed, using local fallback pool"
                );
                return Ok(fallback_pool(topic, pool_size));
            }
        };

        let mut questions = match self.parse_pool(&response, topic) {
            Ok(questions) => questions,
            Err(e) => {
                warn!(
                    provider = self.provider.provider_name(),
                    topic = topic,
                    error = %e,
                    "Failed to parse generated pool, using local fallback pool"
                );
                return Ok(fallback_pool(topic, pool_size));
            }
        };

        // Top up from the fallback pool when the model returned too few.
        if questions.len() < pool_size {
            warn!(
                topic = topic,
                generated = questions.len(),
                requested = pool_size,
                "Model under-delivered, topping up from fallback pool"
            );
            questions.extend(fallback_pool(topic, pool_size - questions.len()));
        }

        info!(
            topic = topic,
            question_count = questions.len(),
            "Question pool ready"
        );
        Ok(questions)
    }

    /// Parse a raw model reply into normalized pool questions.
    pub fn parse_pool(&self, response: &str, topic: &str) -> Result<Vec<Question>> {
        let json = extract_json_block(response);
        debug!(extracted_length = json.len(), "Extracted JSON from LLM response");

        let pool: GeneratedPool = serde_json::from_str(&json)
            .map_err(|e| anyhow::anyhow!("Failed to parse question pool JSON: {e}"))?;
        if pool.questions.is_empty() {
            return Err(anyhow::anyhow!("Generated pool contains no questions"));
        }

        Ok(pool
            .questions
            .into_iter()
            .map(|q| normalize_question(q, topic))
            .collect())
    }
}

/// Pull the JSON payload out of a model reply that may wrap it in markdown
/// fences or surrounding prose.
pub fn extract_json_block(content: &str) -> String {
    if let Some(start) = content.find("```json") {
        if let Some(end) = content[start + 7..].find("```") {
            return content[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(start) = content.find("```") {
        if let Some(end) = content[start + 3..].find("```") {
            let candidate = content[start + 3..start + 3 + end].trim();
            if candidate.starts_with('{') || candidate.starts_with('[') {
                return candidate.to_string();
            }
        }
    }

    if let Some(start) = content.find('{') {
        if let Some(end) = content.rfind('}') {
            if end > start {
                return content[start..=end].to_string();
            }
        }
    }

    content.trim().to_string()
}

fn normalize_question(generated: GeneratedQuestion, topic: &str) -> Question {
    Question {
        id: Uuid::new_v4(),
        question_text: generated.question_text,
        question_type: generated.question_type.to_lowercase(),
        options: generated.options,
        correct_answer: generated.correct_answer,
        explanation: generated
            .explanation
            .or_else(|| Some("No explanation provided.".to_string())),
        // Lower-cased up front so pool filtering compares like for like
        difficulty: generated
            .difficulty
            .map(|d| d.trim().to_lowercase())
            .unwrap_or_else(|| "medium".to_string()),
        topic: topic.to_string(),
    }
}

/// Deterministic local questions used when the model is unavailable,
/// cycling through the difficulty buckets and alternating question types.
pub fn fallback_pool(topic: &str, count: usize) -> Vec<Question> {
    let difficulties = ["easy", "medium", "hard"];
    (0..count)
        .map(|i| {
            let difficulty = difficulties[i % difficulties.len()];
            if i % 2 == 0 {
                Question {
                    id: Uuid::new_v4(),
                    question_text: format!(
                        "Which field does the topic \"{topic}\" belong to?"
                    ),
                    question_type: "mcq".to_string(),
                    options: Some(vec![
                        topic.to_string(),
                        "Unrelated field A".to_string(),
                        "Unrelated field B".to_string(),
                        "Unrelated field C".to_string(),
                    ]),
                    correct_answer: Some(topic.to_string()),
                    explanation: Some("Placeholder question generated offline.".to_string()),
                    difficulty: difficulty.to_string(),
                    topic: topic.to_string(),
                }
            } else {
                Question {
                    id: Uuid::new_v4(),
                    question_text: format!(
                        "True or False: this quiz is about \"{topic}\"."
                    ),
                    question_type: "true_false".to_string(),
                    options: Some(vec!["True".to_string(), "False".to_string()]),
                    correct_answer: Some("True".to_string()),
                    explanation: Some("Placeholder question generated offline.".to_string()),
                    difficulty: difficulty.to_string(),
                    topic: topic.to_string(),
                }
            }
        })
        .collect()
}

fn build_pool_prompt(topic: &str, content: &str, pool_size: usize) -> String {
    format!(
        r#"CONTENT ABOUT {topic}:
"{content}"

TASK: Create a pool of exactly {pool_size} quiz questions that test understanding of the actual concepts and facts in the content above. The questions must be distributed across Easy, Medium, and Hard difficulties in roughly equal parts.

QUESTION TYPES: Use a mix of multiple choice ("mcq") and "true_false" questions. Do not use short answer.

STRICT RULES:
1. All questions must be derived only from the provided content.
2. Provide a clear 'explanation' for why the correct answer is right.
3. The total number of questions must equal {pool_size}.
4. Label every question with a 'difficulty' of "easy", "medium" or "hard".

OUTPUT FORMAT (JSON object only):
{{
    "questions": [
        {{
            "question_text": "Direct question about the content...",
            "question_type": "mcq",
            "options": ["...", "...", "...", "..."],
            "correct_answer": "Correct option text",
            "explanation": "This answer is correct because...",
            "difficulty": "easy"
        }},
        {{
            "question_text": "True or False: statement about the content.",
            "question_type": "true_false",
            "options": ["True", "False"],
            "correct_answer": "True",
            "explanation": "This is true because...",
            "difficulty": "medium"
        }}
    ]
}}

Return ONLY the raw JSON object. Do not include any introductory or concluding text."#
    )
}
