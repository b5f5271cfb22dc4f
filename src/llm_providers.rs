use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Which backend to talk to, parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProviderKind {
    OpenAi,
    Gemini,
}

/// Chat-completion backend used for question generation. Both variants
/// expose the same single entry point, `complete`.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAi {
        client: Client,
        api_key: String,
        base_url: String,
        model: String,
    },
    Gemini {
        client: Client,
        api_key: String,
        base_url: String,
        model: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl LlmProvider {
    pub fn open_ai(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        LlmProvider::OpenAi {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }

    pub fn gemini(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        LlmProvider::Gemini {
            client: Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.5-flash".to_string()),
        }
    }

    pub fn from_kind(
        kind: LlmProviderKind,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Self {
        match kind {
            LlmProviderKind::OpenAi => Self::open_ai(api_key, base_url, model),
            LlmProviderKind::Gemini => Self::gemini(api_key, base_url, model),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi { .. } => "OpenAI",
            LlmProvider::Gemini { .. } => "Gemini",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            LlmProvider::OpenAi { model, .. } => model,
            LlmProvider::Gemini { model, .. } => model,
        }
    }

    /// Send one prompt (with an optional system message) and return the raw
    /// text of the model's reply.
    pub async fn complete(&self, system_message: Option<&str>, prompt: &str) -> Result<String> {
        info!(
            provider = self.provider_name(),
            model = %self.model_name(),
            prompt_length = prompt.len(),
            "Making LLM request"
        );

        match self {
            LlmProvider::OpenAi {
                client,
                api_key,
                base_url,
                model,
            } => {
                let mut messages = Vec::new();
                if let Some(system) = system_message {
                    messages.push(ChatMessage {
                        role: "system".to_string(),
                        content: system.to_string(),
                    });
                }
                messages.push(ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                });

                let response = client
                    .post(format!("{base_url}/chat/completions"))
                    .header("Authorization", format!("Bearer {api_key}"))
                    .json(&OpenAiRequest {
                        model: model.clone(),
                        messages,
                    })
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    error!(
                        provider = self.provider_name(),
                        status = %status,
                        error = %body,
                        "LLM API request failed"
                    );
                    return Err(anyhow::anyhow!("OpenAI API request failed: {body}"));
                }

                let parsed: OpenAiResponse = response.json().await?;
                let choice = parsed
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("No choices in OpenAI response"))?;
                Ok(choice.message.content)
            }
            LlmProvider::Gemini {
                client,
                api_key,
                base_url,
                model,
            } => {
                // Gemini has no separate system slot; prepend it to the prompt.
                let full_prompt = match system_message {
                    Some(system) => format!("{system}\n\n{prompt}"),
                    None => prompt.to_string(),
                };

                let url =
                    format!("{base_url}/models/{model}:generateContent?key={api_key}");
                let response = client
                    .post(&url)
                    .json(&GeminiRequest {
                        contents: vec![GeminiContent {
                            parts: vec![GeminiPart { text: full_prompt }],
                        }],
                        generation_config: GeminiGenerationConfig {
                            temperature: 0.7,
                            max_output_tokens: 4096,
                        },
                    })
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    error!(
                        provider = self.provider_name(),
                        status = %status,
                        error = %body,
                        "LLM API request failed"
                    );
                    return Err(anyhow::anyhow!("Gemini API request failed: {body}"));
                }

                let parsed: GeminiResponse = response.json().await?;
                let text = parsed
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content.parts.into_iter().next())
                    .map(|p| p.text)
                    .ok_or_else(|| anyhow::anyhow!("No candidates in Gemini response"))?;
                Ok(text)
            }
        }
    }
}
