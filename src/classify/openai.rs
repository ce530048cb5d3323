//! Chat-completions classification client
//!
//! Talks to any OpenAI-compatible `/v1/chat/completions` endpoint.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::{ClassificationService, ClassifyError};

const SYSTEM_PROMPT: &str =
    "You are a pharmaceutical expert providing accurate medicine information.";

/// Classification service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// API key (overridden by the OPENAI_API_KEY environment variable)
    pub api_key: String,
    /// Base URL of the OpenAI-compatible service
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens in the response
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
            max_tokens: 200,
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking chat-completions client used by the scan loop
pub struct ChatClassifier {
    client: Client,
    runtime: Runtime,
    config: ClassifierConfig,
}

impl ChatClassifier {
    /// Create a new client. The API key must already be validated.
    pub fn new(config: ClassifierConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let runtime = Runtime::new()?;

        info!(
            "Classifier configured: endpoint={}, model={}",
            config.endpoint, config.model
        );

        Ok(Self {
            client,
            runtime,
            config,
        })
    }

    async fn request(&self, name: &str) -> Result<String, ClassifyError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(name),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let content = first_choice_content(chat)?;
        debug!("Classifier response: {}", content);
        Ok(content)
    }
}

/// Trimmed text of the first choice; a missing or null message is empty
fn first_choice_content(chat: ChatResponse) -> Result<String, ClassifyError> {
    chat.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or(ClassifyError::EmptyResponse)
}

impl ClassificationService for ChatClassifier {
    fn remote_classify(&self, name: &str) -> Result<String, ClassifyError> {
        self.runtime.block_on(self.request(name))
    }
}

/// Prompt asking for the four labelled lines
fn build_prompt(name: &str) -> String {
    format!(
        "Identify the medicine below and describe it.\n\n\
         Medicine Name: {name}\n\n\
         Answer with exactly these four lines:\n\
         Type: [medicine type, e.g. Antibiotic, Analgesic, Antacid, Antihistamine]\n\
         Use: [brief description of the primary use]\n\
         Class: [pharmacological drug class]\n\
         Form: [common form, e.g. Tablet, Capsule, Cream, Syrup]\n\n\
         If the name is not a medicine you recognise, answer:\n\
         Type: Unknown\n\
         Use: Unable to determine - please verify medicine name\n\
         Class: Unknown\n\
         Form: Unknown"
    )
}
