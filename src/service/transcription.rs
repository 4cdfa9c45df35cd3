use crate::config::OpenAiConfig;
use crate::error::app_error::AppError;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const BASE_PROMPT: &str = "Write detailed lecture notes as connected prose, as if a student were writing them by hand in a notebook.
Important requirements:
- Write only connected text, with no numbering of any kind (neither numeric nor bulleted)
- Do not use lists, markers (•, *, -, ⦿) or digits for enumeration
- Structure the thoughts in paragraphs, not lists
- Use natural conversational language, like in personal notes
- Avoid formal phrases such as \"in conclusion\" or \"thus\"
- Use simple transitions between thoughts
- The text should look like a student's handwritten notes
";

/// Turns recorded audio into notes text.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, audio: &[u8], file_name: &str, pages: Option<u32>, notes: Option<&str>) -> Result<String, AppError>;
}

pub fn build_summary_prompt(transcript: &str, pages: Option<u32>, notes: Option<&str>) -> String {
    let mut prompt = BASE_PROMPT.to_string();

    if let Some(pages) = pages.filter(|p| *p > 0) {
        prompt.push_str(&format!("Approximate length: {pages} pages of handwritten text.\n"));
    }

    if let Some(notes) = notes.filter(|n| !n.is_empty()) {
        prompt.push_str(&format!("Specifics: {notes}\n"));
    }

    prompt.push_str("\n---\nTranscript:\n");
    prompt.push_str(transcript);
    prompt
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
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

/// First choice of a chat completion, or empty text when there is none.
fn first_choice(response: ChatResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default()
}

pub struct OpenAiSummarizer {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiSummarizer {
    pub fn new(config: OpenAiConfig, http: reqwest::Client) -> Self {
        OpenAiSummarizer { config, http }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds.max(1))
    }

    fn ensure_configured(&self) -> Result<(), AppError> {
        if self.config.api_key.is_empty() {
            return Err(AppError::upstream_message("OpenAI API key is not configured"));
        }
        Ok(())
    }

    async fn transcribe(&self, audio: &[u8], file_name: &str) -> Result<String, AppError> {
        let form = Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", Part::bytes(audio.to_vec()).file_name(file_name.to_string()));

        let response = self
            .http
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.timeout())
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::upstream("Transcription request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream_message(format!("Transcription endpoint returned {status}")));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream("Invalid transcription response", e))?;
        Ok(body.text)
    }

    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let request = ChatRequest {
            model: &self.config.summary_model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let response = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .timeout(self.timeout())
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::upstream("Chat completion request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::upstream_message(format!("Chat completion endpoint returned {status}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream("Invalid chat completion response", e))?;
        Ok(first_choice(body))
    }
}

#[async_trait::async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, audio: &[u8], file_name: &str, pages: Option<u32>, notes: Option<&str>) -> Result<String, AppError> {
        self.ensure_configured()?;

        let transcript = self.transcribe(audio, file_name).await?;
        debug!(chars = transcript.chars().count(), "audio transcribed");

        let summary = self.complete(&build_summary_prompt(&transcript, pages, notes)).await?;
        info!(chars = summary.chars().count(), "summary generated");
        Ok(summary)
    }
}
