use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// Used when neither a file nor a prompt was supplied.
pub const DEFAULT_DEMO_PROMPT: &str = "Create a small, playful interactive demo that shows off what a single self-contained web page can do: animated shapes that react to the mouse, a color picker that restyles the page, and a short explanation of each effect.";

/// Replaces the user's prompt whenever a file is attached.
pub const FILE_ANALYSIS_DIRECTIVE: &str = "Analyze the attached image or document carefully. Identify what it depicts or describes, then turn it into a fully interactive web application that brings its content to life. Preserve the key details, labels and structure of the input, and add meaningful interactivity such as controls, simulations, quizzes or animations where they help the user explore it.";

pub const REVISION_SYSTEM_INSTRUCTION: &str = "You are editing an existing self-contained HTML application. Apply the user's requested change and return the COMPLETE updated HTML document, from <!DOCTYPE html> to </html>. Never return a partial snippet or a diff. Keep all existing content and behavior unless the request explicitly asks to change it. Keep everything in one file with inline CSS and JavaScript and no externally hosted images. Return only the HTML, without markdown code fences or commentary.";

/// Fixed output constraints attached to every fresh generation.
pub fn generation_system_instruction(output_language: &str) -> String {
    format!(
        "You are an expert creative web developer. Produce a single, complete, self-contained HTML document with all CSS and JavaScript inline. \
Do not reference externally hosted images; draw visuals with CSS, SVG, canvas or emoji instead. \
Write every piece of user-visible text in {output_language}. \
Make the result interactive and polished. \
Return only the raw HTML document, without markdown code fences or any explanation."
    )
}

/// The text actually sent for a generation request.
pub fn resolve_prompt(prompt: &str, has_file: bool) -> &str {
    if has_file {
        FILE_ANALYSIS_DIRECTIVE
    } else if prompt.trim().is_empty() {
        DEFAULT_DEMO_PROMPT
    } else {
        prompt
    }
}

/// Removes one leading code fence (optionally language-tagged) and one
/// trailing fence. Input without a fence comes back unchanged.
pub fn strip_code_fence(raw: &str) -> String {
    let mut text = raw;
    let mut stripped = false;

    if let Some(rest) = text.trim_start().strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
        stripped = true;
    }

    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
        stripped = true;
    }

    if stripped {
        text.trim().to_string()
    } else {
        raw.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl FileInput {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no generation API key is configured")]
    MissingCredential,
    #[error("generation service request failed: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
    },
}

impl GenerationError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// True when the service rejected the credential itself rather than the
    /// request.
    pub fn is_authorization_failure(&self) -> bool {
        match self {
            Self::MissingCredential => false,
            Self::Remote { status, message } => {
                if matches!(status, Some(401) | Some(403)) {
                    return true;
                }
                let lower = message.to_ascii_lowercase();
                lower.contains("api_key_invalid")
                    || lower.contains("api key not valid")
                    || lower.contains("permission_denied")
                    || lower.contains("unauthenticated")
            }
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(value: reqwest::Error) -> Self {
        let value = value.without_url();
        Self::Remote {
            status: value.status().map(|status| status.as_u16()),
            message: value.to_string(),
        }
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        file: Option<&FileInput>,
    ) -> Result<String, GenerationError>;
    async fn revise(&self, current_html: &str, instruction: &str)
        -> Result<String, GenerationError>;
    /// Best-effort check; any failure reads as "not valid".
    async fn validate_credential(&self, candidate: &str) -> bool;
}

/// Carries the credential; request URLs never contain it.
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Base endpoint, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub endpoint: String,
    pub model: String,
    /// Natural language the generated page should be written in.
    pub output_language: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            output_language: "English".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiSystemInstruction,
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<GeminiErrorReason>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorReason {
    #[serde(default)]
    reason: Option<String>,
}

/// Gemini `generateContent` client. No retries, no streaming and no timeout
/// beyond the transport's own.
pub struct GeminiGenerationClient {
    http: Client,
    config: GenerationConfig,
    credential: RwLock<Option<String>>,
}

impl GeminiGenerationClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self::with_http_client(Client::new(), config)
    }

    pub fn with_http_client(http: Client, config: GenerationConfig) -> Self {
        Self {
            http,
            config,
            credential: RwLock::new(None),
        }
    }

    pub async fn set_credential(&self, credential: impl Into<String>) {
        let credential = credential.into().trim().to_string();
        *self.credential.write().await = Some(credential).filter(|c| !c.is_empty());
    }

    pub async fn clear_credential(&self) {
        *self.credential.write().await = None;
    }

    pub async fn has_credential(&self) -> bool {
        self.credential.read().await.is_some()
    }

    async fn credential(&self) -> Result<String, GenerationError> {
        self.credential
            .read()
            .await
            .clone()
            .ok_or(GenerationError::MissingCredential)
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, GenerationError> {
        let raw = format!("{}/{path}", self.config.endpoint.trim_end_matches('/'));
        Url::parse(&raw).map_err(|err| {
            GenerationError::remote(None, format!("invalid endpoint '{raw}': {err}"))
        })
    }

    async fn generate_content(
        &self,
        system_instruction: String,
        parts: Vec<GeminiPart>,
    ) -> Result<String, GenerationError> {
        let key = self.credential().await?;
        let url = self.endpoint_url(&format!("models/{}:generateContent", self.config.model))?;
        let body = GeminiRequest {
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart::Text {
                    text: system_instruction,
                }],
            },
            contents: vec![GeminiContent {
                role: "user",
                parts,
            }],
        };

        debug!(model = %self.config.model, "sending generateContent request");
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let error = remote_error_from_body(status, &text);
            warn!("generation request failed: {error}");
            return Err(error);
        }

        let parsed: GeminiResponse = serde_json::from_str(&text).map_err(|err| {
            GenerationError::remote(Some(status.as_u16()), format!("malformed response: {err}"))
        })?;
        let content: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(GenerationError::remote(
                Some(status.as_u16()),
                "response contained no text",
            ));
        }

        let html = strip_code_fence(&content);
        info!(bytes = html.len(), "generation completed");
        Ok(html)
    }
}

fn remote_error_from_body(status: StatusCode, body: &str) -> GenerationError {
    let message = match serde_json::from_str::<GeminiErrorEnvelope>(body) {
        Ok(envelope) => {
            let mut fragments: Vec<String> = Vec::new();
            if let Some(api_status) = envelope.error.status {
                fragments.push(api_status);
            }
            fragments.extend(
                envelope
                    .error
                    .details
                    .into_iter()
                    .filter_map(|detail| detail.reason),
            );
            if !envelope.error.message.is_empty() {
                fragments.push(envelope.error.message);
            }
            format!("HTTP {status}: {}", fragments.join(": "))
        }
        Err(_) => format!("HTTP {status}: {}", body.trim()),
    };
    GenerationError::remote(Some(status.as_u16()), message)
}

#[async_trait]
impl GenerationService for GeminiGenerationClient {
    async fn generate(
        &self,
        prompt: &str,
        file: Option<&FileInput>,
    ) -> Result<String, GenerationError> {
        let mut parts = vec![GeminiPart::Text {
            text: resolve_prompt(prompt, file.is_some()).to_string(),
        }];
        if let Some(file) = file {
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: file.mime_type.clone(),
                    data: file.to_base64(),
                },
            });
        }

        self.generate_content(
            generation_system_instruction(&self.config.output_language),
            parts,
        )
        .await
    }

    async fn revise(
        &self,
        current_html: &str,
        instruction: &str,
    ) -> Result<String, GenerationError> {
        let text = format!(
            "Current HTML document:\n\n{current_html}\n\nRequested change:\n{}",
            instruction.trim()
        );
        self.generate_content(
            REVISION_SYSTEM_INSTRUCTION.to_string(),
            vec![GeminiPart::Text { text }],
        )
        .await
    }

    async fn validate_credential(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return false;
        }
        let Ok(mut url) = self.endpoint_url("models") else {
            return false;
        };
        url.query_pairs_mut().append_pair("pageSize", "1");

        match self
            .http
            .get(url)
            .header(API_KEY_HEADER, candidate)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "credential check rejected");
                false
            }
            Err(err) => {
                debug!("credential check failed: {}", err.without_url());
                false
            }
        }
    }
}


#[cfg(test)]
#[path = "tests/generation_tests.rs"]
mod http_tests;
