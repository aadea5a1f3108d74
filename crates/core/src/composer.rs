use crate::error::QueryError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Opaque text-in, text-out boundary to the external generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, QueryError>;
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    text: Option<String>,
}

/// HTTP client for a hosted generative model. Every call is bounded by the
/// configured timeout; a transient failure (timeout, 429, 5xx) is retried
/// exactly once, anything else is surfaced as a generation error.
pub struct HttpGenerativeModel {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpGenerativeModel {
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, QueryError> {
        let endpoint = Url::parse(endpoint)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            model: model.into(),
            api_key,
            client,
        })
    }

    async fn call_once(&self, prompt: &str) -> Result<String, Failure> {
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| Failure {
            transient: error.is_timeout() || error.is_connect(),
            reason: error.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure {
                transient: is_transient_status(status),
                reason: format!("model endpoint returned {status}"),
            });
        }

        let payload: GenerateResponse = response.json().await.map_err(|error| Failure {
            transient: false,
            reason: error.to_string(),
        })?;

        match payload.text {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(Failure {
                transient: false,
                reason: "empty response from model".to_string(),
            }),
        }
    }
}

#[async_trait]
impl GenerativeModel for HttpGenerativeModel {
    async fn generate(&self, prompt: &str) -> Result<String, QueryError> {
        match self.call_once(prompt).await {
            Ok(text) => Ok(text),
            Err(failure) if failure.transient => self
                .call_once(prompt)
                .await
                .map_err(|retry| QueryError::GenerativeModel(retry.reason)),
            Err(failure) => Err(QueryError::GenerativeModel(failure.reason)),
        }
    }
}

struct Failure {
    transient: bool,
    reason: String,
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Builds the templated prompt, invokes the model, and normalizes the raw
/// answer for display.
pub struct AnswerComposer<G: GenerativeModel> {
    model: G,
    bullets: Regex,
    bold: Regex,
    emphasis: Regex,
}

impl<G: GenerativeModel> AnswerComposer<G> {
    pub fn new(model: G) -> Result<Self, QueryError> {
        Ok(Self {
            model,
            bullets: Regex::new(r"(?m)^(\s*)\*\s+")?,
            bold: Regex::new(r"\*\*([^*]+)\*\*")?,
            emphasis: Regex::new(r"\*([^*\n]+)\*")?,
        })
    }

    pub async fn compose(&self, question: &str, context_block: &str) -> Result<String, QueryError> {
        let prompt = build_prompt(question, context_block);
        let raw = self.model.generate(&prompt).await?;
        Ok(self.format_answer(&raw))
    }

    /// Rewrites markdown-style emphasis into structured markup and
    /// normalizes bullet markers. Idempotent: the output contains no
    /// remaining emphasis markers for a second pass to re-wrap.
    pub fn format_answer(&self, raw: &str) -> String {
        let bulleted = self.bullets.replace_all(raw, "$1- ");
        let bolded = self.bold.replace_all(&bulleted, "<strong>$1</strong>");
        self.emphasis
            .replace_all(&bolded, "<em>$1</em>")
            .trim()
            .to_string()
    }
}

fn build_prompt(question: &str, context_block: &str) -> String {
    format!(
        "You are an assistant answering questions about a document collection. \
         Base your answer only on the context below, which mixes excerpts from \
         the original documents with community contributions.\n\n\
         Question: {question}\n\n\
         Context:\n{context_block}\n\n\
         Instructions:\n\
         1. Prefer community contributions where present; they reflect reviewed, real-world experience.\n\
         2. Combine document excerpts and contributions when both are relevant.\n\
         3. If the context does not contain enough information, say so plainly.\n\
         4. Answer clearly and concisely, citing which source each fact came from."
    )
}
