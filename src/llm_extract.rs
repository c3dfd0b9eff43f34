// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::error::{HarvestError, Result};
use crate::invoice::InvoiceRefs;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = r#"You extract reference numbers from invoice documents.
Given raw text extracted from a PDF, return ONLY a JSON object of the form:
{"invoice_number": "string or null", "order_number": "string or null"}
Use null for a value that does not appear in the text. No markdown, no commentary."#;

/// Texts longer than this are cut before being sent.
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// A concrete OpenAI-compatible endpoint.
#[derive(Debug)]
pub struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

impl ResolvedEndpoint {
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// HTTP client bound to one endpoint.
pub struct LlmClient {
    client: Client,
    endpoint: ResolvedEndpoint,
}

impl LlmClient {
    /// `None` when the heuristics backend is selected.
    pub fn from_config(llm: &LlmSection) -> Result<Option<Self>> {
        Ok(resolve_endpoint(llm)?.map(|endpoint| Self {
            client: Client::new(),
            endpoint,
        }))
    }

    pub fn model(&self) -> &str {
        self.endpoint.model()
    }

    pub async fn extract_refs(&self, text: &str) -> Result<InvoiceRefs> {
        extract_refs_with_llm(&self.client, &self.endpoint, text).await
    }
}

/// `None` when the heuristics backend is selected.
pub fn resolve_endpoint(llm: &LlmSection) -> Result<Option<ResolvedEndpoint>> {
    match llm.backend {
        LlmBackend::Heuristics => Ok(None),
        LlmBackend::Ollama => Ok(Some(ResolvedEndpoint {
            base_url: llm.ollama.base_url.clone(),
            model: llm.ollama.model.clone(),
            api_key: "ollama".to_string(), // required by the API shape, ignored by ollama
        })),
        LlmBackend::Remote => {
            let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                HarvestError::Config("OPENAI_API_KEY env var required for remote backend".into())
            })?;
            Ok(Some(ResolvedEndpoint {
                base_url: llm.remote.base_url.clone(),
                model: llm.remote.model.clone(),
                api_key,
            }))
        }
    }
}

/// Cut `text` to at most `max` bytes without splitting a character.
fn truncate_chars(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Send PDF text to the model and parse the two reference numbers.
async fn extract_refs_with_llm(
    client: &Client,
    endpoint: &ResolvedEndpoint,
    extracted_text: &str,
) -> Result<InvoiceRefs> {
    let text = truncate_chars(extracted_text, MAX_PROMPT_CHARS);

    let request = ChatRequest {
        model: endpoint.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: format!("Extract the invoice and order numbers from:\n\n{text}"),
            },
        ],
        temperature: 0.0,
    };

    let url = format!("{}/chat/completions", endpoint.base_url.trim_end_matches('/'));
    info!(url = %url, model = %endpoint.model, chars = text.len(), "Calling LLM");

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", endpoint.api_key))
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "LLM API returned an error");
        return Err(HarvestError::Llm(format!("API error {status}: {body}")));
    }

    let chat_response: ChatResponse = response.json().await?;
    let content = chat_response
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .ok_or_else(|| HarvestError::Llm("empty response from LLM".into()))?;

    parse_refs(content)
}

/// Parse the model's reply, tolerating code fences and leading reasoning text.
pub fn parse_refs(content: &str) -> Result<InvoiceRefs> {
    let json_str = extract_json_object(content)?;
    let refs: InvoiceRefs = serde_json::from_str(json_str)
        .map_err(|e| HarvestError::Llm(format!("unparseable reply: {e}; raw: {json_str}")))?;
    Ok(refs.normalized())
}

fn extract_json_object(s: &str) -> Result<&str> {
    let start = s
        .find('{')
        .ok_or_else(|| HarvestError::Llm("no '{' in LLM response".into()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| HarvestError::Llm("no '}' in LLM response".into()))?;
    if end <= start {
        return Err(HarvestError::Llm("malformed JSON in LLM response".into()));
    }
    Ok(&s[start..=end])
}
