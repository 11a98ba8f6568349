use std::time::Duration;

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::json_extraction::extract_json_block;
use crate::util::truncate_to_tokens;

const DEFAULT_MODEL: &str = "llama3-8b-8192";
/// Documents are cut to this budget so three of them plus the scaffold fit
/// the model's context window.
const INPUT_MAX_TOKENS: usize = 2048;
const CONCEPTS_BATCH_SIZE: usize = 3;
const BATCH_DELIMITER: &str = "\n```\n";
const RETRY_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(10);

const DIGEST_INSTRUCTION: &str = "You are provided with one document delimited by ```\n\
Your task is to extract the main digest of the document.\n\
You MUST return exactly one digest.\n\
A 'digest' contains a concise summary of the content and the content topic.";

const CONCEPTS_INSTRUCTION: &str = "You are provided with one or more documents delimited by ```\n\
Your task is to extract the main key concepts from each document.\n\
Each document can have more than one key concept. Your output will be a list of key concepts.\n\
A 'key concept' is one of the main messages or pieces of information that is central to a news article, document or social media post.\n\
A 'key concept' has a 'keyphrase' and an associated 'event' and 'description'.";

// --- Extraction shapes ---

/// Topical digest of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Digest {
    /// A concise summary of the document.
    #[serde(default)]
    pub summary: String,
    /// A very short description of the content topic, such as:
    /// "Threat Intelligence", "Rate Cuts", "iPhone Release".
    #[serde(default)]
    pub topic: String,
}

impl Digest {
    /// Placeholder digests preserve positional alignment after retry
    /// exhaustion; nothing should be persisted from them.
    pub fn is_placeholder(&self) -> bool {
        self.summary.is_empty()
    }
}

/// A structured key concept extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct KeyConcept {
    /// The name of a company, product, person, place, vulnerability, entity,
    /// organization, condition or similar subject.
    #[serde(default)]
    pub keyphrase: String,
    /// The action, state or condition associated with the keyphrase: what it
    /// is doing, what is happening to it, or how it is being impacted.
    #[serde(default)]
    pub event: String,
    /// A concise one-sentence summary of the event.
    #[serde(default)]
    pub description: String,
}

// --- InsightExtractor trait ---

#[async_trait::async_trait]
pub trait InsightExtractor: Send + Sync {
    /// Exactly one digest per input, in input order, with placeholders where
    /// extraction kept failing.
    async fn extract_digests(&self, texts: &[String]) -> Vec<Digest>;

    /// Key concepts across all inputs; no positional guarantee.
    async fn extract_key_concepts(&self, texts: &[String]) -> Vec<KeyConcept>;
}

// --- Wire types (OpenAI-compatible chat completions) ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for the chat-style LLM extraction service.
pub struct ParrotboxClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    digest_prompt: String,
    concepts_prompt: String,
}

impl ParrotboxClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let digest_prompt = format!(
            "{DIGEST_INSTRUCTION}\n\n{}",
            format_instructions::<Digest, _>(&digest_sample())
        );
        let concepts_prompt = format!(
            "{CONCEPTS_INSTRUCTION}\n\n{}",
            format_instructions::<Vec<KeyConcept>, _>(&concepts_sample())
        );
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            digest_prompt,
            concepts_prompt,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system,
                },
                WireMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM service error ({status}): {error_text}"));
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("No content in LLM response"))
    }

    async fn extract<T: serde::de::DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
        what: &str,
    ) -> Option<T> {
        for attempt in 1..=RETRY_ATTEMPTS {
            let result = match self.chat(system, user).await {
                Ok(text) => extract_json_block::<T>(&text),
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => return Some(value),
                Err(e) => {
                    warn!(attempt, what, error = %e, "Extraction failed");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl InsightExtractor for ParrotboxClient {
    // One call per input: batching digests was observed to return
    // nondeterministic array lengths, and this output must stay positional.
    async fn extract_digests(&self, texts: &[String]) -> Vec<Digest> {
        let mut output = Vec::with_capacity(texts.len());
        for text in texts {
            let user = format!("```\n{}\n```", truncate_to_tokens(text, INPUT_MAX_TOKENS));
            let digest = self
                .extract::<Digest>(&self.digest_prompt, &user, "digest")
                .await
                .unwrap_or_default();
            output.push(digest);
        }
        output
    }

    async fn extract_key_concepts(&self, texts: &[String]) -> Vec<KeyConcept> {
        let mut output = Vec::new();
        for batch in stuff_batches(texts) {
            if let Some(concepts) = self
                .extract::<Vec<KeyConcept>>(&self.concepts_prompt, &batch, "key concepts")
                .await
            {
                output.extend(concepts);
            }
        }
        output
    }
}

/// Truncate each text and stuff them into fenced batches of three.
fn stuff_batches(texts: &[String]) -> Vec<String> {
    texts
        .chunks(CONCEPTS_BATCH_SIZE)
        .map(|chunk| {
            let joined = chunk
                .iter()
                .map(|t| truncate_to_tokens(t, INPUT_MAX_TOKENS))
                .collect::<Vec<_>>()
                .join(BATCH_DELIMITER);
            format!("```\n{joined}\n```")
        })
        .collect()
}

/// Schema-plus-sample scaffold appended to every extraction instruction.
fn format_instructions<T: JsonSchema, S: Serialize>(sample: &S) -> String {
    let schema = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    format!(
        "The output MUST be a markdown code snippet formatted in the following JSON schema:\n\
         ```json\n{}\n```\n\n\
         An example response would be\n```json\n{}\n```",
        serde_json::to_string_pretty(&schema).unwrap_or_default(),
        serde_json::to_string_pretty(sample).unwrap_or_default(),
    )
}

fn digest_sample() -> Digest {
    Digest {
        summary: "The city council approved a rent stabilization ordinance capping annual \
                  increases at 3 percent after months of tenant organizing. The policy takes \
                  effect in January and exempts buildings newer than ten years."
            .to_string(),
        topic: "Rent Stabilization".to_string(),
    }
}

fn concepts_sample() -> Vec<KeyConcept> {
    vec![
        KeyConcept {
            keyphrase: "Northfield Utilities".to_string(),
            event: "Disclosing a data breach affecting customer billing records".to_string(),
            description: "Northfield Utilities said attackers accessed a billing database \
                          holding names and addresses of roughly 40,000 customers, and that \
                          regulators and affected residents are being notified."
                .to_string(),
        },
        KeyConcept {
            keyphrase: "OpenWrt".to_string(),
            event: "Releasing an emergency firmware patch".to_string(),
            description: "The OpenWrt project released an emergency patch for a command \
                          injection flaw in its image builder and urged users to rebuild \
                          images with the fixed toolchain."
                .to_string(),
        },
    ]
}
