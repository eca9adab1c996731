//! LLM Classifier (C7, `spec.md` §4.7).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vault::Category;

/// The two prompt contracts defined in `spec.md` §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    /// Categories ∈ {Projects, Areas, Resources, Archive}; on genuine
    /// uncertainty the model must return Archive.
    InboxClassify,
    /// Same categories; Archive is the "keep" outcome.
    ArchiveRefactor,
}

/// `spec.md` §4.7: "classify(note_content, directive, prompt_variant) →
/// {category, folder_name, reasoning}".
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmClassification {
    pub category: Category,
    pub folder_name: String,
    pub reasoning: String,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    RequestFailed(String),
    #[error("llm protocol error: response was not a parseable classification after retry")]
    LlmProtocolError,
}

/// The collaborator interface C8 depends on. Implementations are expected
/// to enforce the input-length ceiling and retry policy themselves, since
/// those are part of the contract (`spec.md` §4.7), not an optional
/// refinement.
pub trait LlmClassifier: Send + Sync {
    fn classify(
        &self,
        note_content: &str,
        directive: Option<&str>,
        variant: PromptVariant,
    ) -> Result<LlmClassification, LlmError>;
}

/// Input words beyond this ceiling are truncated with a marker
/// (`spec.md` §4.7: "A hard ceiling on input text length (~4000 words,
/// configurable) is enforced by truncation with a marker").
const DEFAULT_MAX_INPUT_WORDS: usize = 4000;
const TRUNCATION_MARKER: &str = "\n\n[... content truncated ...]\n";

fn truncate_to_word_limit(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        let mut truncated = words[..max_words].join(" ");
        truncated.push_str(TRUNCATION_MARKER);
        truncated
    }
}

fn system_prompt(variant: PromptVariant) -> &'static str {
    match variant {
        PromptVariant::InboxClassify => {
            "You sort personal notes into exactly one of Projects, Areas, Resources, or Archive. \
             On genuine uncertainty, choose Archive. Respond with a single JSON object with keys \
             \"category\", \"folder_name\" (2-4 words, no filesystem-hostile characters), and \"reasoning\". \
             No other text."
        }
        PromptVariant::ArchiveRefactor => {
            "You re-evaluate already-archived notes, sorting each into exactly one of Projects, \
             Areas, Resources, or Archive. Archive means \"keep as-is\". Respond with a single JSON \
             object with keys \"category\", \"folder_name\" (2-4 words, no filesystem-hostile characters), \
             and \"reasoning\". No other text."
        }
    }
}

/// Extracts a JSON object from a model response, trying a fenced code
/// block first, then the widest brace-delimited span.
fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fenced) = extract_fenced_json(response) {
        if let Ok(value) = serde_json::from_str(&fenced) {
            return Some(value);
        }
    }
    let first = response.find('{')?;
    let last = response.rfind('}')?;
    if last < first {
        return None;
    }
    serde_json::from_str(&response[first..=last]).ok()
}

fn extract_fenced_json(response: &str) -> Option<String> {
    let start_marker = response.find("```json")?;
    let after_marker = start_marker + "```json".len();
    let rest = &response[after_marker..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Blocking HTTP adapter. Ordinary blocking I/O per `spec.md` §5: "File I/O
/// is ordinary blocking I/O" and `Embedder.embed`/`LLM.classify` "block on
/// external resources and must be called with a per-call timeout".
pub struct HttpLlmClassifier {
    endpoint: String,
    model: String,
    client: reqwest::blocking::Client,
    max_input_words: usize,
}

impl HttpLlmClassifier {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("reqwest client configuration is static and valid");
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            client,
            max_input_words: DEFAULT_MAX_INPUT_WORDS,
        }
    }

    pub fn with_max_input_words(mut self, max_input_words: usize) -> Self {
        self.max_input_words = max_input_words;
        self
    }

    fn request_once(&self, prompt: &str, user_content: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            stream: bool,
        }
        #[derive(Deserialize)]
        struct ChatResponseMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            message: ChatResponseMessage,
        }

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        Ok(parsed.message.content)
    }
}

impl LlmClassifier for HttpLlmClassifier {
    fn classify(
        &self,
        note_content: &str,
        directive: Option<&str>,
        variant: PromptVariant,
    ) -> Result<LlmClassification, LlmError> {
        let truncated = truncate_to_word_limit(note_content, self.max_input_words);
        let user_content = match directive {
            Some(d) => format!("Directive: {d}\n\nNote:\n{truncated}"),
            None => format!("Note:\n{truncated}"),
        };
        let prompt = system_prompt(variant);

        // "On parse failure, retry once; on second failure surface
        // `LLMProtocolError`."
        for _attempt in 0..2 {
            let raw = self.request_once(prompt, &user_content)?;
            if let Some(classification) = extract_json_output::<LlmClassification>(&raw) {
                return Ok(classification);
            }
        }
        Err(LlmError::LlmProtocolError)
    }
}

/// Test double with a scripted response queue.
pub struct MockLlmClassifier {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmClassification, LlmError>>>,
}

impl MockLlmClassifier {
    pub fn new(responses: Vec<Result<LlmClassification, LlmError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }

    pub fn always(classification: LlmClassification) -> Self {
        Self {
            responses: std::sync::Mutex::new(std::iter::repeat_with(move || Ok(classification.clone())).take(1).collect()),
        }
    }
}

impl LlmClassifier for MockLlmClassifier {
    fn classify(
        &self,
        _note_content: &str,
        _directive: Option<&str>,
        _variant: PromptVariant,
    ) -> Result<LlmClassification, LlmError> {
        let mut queue = self.responses.lock().unwrap();
        queue
            .pop_front()
            .unwrap_or(Err(LlmError::LlmProtocolError))
    }
}
