//! Cached chat completions.
//!
//! The canonical input is the compact JSON of the message list, so two
//! requests hit the same entry only when every role and content match.
//! Entries are stored as `{"result": <ChatResult>}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_store::{BoxError, DocumentStore, Store};
use strata_types::Document;
use tracing::debug;

use crate::error::{MemoError, MemoResult};
use crate::key::MemoKeyer;

/// Cache entry field holding the completion.
pub const RESULT_FIELD: &str = "result";

/// One message of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A single candidate completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatGeneration {
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_info: Option<Value>,
}

/// The output of one chat call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub generations: Vec<ChatGeneration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_output: Option<Value>,
}

impl ChatResult {
    /// A result with a single assistant reply.
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            generations: vec![ChatGeneration {
                message: ChatMessage::assistant(content),
                generation_info: None,
            }],
            llm_output: None,
        }
    }

    /// Content of the first generation, if any.
    pub fn text(&self) -> Option<&str> {
        self.generations.first().map(|g| g.message.content.as_str())
    }
}

/// A chat completion model.
pub trait ChatModel: Send + Sync {
    fn generate(&self, messages: &[ChatMessage]) -> Result<ChatResult, BoxError>;
}

/// A [`ChatModel`] with an optional document-store side cache.
pub struct CachedChatModel {
    model_name: String,
    inner: Arc<dyn ChatModel>,
    cache: Option<Arc<dyn DocumentStore>>,
}

impl CachedChatModel {
    pub fn new(
        model_name: impl Into<String>,
        inner: Arc<dyn ChatModel>,
        cache: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            inner,
            cache,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Cache key for a message list under this model.
    pub fn cache_key(&self, messages: &[ChatMessage]) -> MemoResult<String> {
        let canonical = serde_json::to_string(messages)
            .map_err(|e| MemoError::Canonicalization(e.to_string()))?;
        Ok(MemoKeyer::CHAT.key(&self.model_name, &canonical))
    }

    fn call_model(&self, messages: &[ChatMessage]) -> MemoResult<ChatResult> {
        self.inner
            .generate(messages)
            .map_err(|source| MemoError::Model {
                model: self.model_name.clone(),
                source,
            })
    }

    /// Generate a completion, serving it from the store when cached.
    pub fn generate(&self, messages: &[ChatMessage]) -> MemoResult<ChatResult> {
        let Some(cache) = &self.cache else {
            return self.call_model(messages);
        };
        let key = self.cache_key(messages)?;
        if let Some(doc) = cache.get(&key)? {
            debug!(model = %self.model_name, key = %key, "chat cache hit");
            return decode_entry(&key, doc);
        }
        let result = self.call_model(messages)?;
        cache.set(&key, encode_entry(&key, &result)?)?;
        debug!(model = %self.model_name, key = %key, "chat cache fill");
        Ok(result)
    }
}

impl ChatModel for CachedChatModel {
    fn generate(&self, messages: &[ChatMessage]) -> Result<ChatResult, BoxError> {
        CachedChatModel::generate(self, messages).map_err(Into::into)
    }
}

fn encode_entry(key: &str, result: &ChatResult) -> MemoResult<Document> {
    let value = serde_json::to_value(result).map_err(|source| MemoError::Serialization {
        key: key.to_string(),
        source,
    })?;
    let mut doc = Document::new();
    doc.insert(RESULT_FIELD.to_string(), value);
    Ok(doc)
}

fn decode_entry(key: &str, mut doc: Document) -> MemoResult<ChatResult> {
    let value = doc.remove(RESULT_FIELD).ok_or_else(|| MemoError::CorruptEntry {
        key: key.to_string(),
        reason: format!("missing {RESULT_FIELD} field"),
    })?;
    serde_json::from_value(value).map_err(|e| MemoError::CorruptEntry {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
