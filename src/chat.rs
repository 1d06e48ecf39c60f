//! Retrieval-augmented question answering.
//!
//! [`ChatService::ask`] retrieves passages for the question, packs them into
//! a bounded context block inside the system prompt, appends recent history
//! and the question, and hands the conversation to the completion provider.
//! A question scoped to one document uses that document's text as the
//! context instead of retrieval.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::error::{DocumentError, ProviderError};
use crate::llm::{ChatMessage, CompletionProvider, Role};
use crate::models::Passage;
use crate::service::DocumentService;

const DEFAULT_SYSTEM_PROMPT: &str = "You are AutoQuery, an assistant that answers questions \
about the user's uploaded documents. Base your answer on the document context when it is \
relevant. If the answer is not in the documents, say so. Be clear, direct and concise.";

const NO_CONTEXT: &str = "No relevant information was found in the uploaded documents.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Retrieval(#[from] DocumentError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    /// Filenames of the documents that contributed context, in retrieval order.
    pub sources: Vec<String>,
}

pub struct ChatService {
    documents: Arc<DocumentService>,
    llm: Arc<dyn CompletionProvider>,
    config: LlmConfig,
}

impl ChatService {
    pub fn new(
        documents: Arc<DocumentService>,
        llm: Arc<dyn CompletionProvider>,
        config: LlmConfig,
    ) -> Self {
        Self {
            documents,
            llm,
            config,
        }
    }

    /// Answer `question`. With `document_id`, the context is that document's
    /// text and an unknown id is [`DocumentError::NotFound`].
    pub async fn ask(
        &self,
        question: &str,
        history: &[ChatMessage],
        document_id: Option<&str>,
    ) -> Result<ChatAnswer, ChatError> {
        if question.trim().is_empty() {
            return Err(DocumentError::InvalidArgument("message must not be empty".into()).into());
        }
        if history.iter().any(|m| m.role == Role::System) {
            return Err(DocumentError::InvalidArgument(
                "history may only contain user and assistant messages".into(),
            )
            .into());
        }

        let (context, sources) = match document_id {
            Some(id) => {
                let record = self.documents.get(id).await?;
                (
                    document_context(&record.text, self.config.max_context_chars),
                    vec![record.filename],
                )
            }
            None => {
                let passages = self
                    .documents
                    .retrieve_passages(question, self.documents.default_top_k())
                    .await?;
                let sources = self.sources(&passages).await;
                (
                    build_context(&passages, self.config.max_context_chars),
                    sources,
                )
            }
        };

        let system = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\nDocument Context:\n{}",
            system, context
        ))];
        let skip = history.len().saturating_sub(self.config.history_turns);
        messages.extend(history[skip..].iter().cloned());
        messages.push(ChatMessage::user(question));

        tracing::debug!(
            model = self.llm.model_name(),
            document = document_id.unwrap_or("-"),
            sources = sources.len(),
            history = messages.len() - 2,
            "requesting completion"
        );
        let answer = self.llm.complete(&messages).await?;
        Ok(ChatAnswer { answer, sources })
    }

    async fn sources(&self, passages: &[Passage]) -> Vec<String> {
        let mut seen = Vec::new();
        let mut sources = Vec::new();
        for (i, p) in passages.iter().enumerate() {
            if seen.contains(&p.document_id) {
                continue;
            }
            seen.push(p.document_id.clone());
            match self.documents.get(&p.document_id).await {
                Ok(record) => sources.push(record.filename),
                Err(_) => sources.push(format!("Document section {}", i + 1)),
            }
        }
        sources
    }
}

/// Number and join passages, then cut the block to `max_chars` characters.
pub fn build_context(passages: &[Passage], max_chars: usize) -> String {
    if passages.is_empty() {
        return NO_CONTEXT.to_string();
    }
    let joined = passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Document Section {}:\n{}", i + 1, p.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    joined.chars().take(max_chars).collect()
}

fn document_context(text: &str, max_chars: usize) -> String {
    if text.trim().is_empty() {
        return NO_CONTEXT.to_string();
    }
    text.chars().take(max_chars).collect()
}
