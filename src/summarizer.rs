use std::time::Duration;

use tracing::{info, instrument};

use crate::config::{ChatConfig, ChunkingConfig};
use crate::error::CompletionError;
use crate::ingest::chunker;
use crate::llm_client::{complete_with_timeout, CompletionRequest, SharedLlmClient};
use crate::session::ChatMessage;

/// Prompt pair used for one summarization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryInstructions {
    pub system: String,
    /// Prepended to the user content, e.g. "summarize in N sentences".
    pub directive: String,
}

impl SummaryInstructions {
    const SYSTEM: &'static str = "You are a helpful assistant that summarizes documents.";

    pub fn document() -> Self {
        Self {
            system: Self::SYSTEM.to_string(),
            directive: "Please summarize the following text in about 3-4 sentences:".to_string(),
        }
    }

    pub fn section(index: usize, total: usize) -> Self {
        Self {
            system: Self::SYSTEM.to_string(),
            directive: format!(
                "This is part {} of {} of a longer document. Summarize it in 2-3 sentences, keeping names and figures:",
                index + 1,
                total
            ),
        }
    }

    pub fn combine() -> Self {
        Self {
            system: Self::SYSTEM.to_string(),
            directive: "The following are summaries of consecutive parts of one document. Merge them into a single summary of about 3-4 sentences:".to_string(),
        }
    }

    fn messages(&self, text: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.as_str()),
            ChatMessage::user(format!("{}\n\n{}", self.directive.trim(), text)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub summary: String,
    pub chunk_count: usize,
}

pub struct Summarizer {
    llm_client: SharedLlmClient,
    model: String,
    max_tokens: u16,
    chunking: ChunkingConfig,
    timeout: Option<Duration>,
}

impl Summarizer {
    pub const SECTION_SEPARATOR: &'static str = "\n\n---\n\n";

    pub fn new(llm_client: SharedLlmClient, config: &ChatConfig) -> Self {
        Self {
            llm_client,
            model: config.model.clone(),
            max_tokens: config.summary_max_tokens,
            chunking: config.chunking,
            timeout: config.request_timeout,
        }
    }

    /// One completion request; the reply text is returned verbatim.
    pub async fn summarize(
        &self,
        text: &str,
        instructions: &SummaryInstructions,
    ) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: instructions.messages(text),
            max_tokens: self.max_tokens,
        };
        let reply = complete_with_timeout(self.llm_client.as_ref(), request, self.timeout).await?;
        Ok(reply.content)
    }

    /// Single pass for short texts; per-chunk summaries plus a combining pass otherwise.
    #[instrument(skip_all, fields(chars = text.chars().count()))]
    pub async fn summarize_document(&self, text: &str) -> Result<DocumentSummary, CompletionError> {
        let chunks: Vec<_> = chunker::plan(text, &self.chunking).collect();

        if let [only] = chunks.as_slice() {
            let summary = self
                .summarize(only.text, &SummaryInstructions::document())
                .await?;
            return Ok(DocumentSummary {
                summary,
                chunk_count: 1,
            });
        }

        let total = chunks.len();
        info!(chunks = total, "summarizing document in sections");

        let mut sections = Vec::with_capacity(total);
        for chunk in &chunks {
            let section = self
                .summarize(chunk.text, &SummaryInstructions::section(chunk.index, total))
                .await?;
            sections.push(section);
        }

        let combined = sections.join(Self::SECTION_SEPARATOR);
        let summary = self
            .summarize(&combined, &SummaryInstructions::combine())
            .await?;

        Ok(DocumentSummary {
            summary,
            chunk_count: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::scripted::{Scripted, ScriptedLlmClient};
    use crate::session::Role;

    fn summarizer(client: Arc<ScriptedLlmClient>, config: &ChatConfig) -> Summarizer {
        Summarizer::new(client, config)
    }

    #[tokio::test]
    async fn short_text_takes_one_request() {
        let client = Arc::new(ScriptedLlmClient::replies(["A tidy summary."]));
        let config = ChatConfig::default();
        let result = summarizer(client.clone(), &config)
            .summarize_document("A short memo about lunch.")
            .await
            .expect("summary");

        assert_eq!(result.summary, "A tidy summary.");
        assert_eq!(result.chunk_count, 1);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 150);
        assert_eq!(requests[0].model, "gpt-4");
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[1].content.ends_with("A short memo about lunch."));
    }

    #[tokio::test]
    async fn long_text_is_mapped_then_combined() {
        let client = Arc::new(ScriptedLlmClient::replies([
            "part one", "part two", "part three", "whole thing",
        ]));
        let config = ChatConfig::default();
        let text = "x".repeat(10_000);

        let result = summarizer(client.clone(), &config)
            .summarize_document(&text)
            .await
            .expect("summary");

        assert_eq!(result.summary, "whole thing");
        assert_eq!(result.chunk_count, 3);

        let requests = client.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[0].messages[1].content.contains("part 1 of 3"));
        assert!(requests[2].messages[1].content.contains("part 3 of 3"));
        assert!(requests[3].messages[1]
            .content
            .ends_with("part one\n\n---\n\npart two\n\n---\n\npart three"));
    }

    #[tokio::test]
    async fn failures_propagate_without_retry() {
        let client = Arc::new(ScriptedLlmClient::new([
            Scripted::Reply("part one".into()),
            Scripted::Fail("rate limited".into()),
        ]));
        let config = ChatConfig::default();
        let err = summarizer(client.clone(), &config)
            .summarize_document(&"y".repeat(9_000))
            .await
            .expect_err("second chunk fails");

        assert!(matches!(err, CompletionError::Service(_)));
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn instructions_shape_the_request() {
        let client = Arc::new(ScriptedLlmClient::replies(["ok"]));
        let config = ChatConfig::default();
        let instructions = SummaryInstructions {
            system: "Be brief.".into(),
            directive: "Summarize in 10 words:".into(),
        };
        summarizer(client.clone(), &config)
            .summarize("body text", &instructions)
            .await
            .expect("summary");

        let messages = &client.requests()[0].messages;
        assert_eq!(messages[0], ChatMessage::system("Be brief."));
        assert_eq!(messages[1], ChatMessage::user("Summarize in 10 words:\n\nbody text"));
    }
}
