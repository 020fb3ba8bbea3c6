use std::time::Duration;

use thiserror::Error;

/// Failures produced while turning an uploaded document into plain text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type '{media_type}' for '{name}' (supported: {supported})")]
    UnsupportedType {
        name: String,
        media_type: String,
        supported: &'static str,
    },

    #[error("no text could be extracted from '{name}'")]
    EmptyContent { name: String },

    #[error("failed to parse {kind} document '{name}': {source}")]
    ParseFailure {
        name: String,
        kind: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ExtractError {
    pub fn parse_failure(
        name: impl Into<String>,
        kind: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::ParseFailure {
            name: name.into(),
            kind,
            source: source.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedType { name, .. } => format!(
                "Unsupported file type for '{name}'. Please upload a PDF, PowerPoint, CSV, or plain text file."
            ),
            Self::EmptyContent { name } => format!(
                "No content could be extracted from '{name}'. Scanned or image-only documents are not supported."
            ),
            Self::ParseFailure { name, kind, source } => {
                format!("Could not read {kind} file '{name}': {source}")
            }
        }
    }
}

/// Failures reported by the hosted completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service request failed: {0}")]
    Service(#[source] anyhow::Error),

    #[error("completion service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("completion service returned an empty reply")]
    EmptyReply,
}

impl CompletionError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Service(err) => format!("The assistant is unavailable right now ({err})."),
            Self::Timeout(limit) => format!(
                "The assistant did not respond within {} seconds. Please try again.",
                limit.as_secs_f32()
            ),
            Self::EmptyReply => "The assistant returned an empty reply. Please try again.".into(),
        }
    }
}

/// Anything that can end a turn early. Always recovered by the orchestrator.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("only one attachment per message is accepted ({count} received)")]
    TooManyAttachments { count: usize },
}

impl TurnError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Extract(err) => format!("Error processing file: {}", err.user_message()),
            Self::Completion(err) => err.user_message(),
            Self::TooManyAttachments { count } => format!(
                "Please attach one file at a time ({count} files were attached)."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_name_the_failure() {
        let err = TurnError::from(ExtractError::UnsupportedType {
            name: "cat.png".into(),
            media_type: "image/png".into(),
            supported: "pdf",
        });
        let msg = err.user_message();
        assert!(msg.starts_with("Error processing file"));
        assert!(msg.contains("Unsupported file type"));

        let timeout = TurnError::from(CompletionError::Timeout(Duration::from_secs(5)));
        assert!(timeout.user_message().contains("5 seconds"));
    }

    #[test]
    fn parse_failure_keeps_source() {
        let err = ExtractError::parse_failure("deck.pptx", "PPT", anyhow::anyhow!("bad zip"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("bad zip"));
    }
}
