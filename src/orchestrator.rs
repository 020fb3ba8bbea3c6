use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::config::{AttachmentPolicy, ChatConfig};
use crate::error::TurnError;
use crate::ingest::{extract_blocking, UploadedDocument};
use crate::llm_client::{complete_with_timeout, CompletionRequest, SharedLlmClient};
use crate::session::{ChatMessage, Session, SessionId, SessionStore};
use crate::summarizer::Summarizer;

/// One user action as delivered by the transport.
#[derive(Debug, Clone, Default)]
pub struct IncomingAction {
    pub text: Option<String>,
    pub attachments: Vec<UploadedDocument>,
}

impl IncomingAction {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    pub fn attachment(document: UploadedDocument) -> Self {
        Self {
            text: None,
            attachments: vec![document],
        }
    }

    pub fn with_attachment(mut self, document: UploadedDocument) -> Self {
        self.attachments.push(document);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutgoingKind {
    Reply,
    Summary,
    Error,
    Notice,
}

/// What the transport should show the user at the end of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub kind: OutgoingKind,
    pub content: String,
}

impl OutgoingMessage {
    fn new(kind: OutgoingKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == OutgoingKind::Error
    }
}

/// Result of inspecting an action before any session mutation.
#[derive(Debug)]
enum Dispatch {
    Idle,
    Text(String),
    File(UploadedDocument),
    Rejected(TurnError),
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Idle => f.write_str("idle"),
            Dispatch::Text(_) => f.write_str("text_turn"),
            Dispatch::File(_) => f.write_str("file_turn"),
            Dispatch::Rejected(_) => f.write_str("rejected"),
        }
    }
}

/// Entry point for every incoming action: picks the turn, mutates the
/// session, and produces the outgoing message.
pub struct Orchestrator {
    llm_client: SharedLlmClient,
    summarizer: Summarizer,
    sessions: Arc<SessionStore>,
    config: ChatConfig,
}

impl Orchestrator {
    const WELCOME: &'static str = "Welcome to your AI assistant! How can I help you today?";

    pub fn new(llm_client: SharedLlmClient, config: ChatConfig) -> Self {
        let sessions = Arc::new(SessionStore::new(config.max_history));
        Self::with_sessions(llm_client, config, sessions)
    }

    pub fn with_sessions(
        llm_client: SharedLlmClient,
        config: ChatConfig,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            summarizer: Summarizer::new(llm_client.clone(), &config),
            llm_client,
            sessions,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Opens (or resets) a conversation and returns the greeting.
    pub async fn start_session(&self, id: &SessionId) -> anyhow::Result<OutgoingMessage> {
        self.sessions.clear(id).await?;
        self.sessions.open(id)?;
        info!(session = %id, "session started");
        Ok(OutgoingMessage::new(OutgoingKind::Notice, Self::WELCOME))
    }

    pub fn end_session(&self, id: &SessionId) -> anyhow::Result<bool> {
        let existed = self.sessions.remove(id)?;
        info!(session = %id, existed, "session ended");
        Ok(existed)
    }

    /// Runs one turn to completion. `None` means the action carried nothing to do.
    /// Turn failures come back as error messages; `Err` is reserved for a broken store.
    #[instrument(skip_all, fields(session = %session_id))]
    pub async fn handle(
        &self,
        session_id: &SessionId,
        action: IncomingAction,
    ) -> anyhow::Result<Option<OutgoingMessage>> {
        let dispatch = self.dispatch(action);
        info!(turn = %dispatch, "dispatching action");

        let outcome = match dispatch {
            Dispatch::Idle => return Ok(None),
            Dispatch::Rejected(err) => Err(err),
            Dispatch::Text(text) => {
                let handle = self.sessions.open(session_id)?;
                let mut session = handle.lock().await;
                self.text_turn(&mut session, text).await
            }
            Dispatch::File(document) => {
                let handle = self.sessions.open(session_id)?;
                let mut session = handle.lock().await;
                self.file_turn(&mut session, document).await
            }
        };

        Ok(Some(outcome.unwrap_or_else(|err| {
            warn!(error = %err, "turn failed");
            OutgoingMessage::new(OutgoingKind::Error, err.user_message())
        })))
    }

    fn dispatch(&self, action: IncomingAction) -> Dispatch {
        let IncomingAction { text, attachments } = action;
        let count = attachments.len();

        if count > 1 && self.config.attachment_policy == AttachmentPolicy::RejectAll {
            return Dispatch::Rejected(TurnError::TooManyAttachments { count });
        }

        if let Some(first) = attachments.into_iter().next() {
            if count > 1 {
                warn!(
                    ignored = count - 1,
                    document = %first.name,
                    "multiple attachments received; processing the first only"
                );
            }
            return Dispatch::File(first);
        }

        match text {
            Some(text) if !text.trim().is_empty() => Dispatch::Text(text),
            _ => Dispatch::Idle,
        }
    }

    async fn text_turn(
        &self,
        session: &mut Session,
        text: String,
    ) -> Result<OutgoingMessage, TurnError> {
        session.append(ChatMessage::user(text));

        let request = CompletionRequest {
            model: self.config.model.clone(),
            messages: session.snapshot(),
            max_tokens: self.config.max_reply_tokens,
        };
        let reply = complete_with_timeout(
            self.llm_client.as_ref(),
            request,
            self.config.request_timeout,
        )
        .await
        .map_err(|err| {
            error!(error = %err, history = session.len(), "completion failed");
            err
        })?;

        let content = reply.content.clone();
        session.append(reply);
        Ok(OutgoingMessage::new(OutgoingKind::Reply, content))
    }

    async fn file_turn(
        &self,
        session: &mut Session,
        document: UploadedDocument,
    ) -> Result<OutgoingMessage, TurnError> {
        let extracted = extract_blocking(document).await?;
        let summary = self.summarizer.summarize_document(&extracted.text).await?;
        info!(
            document = %extracted.name,
            kind = extracted.kind.tag(),
            chunks = summary.chunk_count,
            "document summarized"
        );

        session.append(ChatMessage::system(format!(
            "{} document '{}' summary:\n\n{}",
            extracted.kind.tag(),
            extracted.name,
            summary.summary
        )));

        Ok(OutgoingMessage::new(
            OutgoingKind::Summary,
            format!(
                "File '{}' processed. Here's a summary:\n\n{}\n\nYou can now ask questions about this document.",
                extracted.name, summary.summary
            ),
        ))
    }
}
