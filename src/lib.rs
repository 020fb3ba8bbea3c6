//! Conversational sessions over a hosted chat-completion API, with document
//! uploads (PDF, PowerPoint, CSV, plain text) summarized into the history.

pub mod config;
pub mod error;
pub mod ingest;
pub mod llm_client;
pub mod orchestrator;
pub mod session;
pub mod summarizer;

pub use config::{AttachmentPolicy, ChatConfig, ChunkingConfig};
pub use error::{CompletionError, ExtractError, TurnError};
pub use orchestrator::{IncomingAction, Orchestrator, OutgoingKind, OutgoingMessage};
pub use session::{ChatMessage, Role, SessionId, SessionStore};
