use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        f.write_str(label)
    }
}

/// One role-tagged entry of a conversation. Content is always plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Time-based identity for hosts that do not bring their own.
    pub fn generate() -> Self {
        let now = Utc::now();
        Self(format!(
            "session-{}",
            now.timestamp_nanos_opt()
                .unwrap_or_else(|| now.timestamp_micros())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Ordered message history of a single conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    messages: Vec<ChatMessage>,
    max_history: Option<usize>,
}

impl Session {
    pub fn new(id: SessionId, max_history: Option<usize>) -> Self {
        Self {
            id,
            messages: Vec::new(),
            max_history,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends in chronological order, evicting the oldest entries when a cap is set.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
        if let Some(cap) = self.max_history {
            if self.messages.len() > cap {
                let excess = self.messages.len() - cap;
                self.messages.drain(..excess);
            }
        }
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).expect("serialize");
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn history_cap_drops_oldest_first() {
        let mut session = Session::new(SessionId::new("s"), Some(2));
        session.append(ChatMessage::user("one"));
        session.append(ChatMessage::assistant("two"));
        session.append(ChatMessage::user("three"));

        let contents: Vec<_> = session.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[test]
    fn history_json_is_the_message_list() {
        let mut session = Session::new(SessionId::new("json"), None);
        session.append(ChatMessage::system("ctx"));
        session.append(ChatMessage::user("q"));

        let json = serde_json::to_string(&session.snapshot()).expect("serialize");
        assert_eq!(
            json,
            r#"[{"role":"system","content":"ctx"},{"role":"user","content":"q"}]"#
        );
    }

    #[test]
    fn generated_ids_are_prefixed() {
        assert!(SessionId::generate().as_str().starts_with("session-"));
    }
}
