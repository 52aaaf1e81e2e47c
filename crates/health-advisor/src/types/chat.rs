//! Conversational chat types

use serde::{Deserialize, Serialize};

/// Speaker of a chat turn; any role other than `user` is treated as the assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    #[serde(other)]
    Assistant,
}

impl ChatRole {
    pub fn label(&self) -> &'static str {
        match self {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        }
    }
}

/// One prior turn of conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: &str) -> Self {
        Self {
            role: ChatRole::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.to_string(),
        }
    }
}

/// Result of a chat call; provider failures land in `error` instead of failing the call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub model: String,
    pub has_image_analysis: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatReply {
    /// Reply carrying a provider failure the caller can render conversationally
    pub fn failed(diagnostic: &str) -> Self {
        Self {
            response: format!("Error: {}", diagnostic),
            model: "error".to_string(),
            has_image_analysis: false,
            error: Some(diagnostic.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_role_is_assistant() {
        let turn: ChatTurn =
            serde_json::from_str(r#"{"role":"model","content":"hello"}"#).unwrap();
        assert_eq!(turn.role, ChatRole::Assistant);

        let turn: ChatTurn = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(turn.role, ChatRole::User);
    }

    #[test]
    fn test_failed_reply() {
        let reply = ChatReply::failed("Cannot connect");
        assert!(reply.is_error());
        assert_eq!(reply.model, "error");
        assert_eq!(reply.response, "Error: Cannot connect");
        assert!(!reply.has_image_analysis);
    }
}
