//! WebSocket Protocol Types
//!
//! Inbound: `{action: "start"|"question"|"end", id, prompt?, model?, system?}`.
//! Outbound: `{action: "answer", response, done, id}`.

use ollama_client::IncrementalResult;
use serde::{Deserialize, Serialize};

/// An inbound frame as sent by the browser, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// `None` when the frame names no known action, has no id, or is a
    /// question without a prompt.
    pub fn into_command(self) -> Option<ClientCommand> {
        let id = self.id.filter(|id| !id.is_empty())?;
        match self.action.as_deref()? {
            "start" => Some(ClientCommand::Start {
                id,
                model: self.model.filter(|m| !m.is_empty()),
                system: self.system.filter(|s| !s.is_empty()),
            }),
            "question" => Some(ClientCommand::Question {
                id,
                prompt: self.prompt.filter(|p| !p.is_empty())?,
            }),
            "end" => Some(ClientCommand::End { id }),
            _ => None,
        }
    }
}

/// A validated request from the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Start {
        id: String,
        model: Option<String>,
        system: Option<String>,
    },
    Question {
        id: String,
        prompt: String,
    },
    End {
        id: String,
    },
}

impl ClientCommand {
    pub fn id(&self) -> &str {
        match self {
            Self::Start { id, .. } | Self::Question { id, .. } | Self::End { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ServerMessage {
    Answer {
        response: String,
        done: bool,
        id: String,
    },
}

impl ServerMessage {
    pub fn answer(id: &str, result: &IncrementalResult) -> Self {
        Self::Answer {
            response: result.response().to_string(),
            done: result.is_done(),
            id: id.to_string(),
        }
    }
}
