use serde::{Deserialize, Serialize};

use crate::constants::MessageType;

/// Errors raised when an envelope does not match its message type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("message type {0} requires a message string")]
    MissingMessage(MessageType),

    #[error("message type {0} does not carry a message string")]
    UnexpectedMessage(MessageType),

    #[error("invalid envelope JSON: {0}")]
    Json(String),
}

/// Envelope for control messages exchanged on the comm ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Message {
    /// Creates a bare signal with a fresh id.
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type,
            message: None,
        }
    }

    /// Creates a message carrying `text` with a fresh id.
    pub fn with_message(msg_type: MessageType, text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::new(msg_type)
        }
    }

    /// Checks that a message string is present exactly when the type needs one.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        match (self.msg_type.requires_message(), &self.message) {
            (true, None) => Err(EnvelopeError::MissingMessage(self.msg_type)),
            (false, Some(_)) => Err(EnvelopeError::UnexpectedMessage(self.msg_type)),
            _ => Ok(()),
        }
    }

    /// Creates a bare reply that keeps this message's id.
    pub fn reply(&self, msg_type: MessageType) -> Self {
        Self {
            id: self.id.clone(),
            msg_type,
            message: None,
        }
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        self.validate()?;
        serde_json::to_string(self).map_err(|e| EnvelopeError::Json(e.to_string()))
    }

    /// Parses and validates an envelope.
    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        let msg: Message =
            serde_json::from_str(json).map_err(|e| EnvelopeError::Json(e.to_string()))?;
        msg.validate()?;
        Ok(msg)
    }
}
