use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConversationId, DeskNotifyScope, MessageKind, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub kind: MessageKind,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEnvelope {
    pub conversation_id: ConversationId,
    pub name: String,
    pub number_format: String,
    pub desk_notify: DeskNotifyScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<UserId>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptInUpdate {
    pub conversation_id: ConversationId,
    pub contact_name: String,
    pub opted_in: bool,
}

/// One server-pushed event. Batches arrive as a JSON array of these; the
/// tag/payload layout matches the push transport's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundEvent {
    NewMessages(Vec<ConversationEnvelope>),
    OptIn(OptInUpdate),
    ErrorMessages(Vec<ConversationEnvelope>),
}

#[derive(Debug, Error)]
#[error("invalid inbound event batch: {0}")]
pub struct DecodeBatchError(#[from] serde_json::Error);

/// Decodes a raw push delivery once at the boundary; everything downstream
/// works on the typed events.
pub fn decode_batch(raw: &str) -> Result<Vec<InboundEvent>, DecodeBatchError> {
    Ok(serde_json::from_str(raw)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Warning,
    Danger,
}

/// A toast handed to the host notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NoticeKind>,
    #[serde(default)]
    pub sticky: bool,
}
