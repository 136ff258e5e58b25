//! A2A message types (spec §3, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AgentId, MessageId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Notification,
    Broadcast,
    Error,
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Failed,
    Expired,
}

/// Target of a message: an agent id plus optional scoping fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "agentId")]
    pub agent_id: AgentId,
    #[serde(rename = "agentKind")]
    pub agent_kind: String,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<String>,
}

impl Address {
    pub fn new(agent_id: AgentId, agent_kind: impl Into<String>) -> Self {
        Self {
            agent_id,
            agent_kind: agent_kind.into(),
            session_id: None,
            lane: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MessagePayload {
    String(String),
    Data(Value),
    Command { name: String, args: Value },
    Event { event: String, data: Value },
    Error { code: String, message: String },
}

/// A single A2A message (spec §3 Message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub priority: MessagePriority,
    pub status: MessageStatus,
    pub from: Address,
    pub to: Vec<Address>,
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(rename = "correlationId", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<MessageId>,
    #[serde(rename = "retryCount", default)]
    pub retry_count: u32,
    #[serde(rename = "maxRetries", default)]
    pub max_retries: u32,
}

impl Message {
    pub fn new(message_type: MessageType, from: Address, to: Vec<Address>, payload: MessagePayload) -> Self {
        let id = MessageId::new();
        Self {
            id,
            message_type,
            priority: MessagePriority::Normal,
            status: MessageStatus::Pending,
            from,
            to,
            payload,
            timestamp: Utc::now(),
            expires_at: None,
            reply_to: None,
            correlation_id: None,
            retry_count: 0,
            max_retries: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp < now).unwrap_or(false)
    }

    /// Build the auto-enqueued response to this request, per spec I4:
    /// `replyTo = request.id`, correlation preserved, addressing flipped.
    pub fn build_response(&self, payload: MessagePayload) -> Message {
        let mut response = Message::new(
            MessageType::Response,
            self.to.first().cloned().unwrap_or_else(|| self.from.clone()),
            vec![self.from.clone()],
            payload,
        );
        response.reply_to = Some(self.id.clone());
        response.correlation_id = Some(self.correlation_id.clone().unwrap_or_else(|| self.id.clone()));
        response
    }

    pub fn build_error_response(&self, code: impl Into<String>, message: impl Into<String>) -> Message {
        self.build_response(MessagePayload::Error {
            code: code.into(),
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub priority: Option<MessagePriority>,
    pub max_retries: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub delivered_to: Vec<AgentId>,
    pub response: Option<Message>,
}
