//! Subscription filters, mirroring the teacher's `EventFilter` shape
//! (`events/bus.rs`) adapted to A2A message addressing.

use super::types::{Message, MessageType};
use crate::ids::{AgentId, MessageId};

#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub message_types: Option<Vec<MessageType>>,
    pub from_agent: Option<AgentId>,
    pub reply_to: Option<MessageId>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(mut self, types: Vec<MessageType>) -> Self {
        self.message_types = Some(types);
        self
    }

    pub fn from(mut self, agent_id: AgentId) -> Self {
        self.from_agent = Some(agent_id);
        self
    }

    pub fn reply_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        if let Some(types) = &self.message_types {
            if !types.contains(&message.message_type) {
                return false;
            }
        }
        if let Some(agent) = &self.from_agent {
            if &message.from.agent_id != agent {
                return false;
            }
        }
        if let Some(reply_to) = &self.reply_to {
            if message.reply_to.as_ref() != Some(reply_to) {
                return false;
            }
        }
        true
    }
}
