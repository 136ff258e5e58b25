//! Agent-to-agent message bus: typed messages, filters, subscriptions,
//! and request/response correlation (spec §4.4).

#[allow(clippy::module_inception)]
mod bus;
mod filter;
mod handler;
mod types;

pub use bus::{MessageBus, MessageBusConfig, SubscriptionId};
pub use filter::MessageFilter;
pub use handler::{FnHandler, MessageHandler};
pub use types::{
    Address, DeliveryOutcome, Message, MessagePayload, MessagePriority, MessageStatus,
    MessageType, SendOptions,
};
