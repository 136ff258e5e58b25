//! Subscription handler contract.

use async_trait::async_trait;

use super::types::{Message, MessagePayload};
use crate::error::CoreResult;

/// A subscriber's handler for messages addressed to it. Returning
/// `Ok(Some(payload))` from a `request` handler causes the bus to
/// auto-enqueue a `response` message; returning `Err` enqueues an
/// `error` message with the same linkage.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> CoreResult<Option<MessagePayload>>;
}

/// Adapts a plain async closure into a `MessageHandler`, for tests and
/// simple subscribers that don't need their own type.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Message) -> CoreResult<Option<MessagePayload>> + Send + Sync,
{
    async fn handle(&self, message: &Message) -> CoreResult<Option<MessagePayload>> {
        (self.0)(message)
    }
}
