//! `MessageBus`: typed A2A messaging with filters, subscriptions, and
//! request/response correlation (spec §4.4). Grounded on
//! `events/bus.rs`'s `Arc<Mutex<...>>` subscription-map shape and
//! `EventFilter` predicate style, adapted from broadcast-to-all
//! delivery to per-recipient-agent handler dispatch, since A2A
//! addressing targets specific agents rather than every listener.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::filter::MessageFilter;
use super::handler::MessageHandler;
use super::types::{Address, DeliveryOutcome, Message, MessagePayload, MessageType, SendOptions};
use crate::error::{CoreError, CoreResult};
use crate::ids::AgentId;

/// Opaque handle returned from `subscribe`, used to `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: Option<MessageFilter>,
    handler: Arc<dyn MessageHandler>,
}

/// Bus-wide configuration (spec §5 backpressure: caps the pending
/// buffer and rejects sends past `max_queue_size`).
#[derive(Debug, Clone)]
pub struct MessageBusConfig {
    pub max_queue_size: usize,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self { max_queue_size: 10_000 }
    }
}

pub struct MessageBus {
    subscriptions: RwLock<HashMap<AgentId, Vec<Subscription>>>,
    config: MessageBusConfig,
    in_flight: AtomicUsize,
    listener_error_count: AtomicU64,
}

impl MessageBus {
    pub fn new(config: MessageBusConfig) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            config,
            in_flight: AtomicUsize::new(0),
            listener_error_count: AtomicU64::new(0),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of handler invocations that returned `Err`, surfaced per
    /// the "explicit counters" resolution for listener diagnostics.
    pub fn listener_error_count(&self) -> u64 {
        self.listener_error_count.load(Ordering::Relaxed)
    }

    pub async fn subscribe(
        &self,
        agent_id: AgentId,
        filter: Option<MessageFilter>,
        handler: Arc<dyn MessageHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let mut subs = self.subscriptions.write().await;
        subs.entry(agent_id).or_default().push(Subscription {
            id: id.clone(),
            filter,
            handler,
        });
        id
    }

    pub async fn unsubscribe(&self, agent_id: &AgentId, id: &SubscriptionId) {
        let mut subs = self.subscriptions.write().await;
        if let Some(list) = subs.get_mut(agent_id) {
            list.retain(|s| &s.id != id);
        }
    }

    fn validate(msg: &Message) -> CoreResult<()> {
        if msg.to.is_empty() {
            return Err(CoreError::validation("message has no recipients"));
        }
        Ok(())
    }

    /// Send a message: validate, reject if expired, deliver to every
    /// matching subscription per recipient, auto-enqueue response/error
    /// for `request` messages per spec I4.
    pub async fn send(&self, mut msg: Message, options: SendOptions) -> CoreResult<DeliveryOutcome> {
        Self::validate(&msg)?;

        let now = chrono::Utc::now();
        if msg.is_expired(now) {
            return Err(CoreError::validation("message expired before send"));
        }

        if let Some(priority) = options.priority {
            msg.priority = priority;
        }
        if let Some(max_retries) = options.max_retries {
            msg.max_retries = max_retries;
        }
        if let Some(expires_at) = options.expires_at {
            msg.expires_at = Some(expires_at);
        }

        if self.in_flight.fetch_add(1, Ordering::SeqCst) >= self.config.max_queue_size {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::RateLimited { retry_after_ms: 50 });
        }
        let _guard = InFlightGuard(&self.in_flight);

        let mut delivered_to = Vec::new();
        let mut response = None;

        let subs = self.subscriptions.read().await;
        for addr in &msg.to {
            let Some(candidates) = subs.get(&addr.agent_id) else {
                continue;
            };
            for sub in candidates {
                if let Some(filter) = &sub.filter {
                    if !filter.matches(&msg) {
                        continue;
                    }
                }
                delivered_to.push(addr.agent_id.clone());
                match sub.handler.handle(&msg).await {
                    Ok(Some(payload)) if msg.message_type == MessageType::Request => {
                        debug!(message_id = %msg.id, to = %addr.agent_id, "request handled, enqueuing response");
                        response = Some(msg.build_response(payload));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.listener_error_count.fetch_add(1, Ordering::Relaxed);
                        warn!(message_id = %msg.id, error = %e, "handler failed");
                        if msg.message_type == MessageType::Request {
                            response = Some(msg.build_error_response("handler_error", e.to_string()));
                        }
                    }
                }
            }
        }

        Ok(DeliveryOutcome { delivered_to, response })
    }

    /// Issue a request and synchronously resolve its response (or time
    /// out). Since `send` invokes handlers inline, this is a thin
    /// wrapper with a deadline rather than a second subscription.
    pub async fn send_and_wait(
        &self,
        from: Address,
        to: Address,
        payload: MessagePayload,
        timeout: std::time::Duration,
    ) -> CoreResult<Message> {
        let request = Message::new(MessageType::Request, from, vec![to], payload);
        let request_id = request.id.clone();

        match tokio::time::timeout(timeout, self.send(request, SendOptions::default())).await {
            Ok(Ok(outcome)) => outcome
                .response
                .ok_or_else(|| CoreError::not_found(format!("no handler responded to {request_id}"))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CoreError::Timeout(format!("request {request_id} timed out"))),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::handler::FnHandler;

    fn addr(kind: &str) -> Address {
        Address::new(AgentId::new(), kind)
    }

    #[tokio::test]
    async fn request_response_round_trip() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let agent_b = addr("worker");
        bus.subscribe(
            agent_b.agent_id.clone(),
            None,
            Arc::new(FnHandler(|_msg: &Message| {
                Ok(Some(MessagePayload::String("ACK".into())))
            })),
        )
        .await;

        let agent_a = addr("caller");
        let request = Message::new(
            MessageType::Request,
            agent_a.clone(),
            vec![agent_b.clone()],
            MessagePayload::String("Hi".into()),
        );
        let request_id = request.id.clone();

        let outcome = bus.send(request, SendOptions::default()).await.unwrap();
        assert_eq!(outcome.delivered_to, vec![agent_b.agent_id.clone()]);
        let response = outcome.response.unwrap();
        assert_eq!(response.reply_to, Some(request_id));
    }

    #[tokio::test]
    async fn handler_error_produces_error_response() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let agent_b = addr("worker");
        bus.subscribe(
            agent_b.agent_id.clone(),
            None,
            Arc::new(FnHandler(|_msg: &Message| {
                Err(CoreError::Internal("boom".into()))
            })),
        )
        .await;

        let agent_a = addr("caller");
        let request = Message::new(
            MessageType::Request,
            agent_a,
            vec![agent_b],
            MessagePayload::String("Hi".into()),
        );

        let outcome = bus.send(request, SendOptions::default()).await.unwrap();
        match outcome.response.unwrap().payload {
            MessagePayload::Error { .. } => {}
            other => panic!("expected error payload, got {other:?}"),
        }
        assert_eq!(bus.listener_error_count(), 1);
    }

    #[tokio::test]
    async fn expired_messages_are_rejected() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let mut msg = Message::new(
            MessageType::Notification,
            addr("a"),
            vec![addr("b")],
            MessagePayload::String("late".into()),
        );
        msg.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));

        let err = bus.send(msg, SendOptions::default()).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn send_and_wait_times_out_without_a_subscriber() {
        let bus = MessageBus::new(MessageBusConfig::default());
        let err = bus
            .send_and_wait(
                addr("a"),
                addr("ghost"),
                MessagePayload::String("hello".into()),
                std::time::Duration::from_millis(10),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
