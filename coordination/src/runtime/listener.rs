//! Lifecycle event listeners. Listener exceptions are isolated from
//! the emitter: a panicking or erroring listener never aborts the run.

use async_trait::async_trait;

use super::types::LifecycleEvent;

#[async_trait]
pub trait LifecycleListener: Send + Sync {
    async fn on_event(&self, event: &LifecycleEvent);
}
