//! `Registry`: agent discovery, heartbeats, and presence (spec §4.4).
//! Grounded on `registry/mod.rs`'s entry-map-plus-health shape,
//! generalized from provider capabilities to agent registrations.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rand::seq::IteratorRandom;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::{AgentRegistration, AgentStatus, DiscoverCriteria};
use crate::error::{CoreError, CoreResult};
use crate::ids::AgentId;

pub struct RegistryConfig {
    pub heartbeat_interval: std::time::Duration,
    pub heartbeat_timeout: std::time::Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: std::time::Duration::from_secs(10),
            heartbeat_timeout: std::time::Duration::from_secs(30),
        }
    }
}

pub struct Registry {
    entries: RwLock<HashMap<AgentId, AgentRegistration>>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub async fn register(
        &self,
        agent_id: AgentId,
        kind: impl Into<String>,
        capabilities: Vec<String>,
        metadata: serde_json::Value,
    ) -> AgentRegistration {
        let reg = AgentRegistration::new(agent_id.clone(), kind, capabilities, metadata);
        let mut entries = self.entries.write().await;
        entries.insert(agent_id.clone(), reg.clone());
        info!(%agent_id, "agent registered");
        reg
    }

    pub async fn heartbeat(&self, agent_id: &AgentId) -> CoreResult<()> {
        let mut entries = self.entries.write().await;
        let reg = entries
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::not_found(format!("agent {agent_id}")))?;
        reg.last_heartbeat = Utc::now();
        if reg.status == AgentStatus::Offline {
            reg.status = AgentStatus::Online;
        }
        debug!(%agent_id, "heartbeat received");
        Ok(())
    }

    pub async fn set_status(&self, agent_id: &AgentId, status: AgentStatus) -> CoreResult<()> {
        let mut entries = self.entries.write().await;
        let reg = entries
            .get_mut(agent_id)
            .ok_or_else(|| CoreError::not_found(format!("agent {agent_id}")))?;
        reg.status = status;
        Ok(())
    }

    pub async fn discover(&self, criteria: &DiscoverCriteria) -> Vec<AgentRegistration> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|reg| criteria.matches(reg))
            .cloned()
            .collect()
    }

    /// Prefer online entries; pick uniformly at random from the
    /// filtered pool.
    pub async fn select_one(&self, criteria: &DiscoverCriteria) -> Option<AgentRegistration> {
        let mut matches = self.discover(criteria).await;
        let any_online = matches.iter().any(|r| r.status == AgentStatus::Online);
        if any_online {
            matches.retain(|r| r.status == AgentStatus::Online);
        }
        matches.into_iter().choose(&mut rand::thread_rng())
    }

    pub async fn get(&self, agent_id: &AgentId) -> Option<AgentRegistration> {
        self.entries.read().await.get(agent_id).cloned()
    }

    /// Mark entries offline whose heartbeat has lapsed past the
    /// configured timeout.
    async fn sweep_once(&self) {
        let now = Utc::now();
        let timeout = ChronoDuration::from_std(self.config.heartbeat_timeout).unwrap_or(ChronoDuration::seconds(30));
        let mut entries = self.entries.write().await;
        for reg in entries.values_mut() {
            if reg.status != AgentStatus::Offline && now - reg.last_heartbeat > timeout {
                reg.status = AgentStatus::Offline;
                debug!(agent_id = %reg.agent_id, "marked offline by heartbeat sweep");
            }
        }
    }

    /// Run the background heartbeat sweep until `cancel` fires.
    pub async fn run_sweep_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("registry heartbeat sweep stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }
}
