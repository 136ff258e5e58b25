//! Registry types (spec §3 AgentRegistration, §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::Address;
use crate::ids::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Busy,
    Error,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistration {
    #[serde(rename = "agentId")]
    pub agent_id: AgentId,
    #[serde(rename = "agentKind")]
    pub agent_kind: String,
    pub address: Address,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    #[serde(default)]
    pub metadata: Value,
    #[serde(rename = "registeredAt")]
    pub registered_at: DateTime<Utc>,
    #[serde(rename = "lastHeartbeat")]
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentRegistration {
    pub fn new(agent_id: AgentId, agent_kind: impl Into<String>, capabilities: Vec<String>, metadata: Value) -> Self {
        let agent_kind = agent_kind.into();
        let now = Utc::now();
        Self {
            address: Address::new(agent_id.clone(), agent_kind.clone()),
            agent_id,
            agent_kind,
            capabilities,
            status: AgentStatus::Online,
            metadata,
            registered_at: now,
            last_heartbeat: now,
        }
    }

    /// `status == online ∧ now − lastHeartbeat < heartbeatTimeout`.
    pub fn is_present(&self, now: DateTime<Utc>, heartbeat_timeout: chrono::Duration) -> bool {
        self.status == AgentStatus::Online && now - self.last_heartbeat < heartbeat_timeout
    }
}

/// Predicate criteria for `discover`.
#[derive(Debug, Clone, Default)]
pub struct DiscoverCriteria {
    pub kind: Option<String>,
    pub required_capabilities: Vec<String>,
    pub status: Option<Vec<AgentStatus>>,
    pub min_heartbeat: Option<DateTime<Utc>>,
    pub metadata_equals: Vec<(String, Value)>,
}

impl DiscoverCriteria {
    pub fn matches(&self, reg: &AgentRegistration) -> bool {
        if let Some(kind) = &self.kind {
            if &reg.agent_kind != kind {
                return false;
            }
        }
        if !self
            .required_capabilities
            .iter()
            .all(|c| reg.capabilities.contains(c))
        {
            return false;
        }
        if let Some(statuses) = &self.status {
            if !statuses.contains(&reg.status) {
                return false;
            }
        }
        if let Some(min) = self.min_heartbeat {
            if reg.last_heartbeat < min {
                return false;
            }
        }
        self.metadata_equals
            .iter()
            .all(|(key, expected)| reg.metadata.get(key).map(|v| v == expected).unwrap_or(false))
    }
}
