//! Tool registry: dispatch-by-name with a policy pre-check hook.
//! Generalized from the teacher's `crates/swarm-agents/src/tools/mod.rs`
//! concrete fs/exec tools to the spec's generic `executeToolCall`
//! contract — concrete tool bodies are the out-of-scope skill executor,
//! reached only through [`crate::collaborators::SkillExecutor`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    async fn call(&self, params: Value, ctx: &Value) -> CoreResult<Value>;
}

/// Denies or allows a tool call before dispatch; returning `Err` denies.
pub trait ToolPolicy: Send + Sync {
    fn check(&self, tool_name: &str, params: &Value) -> CoreResult<()>;
}

pub struct AllowAllPolicy;

impl ToolPolicy for AllowAllPolicy {
    fn check(&self, _tool_name: &str, _params: &Value) -> CoreResult<()> {
        Ok(())
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    policy: Arc<dyn ToolPolicy>,
}

impl ToolRegistry {
    pub fn new(policy: Arc<dyn ToolPolicy>) -> Self {
        Self {
            tools: HashMap::new(),
            policy,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub async fn execute(&self, name: &str, params: Value, ctx: &Value) -> CoreResult<Value> {
        self.policy.check(name, &params)?;
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| CoreError::not_found(format!("tool {name}")))?;
        tool.call(params, ctx).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(Arc::new(AllowAllPolicy))
    }
}
