//! Contracts for the external collaborators this crate consumes but does
//! not implement: LLM provider adapters, the embedding provider, and the
//! sandboxed skill executor (§1 of the spec — these are deliberately out
//! of scope for the core). Every one of the ten components talks to
//! these through a trait object so tests can inject deterministic mocks,
//! following the teacher's "accept collaborators as explicit
//! dependencies" posture (see `SPEC_FULL.md` §9, "Global state").

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreResult;

/// A single turn of LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub tokens_used: u32,
}

/// LLM provider contract: `complete`, `stream`, `countTokens`, `healthCheck`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> CoreResult<CompletionResponse>;

    /// Streams completion chunks to `on_chunk`; returns the assembled response.
    async fn stream(
        &self,
        req: CompletionRequest,
        on_chunk: Box<dyn FnMut(&str) + Send>,
    ) -> CoreResult<CompletionResponse>;

    fn count_tokens(&self, text: &str) -> u32;

    async fn health_check(&self) -> CoreResult<()>;
}

/// Embedding provider contract: `embed`, `embedBatch`, similarity math
/// lives on the consumer side (`vector::similarity::cosine`).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// Resource limits for a single skill execution.
#[derive(Debug, Clone)]
pub struct SkillExecutionLimits {
    pub timeout_ms: u64,
    pub max_memory_bytes: u64,
    pub allowed_modules: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SkillExecutionResult {
    pub success: bool,
    pub output: Value,
    pub stderr: Option<String>,
}

/// Sandboxed skill executor contract.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        ctx: &Value,
        limits: SkillExecutionLimits,
    ) -> CoreResult<SkillExecutionResult>;
}

/// Escapes a string for safe interpolation into shell-adjacent skill
/// contexts. Wraps in single quotes, escaping embedded single quotes the
/// POSIX way (`'\''`).
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_escape_handles_quotes() {
        assert_eq!(shell_escape("hello"), "'hello'");
        assert_eq!(shell_escape("it's"), r"'it'\''s'");
    }
}
