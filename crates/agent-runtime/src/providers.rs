//! Default, HTTP-backed implementations of the collaborator traits
//! `coordination` consumes but does not implement: an OpenAI-compatible
//! chat-completions `LlmProvider`, an embeddings-endpoint
//! `EmbeddingProvider`, and a subprocess-backed `SkillExecutor`.
//! Grounded on the teacher's `query_llm`/`ChatRequest`/`ChatResponse`
//! reqwest pattern in `coordination/src/main.rs`.

use std::time::Duration;

use async_trait::async_trait;
use coordination::{CompletionRequest, CompletionResponse, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LlmConfig;

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct HttpLlmProvider {
    config: LlmConfig,
    http: reqwest::Client,
}

impl HttpLlmProvider {
    pub fn new(config: LlmConfig) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(Self { config, http })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl coordination::LlmProvider for HttpLlmProvider {
    async fn complete(&self, req: CompletionRequest) -> CoreResult<CompletionResponse> {
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: req.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: req.max_tokens.unwrap_or(2048),
            temperature: req.temperature.unwrap_or(0.2),
        };

        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Transient(format!("LLM request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Transient(format!("LLM API error ({status}): {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("failed to parse LLM response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CoreError::Internal("LLM returned no choices".to_string()))?;

        let tokens_used = self.count_tokens(&content);
        Ok(CompletionResponse { content, tokens_used })
    }

    async fn stream(
        &self,
        req: CompletionRequest,
        mut on_chunk: Box<dyn FnMut(&str) + Send>,
    ) -> CoreResult<CompletionResponse> {
        let response = self.complete(req).await?;
        on_chunk(&response.content);
        Ok(response)
    }

    fn count_tokens(&self, text: &str) -> u32 {
        (text.len() / 4).max(1) as u32
    }

    async fn health_check(&self) -> CoreResult<()> {
        self.http
            .get(&self.config.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| CoreError::Transient(format!("LLM health check failed: {e}")))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    config: LlmConfig,
    http: reqwest::Client,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: LlmConfig, dimension: usize) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(Self { config, http, dimension })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl coordination::EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let body = EmbeddingRequest {
            model: self.config.model.clone(),
            input: text.to_string(),
        };
        let mut request = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Transient(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Transient(format!("embedding API error ({status}): {text}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("failed to parse embedding response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CoreError::Internal("embedding API returned no data".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Executes a skill as a `sh -c` subprocess under a wall-clock timeout,
/// following the spec's `execute(code, ctx, {timeout, maxMemory,
/// allowedModules})` collaborator contract. `allowedModules` is advisory
/// here; enforcing it is left to the sandboxing layer the spec treats
/// as out of scope.
pub struct ShellSkillExecutor;

#[async_trait]
impl coordination::SkillExecutor for ShellSkillExecutor {
    async fn execute(
        &self,
        code: &str,
        ctx: &Value,
        limits: coordination::SkillExecutionLimits,
    ) -> CoreResult<coordination::SkillExecutionResult> {
        let escaped = coordination::collaborators::shell_escape(code);
        let cwd = ctx
            .get("workspace")
            .and_then(Value::as_str)
            .unwrap_or(".")
            .to_string();

        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(escaped).current_dir(cwd);

        let timeout = Duration::from_millis(limits.timeout_ms);
        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| CoreError::Timeout("skill execution timed out".to_string()))?
            .map_err(|e| CoreError::Internal(format!("failed to spawn skill: {e}")))?;

        Ok(coordination::SkillExecutionResult {
            success: output.status.success(),
            output: Value::String(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: if output.stderr.is_empty() {
                None
            } else {
                Some(String::from_utf8_lossy(&output.stderr).into_owned())
            },
        })
    }
}

/// Bridges a plan [`Step`](coordination::Step) to the configured
/// [`LlmProvider`](coordination::LlmProvider), the default
/// [`OrchestratorStepExecutor`](coordination::OrchestratorStepExecutor)
/// wired into the gateway and `execute` CLI command.
pub struct LlmStepExecutor {
    llm: std::sync::Arc<dyn coordination::LlmProvider>,
}

impl LlmStepExecutor {
    pub fn new(llm: std::sync::Arc<dyn coordination::LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl coordination::OrchestratorStepExecutor for LlmStepExecutor {
    async fn execute(&self, step: &coordination::Step) -> CoreResult<Value> {
        let prompt = format!(
            "You are a {} agent. Task: {}",
            step.agent_kind, step.description
        );
        let response = self
            .llm
            .complete(CompletionRequest {
                system: Some(format!("Act as the {} role in a coding task.", step.agent_kind)),
                prompt,
                max_tokens: None,
                temperature: None,
            })
            .await?;
        Ok(serde_json::json!({"content": response.content, "tokensUsed": response.tokens_used}))
    }
}
