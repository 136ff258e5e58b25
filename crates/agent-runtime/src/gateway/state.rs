//! Shared gateway state and the request-handling sequence of spec §4.9.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use coordination::ids::{SessionId, TaskId};
use coordination::{CoreResult, Orchestrator, OrchestratorStepExecutor, Planner, SessionEvent, SessionLog};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};

use super::client::{ClientConnection, ClientState};
use super::protocol::Envelope;
use super::rate_limit::RateLimiter;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_per_sec: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(45),
            rate_limit_capacity: 20,
            rate_limit_refill_per_sec: 5,
        }
    }
}

/// A registered client's connection state plus its outbound channel.
pub struct ClientHandle {
    pub connection: ClientConnection,
    pub outbound: mpsc::UnboundedSender<Envelope>,
}

pub struct GatewayState {
    config: GatewayConfig,
    sessions: Arc<SessionLog>,
    planner: Arc<Planner>,
    orchestrator: Arc<Orchestrator>,
    executor: Arc<dyn OrchestratorStepExecutor>,
    clients: RwLock<HashMap<String, ClientHandle>>,
    rate_limiters: Mutex<HashMap<String, RateLimiter>>,
    connection_count: AtomicU64,
    started_at: Instant,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        sessions: Arc<SessionLog>,
        planner: Arc<Planner>,
        orchestrator: Arc<Orchestrator>,
        executor: Arc<dyn OrchestratorStepExecutor>,
    ) -> Self {
        Self {
            config,
            sessions,
            planner,
            orchestrator,
            executor,
            clients: RwLock::new(HashMap::new()),
            rate_limiters: Mutex::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Registers a newly connected client and returns its outbound
    /// receiver for the caller's writer task to drain.
    pub async fn register_client(&self, client_id: String) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connection = ClientConnection::new(client_id.clone());
        connection.transition(ClientState::Connected);
        self.clients.write().await.insert(
            client_id.clone(),
            ClientHandle {
                connection,
                outbound: tx,
            },
        );
        self.rate_limiters.lock().await.insert(
            client_id,
            RateLimiter::new(self.config.rate_limit_capacity, self.config.rate_limit_refill_per_sec),
        );
        self.connection_count.fetch_add(1, Ordering::Relaxed);
        rx
    }

    pub async fn deregister_client(&self, client_id: &str) {
        self.clients.write().await.remove(client_id);
        self.rate_limiters.lock().await.remove(client_id);
        self.connection_count.fetch_sub(1, Ordering::Relaxed);
    }

    async fn send(&self, client_id: &str, envelope: Envelope) {
        if let Some(handle) = self.clients.read().await.get(client_id) {
            let _ = handle.outbound.send(envelope);
        }
    }

    pub async fn touch_pong(&self, client_id: &str) {
        if let Some(handle) = self.clients.write().await.get_mut(client_id) {
            handle.connection.last_pong = Instant::now();
        }
    }

    /// Dispatches one inbound envelope for `client_id`.
    pub async fn handle_envelope(&self, client_id: &str, envelope: Envelope) {
        use super::protocol::EnvelopeType;
        match envelope.kind {
            EnvelopeType::Ping => {
                self.send(client_id, Envelope::pong(envelope.id)).await;
            }
            EnvelopeType::Request => {
                let payload = envelope
                    .payload
                    .and_then(|p| serde_json::from_value::<super::protocol::RequestPayload>(p).ok());
                match payload {
                    Some(payload) => self.handle_request(client_id, envelope.id, payload).await,
                    None => {
                        self.send(client_id, Envelope::error(envelope.id, "malformed request payload"))
                            .await;
                    }
                }
            }
            _ => {
                self.send(client_id, Envelope::error(envelope.id, "unsupported envelope type"))
                    .await;
            }
        }
    }

    /// Implements spec §4.9's request sequence: validate, rate-limit,
    /// bind a session, acknowledge as pending, plan and execute in the
    /// background streaming progress, then deliver the final result.
    async fn handle_request(&self, client_id: &str, request_id: String, payload: super::protocol::RequestPayload) {
        if payload.input.trim().is_empty() {
            self.send(client_id, Envelope::error(&request_id, "input must not be empty"))
                .await;
            return;
        }

        let allowed = {
            let mut limiters = self.rate_limiters.lock().await;
            match limiters.get_mut(client_id) {
                Some(limiter) => limiter.try_acquire(),
                None => Ok(()),
            }
        };
        if let Err(retry_after) = allowed {
            self.send(
                client_id,
                Envelope::error(&request_id, format!("rate limited, retry after {}ms", retry_after.as_millis())),
            )
            .await;
            return;
        }

        let session_id = match &payload.session_id {
            Some(raw) => {
                let sid = SessionId::from(raw.as_str());
                if self.sessions.load(&sid).await.is_err() {
                    if let Err(e) = self.sessions.create(sid.clone(), None).await {
                        warn!(error = %e, "failed to create bound session");
                    }
                }
                sid
            }
            None => {
                let sid = SessionId::new();
                if let Err(e) = self.sessions.create(sid.clone(), None).await {
                    warn!(error = %e, "failed to create session");
                }
                sid
            }
        };

        if let Some(handle) = self.clients.write().await.get_mut(client_id) {
            handle.connection.session_id = Some(session_id.clone());
            handle.connection.transition(ClientState::Serving);
        }

        self.send(
            client_id,
            Envelope::response(&request_id, serde_json::json!({"status": "pending", "sessionId": session_id})),
        )
        .await;

        let _ = self
            .sessions
            .append(&session_id, SessionEvent::new("task.started", session_id.clone(), None))
            .await;

        self.send(
            client_id,
            Envelope::response(&request_id, serde_json::json!({"status": "running", "progress": 0})),
        )
        .await;

        let task_id = TaskId::new();
        let outcome = self.execute(task_id, &payload.input, client_id, &request_id, &session_id).await;

        match outcome {
            Ok(result) => {
                let _ = self
                    .sessions
                    .append(
                        &session_id,
                        SessionEvent::new(
                            "task.completed",
                            session_id.clone(),
                            Some(serde_json::json!({"success": result.success})),
                        ),
                    )
                    .await;
                self.send(
                    client_id,
                    Envelope::response(
                        &request_id,
                        serde_json::json!({
                            "status": if result.success { "completed" } else { "failed" },
                            "result": result.aggregated_output,
                            "artifacts": result.artifacts,
                            "errors": result.errors,
                        }),
                    ),
                )
                .await;
            }
            Err(e) => {
                let _ = self
                    .sessions
                    .append(
                        &session_id,
                        SessionEvent::new(
                            "task.failed",
                            session_id.clone(),
                            Some(serde_json::json!({"error": e.to_string()})),
                        ),
                    )
                    .await;
                self.send(client_id, Envelope::error(&request_id, e.to_string())).await;
            }
        }

        if let Some(handle) = self.clients.write().await.get_mut(client_id) {
            handle.connection.transition(ClientState::Idle);
        }
    }

    async fn execute(
        &self,
        task_id: TaskId,
        requirement: &str,
        client_id: &str,
        request_id: &str,
        session_id: &SessionId,
    ) -> CoreResult<coordination::OrchestratorResult> {
        let plan = self.planner.plan(task_id, requirement).await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client_id = client_id.to_string();
        let request_id = request_id.to_string();
        let session_id_for_progress = session_id.clone();
        let forwarder = self.forward_progress(client_id, request_id, session_id_for_progress, &mut rx);

        let orchestrator = self.orchestrator.clone();
        let executor = self.executor.clone();
        let plan_for_run = plan.clone();
        let run = async move {
            orchestrator
                .run_with_progress(&plan_for_run, executor.as_ref(), Some(&tx))
                .await
        };

        let (result, _) = tokio::join!(run, forwarder);
        result
    }

    async fn forward_progress(
        &self,
        client_id: String,
        request_id: String,
        session_id: SessionId,
        rx: &mut mpsc::UnboundedReceiver<coordination::orchestrator::StepResult>,
    ) {
        while let Some(step) = rx.recv().await {
            let _ = session_id;
            self.send(
                &client_id,
                Envelope::event(
                    "progress",
                    serde_json::json!({
                        "requestId": request_id,
                        "stepId": step.step_id,
                        "status": step.status,
                        "attempts": step.attempts,
                    }),
                ),
            )
            .await;
        }
    }

    /// Closes any client whose last pong is older than the configured
    /// heartbeat timeout.
    pub async fn heartbeat_sweep(&self) -> Vec<String> {
        let cutoff = self.config.heartbeat_timeout;
        let stale: Vec<String> = self
            .clients
            .read()
            .await
            .iter()
            .filter(|(_, h)| h.connection.last_pong.elapsed() > cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            info!(client = %id, "closing stale connection");
            self.deregister_client(id).await;
        }
        stale
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.config.heartbeat_interval
    }

    pub async fn healthz(&self) -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "uptimeSeconds": self.started_at.elapsed().as_secs(),
            "connections": self.clients.read().await.len(),
        })
    }

    pub async fn metrics(&self) -> String {
        let connections = self.clients.read().await.len();
        format!(
            "# HELP gateway_connections Active gateway connections\n# TYPE gateway_connections gauge\ngateway_connections {connections}\n# HELP gateway_uptime_seconds Gateway uptime in seconds\n# TYPE gateway_uptime_seconds counter\ngateway_uptime_seconds {}\n",
            self.started_at.elapsed().as_secs()
        )
    }
}
