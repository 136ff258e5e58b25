//! Binary entry point for the evoagent execution core. The full CLI
//! surface (`init`, `execute`, `serve`, `reflect`, `knowledge`, `doctor`,
//! `session`, `config`, `agent`) lives in [`cli`]; this wires logging
//! and dispatches.

mod cli;
mod config;
mod gateway;
mod providers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    cli::run().await
}
