mod app;
mod auth;
mod error;
mod handlers;
mod state;
mod wiring;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use gateway_core::config::env_overrides_from_process;
use gateway_core::load_runtime_config;
use gateway_storage::Database;

use crate::state::AppState;
use crate::wiring::Wiring;

/// Multi-tenant AI serving gateway: provider-selection and
/// resource-management substrate plus its operator HTTP surface.
#[derive(Parser)]
#[command(name = "gateway-server")]
#[command(about = "Runs the AI gateway's operator HTTP surface")]
struct Cli {
    /// Path to a TOML runtime configuration file. Missing file is
    /// tolerated: the server falls back to defaults plus environment
    /// overrides.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let toml_content = match &cli.config {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };
    let config = load_runtime_config(&toml_content, &env_overrides_from_process())?;

    let db = Database::open(&config.storage_path).await?;
    let wiring = Wiring::build(&config, db).await?;
    wiring.spawn_background_tasks();

    let bearer_token = config
        .bearer_token
        .clone()
        .unwrap_or_else(|| "changeme".to_string());

    let state = AppState {
        config_store: wiring.config_store.clone(),
        router: wiring.router.clone(),
        resolver: wiring.resolver.clone(),
        bearer_token: Arc::new(bearer_token),
    };

    let app = app::build_app(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    log::info!("gateway-server listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
