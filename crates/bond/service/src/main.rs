use bond_service::{build_router, ScorerKind, ServiceConfig, ServiceState};
use bond_types::Identity;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "bondd", version, about = "Agent Bond trust record REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8095
    #[arg(long, default_value = "127.0.0.1:8095", env = "BOND_LISTEN")]
    listen: SocketAddr,
    /// TOML configuration file. Defaults apply when absent.
    #[arg(long, env = "BOND_CONFIG")]
    config: Option<PathBuf>,
    /// JSON file persisting agent records and audit trails; in-memory when unset.
    #[arg(long, env = "BOND_STATE_FILE")]
    state_file: Option<PathBuf>,
    /// Identity allowed to resolve disputes and report TVM.
    #[arg(long, env = "BOND_GOVERNANCE")]
    governance: Option<String>,
    /// Identity credited with protocol fees.
    #[arg(long, env = "BOND_TREASURY")]
    treasury: Option<String>,
    /// Reputation scoring strategy.
    #[arg(long, value_enum, env = "BOND_SCORER")]
    scorer: Option<ScorerKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bond_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.state_file {
        config.storage.state_file = Some(path);
    }
    if let Some(governance) = cli.governance {
        config.protocol.governance = Identity::new(governance);
    }
    if let Some(treasury) = cli.treasury {
        config.protocol.treasury = Identity::new(treasury);
    }
    if let Some(scorer) = cli.scorer {
        config.scoring.strategy = scorer;
    }

    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, "bond-service listening");
    axum::serve(listener, app).await?;
    Ok(())
}
