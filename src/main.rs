use character_relay::config::{config_search_paths, load_env_file};
use character_relay::relay::build_client;
use character_relay::{build_router, AppState, RelayConfig, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "character-relay",
    about = "Streaming chat relay for character-chat clients",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log file path
    #[arg(long, default_value = "character-relay.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "character_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    if let Some(env_file) = load_env_file() {
        info!(path = %env_file.display(), "Loaded environment file");
    }

    let mut config = RelayConfig::find_and_load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    let api_key = config.resolve_api_key();
    if api_key.is_none() {
        warn!(
            "{} is not set; every /chat request will fail with 500",
            config.upstream.api_key_env
        );
        logger.warn(
            "startup",
            format!("{} is not set", config.upstream.api_key_env),
        );
    }

    info!("character-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:  {}", config.upstream.url);
    info!("  Model:     {} (default)", config.upstream.default_model);
    info!("  Port:      {}", config.port);
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting character-relay upstream={} port={}",
            config.upstream.url, config.port
        ),
    );

    let client = build_client(&config.upstream)?;
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(config, client, logger, api_key));

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
