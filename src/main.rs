use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use design_vault::config::ServerConfig;
use design_vault::{db, web};

#[derive(Parser, Debug)]
#[command(version, about = "Design library server")]
struct Args {
    /// Path to a TOML config file. Environment variables override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(log_dir: &Path) {
    // JSON to a daily-rotated file, plain text to stdout.
    let file_appender = tracing_appender::rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.listen_addr,
        autosave_delay_ms = config.autosave().delay.as_millis() as u64,
        "Starting design library server..."
    );

    if let Some(data_dir) = config.sqlite_data_dir() {
        std::fs::create_dir_all(&data_dir)?;
    }
    let db_pool = db::connect(&config.database_url).await.map_err(|e| {
        error!(error = %e, database_url = %config.database_url, "Failed to open database.");
        e
    })?;

    let app_router = web::create_axum_router(db_pool.clone(), &config);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "HTTP server listening.");
    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await?;
    info!("Server stopped.");
    Ok(())
}
