use clap::{Parser, Subcommand};

use pxbox_server::{api, db, AppState, Config};

#[derive(Parser)]
#[command(name = "pxbox-server", about = "PxBox data-entry broker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the broker (default)
    Serve,
    /// Apply schema migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pxbox_server=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => migrate(&config).await,
        Command::Serve => serve(config).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Fatal: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn migrate(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;
    if config.event_log_url != config.database_url {
        let event_pool = db::connect(&config.event_log_url).await?;
        db::migrate(&event_pool).await?;
    }
    tracing::info!("Migrations applied");
    Ok(())
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(env = %config.environment, "Starting pxbox-server");

    let state = AppState::new(config.clone()).await?;

    // Crash-safe startup: resume flows, re-arm timed tasks
    state.start_background_tasks().await?;

    let app = api::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    tracing::info!("pxbox-server listening on {}", config.addr);

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
