use std::path::Path;
use std::sync::Arc;

use bigfile::api;
use bigfile::config::Config;
use bigfile::utils::cli::Args;
use bigfile::utils::state::AppState;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = validate_config(&args).await;
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config));

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down...");
}

async fn validate_config(args: &Args) -> Config {
    let mut validation_errors = Vec::new();

    let root_dir = Path::new(&args.root);
    match tokio::fs::metadata(root_dir).await {
        Ok(meta) if !meta.is_dir() => validation_errors.push(format!(
            "BIGFILE_ROOTDIR `{}` exists but is not a directory",
            args.root,
        )),
        Ok(_) => {}
        Err(_) => tracing::warn!("BIGFILE_ROOTDIR `{}` does not exist, creating it", args.root),
    }

    if args.max_chunk_bytes == 0 {
        validation_errors.push("BIGFILE_MAX_CHUNK_BYTES must be greater than zero".to_string());
    }

    let config = Config::with_root(
        args.host.clone(),
        args.port,
        root_dir,
        args.digest,
        args.max_chunk_bytes,
    );

    if validation_errors.is_empty() {
        for dir in [&config.chunk_root, &config.artifact_root, &config.spool_dir] {
            if let Err(err) = tokio::fs::create_dir_all(dir).await {
                validation_errors.push(format!(
                    "cannot create directory `{}`: {}",
                    dir.display(),
                    err
                ));
            }
        }
    }

    if !validation_errors.is_empty() {
        eprintln!("{}", validation_errors.join("\n"));
        std::process::exit(1);
    }

    tracing::info!(
        "storing chunks in {}, artifacts in {} ({} digests)",
        config.chunk_root.display(),
        config.artifact_root.display(),
        config.digest_algorithm
    );
    config
}
