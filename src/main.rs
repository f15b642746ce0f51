//! image-ladder - Multi-resolution AVIF derivative server.
//!
//! This binary starts the sync scheduler and the HTTP server and wires all
//! components together.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_ladder::{
    config::Config,
    derive::{DerivativeBuilder, DerivativeEncoder, WorkerPool},
    ladder::ResolutionResolver,
    scheduler::SyncScheduler,
    server::{create_router, RouterConfig},
    service::ImageService,
    store::{DerivativeStore, RedisStore},
    sync::{GitSyncer, SourceRepository},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let ladder = match config.resolution_ladder() {
        Ok(ladder) => Arc::new(ladder),
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Repository: {}", config.repo_url);
    info!("  Mirror: {}", config.repo_path.display());
    info!("  Sync interval: {}ms", config.sync_interval_ms);
    info!(
        "  Redis: {} (pool of {})",
        config.redis_url(),
        config.redis_pool_size
    );
    info!(
        "  AVIF: quality {}, speed {}, {} workers",
        config.avif_quality,
        config.avif_speed,
        config.worker_count()
    );
    info!("  Ladder: {:?}", ladder.tiers());

    let store = match RedisStore::new(&config.redis_url(), config.redis_pool_size) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to create Redis pool: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Unreachable Redis is not fatal; the scheduler and health check keep retrying
    match store.ping().await {
        Ok(()) => info!("  Connected to Redis"),
        Err(e) => warn!("  Redis not reachable yet: {}", e),
    }

    let syncer = Arc::new(GitSyncer::new(SourceRepository::new(
        config.repo_path.clone(),
        config.repo_url.clone(),
    )));
    let builder = DerivativeBuilder::new(
        Arc::clone(&ladder),
        DerivativeEncoder::new(config.avif_quality, config.avif_speed),
        WorkerPool::new(config.worker_count()),
    );
    let scheduler = SyncScheduler::new(
        syncer,
        builder,
        Arc::clone(&store),
        config.sync_interval(),
    );

    let token = CancellationToken::new();
    let scheduler_task = {
        let token = token.clone();
        tokio::spawn(async move { scheduler.run(token).await })
    };

    let service = ImageService::new(store, ResolutionResolver::new(ladder));
    let router = create_router(service, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            token.cancel();
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    let shutdown = {
        let token = token.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            token.cancel();
        }
    };

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await;

    token.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Sync scheduler task failed: {}", e);
    }

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_ladder=debug,tower_http=debug"
    } else {
        "image_ladder=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}
