use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use weather_fanout_service::config::Settings;
use weather_fanout_service::connection::ConnectionHub;
use weather_fanout_service::delivery::create_delivery_channel;
use weather_fanout_service::fanout::{FanoutEngine, FanoutOptions};
use weather_fanout_service::redis::{BackoffConfig, RedisPool};
use weather_fanout_service::registry::create_registry;
use weather_fanout_service::server::{create_app, AppState};
use weather_fanout_service::shutdown::GracefulShutdown;
use weather_fanout_service::source::OpenMeteoSource;
use weather_fanout_service::tasks::{lifecycle_retry_queue, BroadcastTask, LifecycleRetryTask};
use weather_fanout_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.logging, &settings.otel)?;
    tracing::info!(
        registry = %settings.registry.backend,
        delivery = %settings.delivery.mode,
        "Configuration loaded"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Redis is only needed by the redis registry backend
    let redis_pool = if settings.registry.backend == "redis" {
        connect_redis(&settings).await
    } else {
        None
    };

    let registry = create_registry(&settings.registry, redis_pool.clone());
    let hub = Arc::new(ConnectionHub::new());
    let channel = create_delivery_channel(&settings.delivery, hub.clone())?;

    let mut engine = FanoutEngine::new(
        registry.clone(),
        channel,
        FanoutOptions::from(&settings.fanout),
    );

    // Out-of-band retries for failed connect/disconnect writes
    let retry_handle = if settings.fanout.lifecycle_retry_attempts > 0 {
        let (retry_tx, retry_rx) =
            lifecycle_retry_queue(settings.fanout.lifecycle_retry_queue_size);
        engine = engine.with_retry_queue(retry_tx);

        let task = LifecycleRetryTask::new(
            registry.clone(),
            retry_rx,
            BackoffConfig::from(&settings.fanout),
            settings.fanout.lifecycle_retry_attempts,
            shutdown_tx.subscribe(),
        );
        Some(tokio::spawn(task.run()))
    } else {
        None
    };

    let engine = Arc::new(engine);

    // Periodic weather broadcast
    let broadcast_handle = if settings.weather.enabled {
        let source = Arc::new(OpenMeteoSource::new(&settings.weather)?);
        let task = BroadcastTask::new(
            engine.clone(),
            source,
            Duration::from_secs(settings.weather.interval_seconds.max(1)),
            shutdown_tx.subscribe(),
        );
        Some(tokio::spawn(task.run()))
    } else {
        tracing::info!("Weather broadcast disabled, only manual broadcasts will run");
        None
    };

    let shutdown = GracefulShutdown::new(hub.clone(), engine.clone(), shutdown_tx.clone());

    let state = AppState::new(settings.clone(), hub, engine, redis_pool);
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.execute("server shutting down").await;
        })
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    for handle in [retry_handle, broadcast_handle].into_iter().flatten() {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Build the Redis pool. Failures fall back to the memory registry.
async fn connect_redis(settings: &Settings) -> Option<Arc<RedisPool>> {
    let pool = match RedisPool::from_config(&settings.redis) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!(error = %e, "Invalid Redis configuration");
            return None;
        }
    };

    // Not fatal: the circuit breaker covers an unreachable Redis at runtime
    match pool.ping().await {
        Ok(()) => tracing::info!(url = %pool.url(), "Connected to Redis"),
        Err(e) => tracing::warn!(url = %pool.url(), error = %e, "Redis not reachable at startup"),
    }

    Some(pool)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
