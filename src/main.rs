use actix::prelude::*;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod clients;
mod config;
mod cqrs;
mod domain;
mod errors;
mod messaging;
mod metrics;
mod store;
mod utils;

#[cfg(test)]
mod testing;

use actors::{BackgroundWork, CoordinatorActor, EventRouter, ExpirationListener, HealthMonitorActor, Shutdown};
use api::ApiState;
use clients::{
    build_http_client, HttpProductCatalog, HttpShippingCostClient, HttpTokenVerifier, HttpWarehouseClient,
    ProductCatalog, ServiceClient,
};
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use domain::order::{CommandDependencies, OrderCommandHandler, OrderQueryHandler, OrderSettings, CONSUMED_TOPICS};
use messaging::KafkaPublisher;
use store::{PgOrderCommandStore, PgOrderViewStore, RedisOrderExpiryStore};

const PRODUCER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal outside local development.
    let _ = dotenvy::dotenv();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load(&config_path)?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())))
        .init();

    tracing::info!(
        name = %config.app.name,
        version = %config.app.version,
        config = %config_path,
        "🚀 Starting order service"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let metrics_server = metrics::start_metrics_server(metrics.registry().clone(), config.metrics.port)
        .context("starting metrics server")?;
    let metrics_handle = metrics_server.handle();
    actix_web::rt::spawn(async move {
        if let Err(e) = metrics_server.await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 2. Stores ===
    let command_pool = store::postgres::connect(&config.postgres_command, "postgres_command").await?;
    let query_pool = store::postgres::connect(&config.postgres_query, "postgres_query").await?;
    if config.run_migrations {
        store::postgres::migrate_command(&command_pool).await?;
        store::postgres::migrate_query(&query_pool).await?;
    }

    let expiry = Arc::new(RedisOrderExpiryStore::connect(&config.redis).await?);

    // === 3. Broker producer ===
    let producer = Arc::new(KafkaPublisher::new(&config.kafka, metrics.clone())?);

    // === 4. Outbound service clients ===
    let http = build_http_client(config.services.timeout())?;
    let service = |name: &'static str, url: &str| ServiceClient::new(name, url, http.clone(), metrics.clone());

    let catalog: Arc<dyn ProductCatalog> =
        Arc::new(HttpProductCatalog::new(service("product", &config.services.product_url)));
    let verifier = Arc::new(HttpTokenVerifier::new(service("auth", &config.services.auth_url)));
    let warehouse = Arc::new(HttpWarehouseClient::new(service("warehouse", &config.services.warehouse_url)));
    let shipping = Arc::new(HttpShippingCostClient::new(service("shipping", &config.services.shipping_url)));

    // === 5. Use cases ===
    let commands = Arc::new(OrderCommandHandler::new(
        CommandDependencies {
            store: Arc::new(PgOrderCommandStore::new(command_pool.clone())),
            expiry: expiry.clone(),
            publisher: producer.clone(),
            warehouse,
            shipping,
            catalog: catalog.clone(),
        },
        OrderSettings {
            validity: config.order.validity(),
            verify_client_price: config.order.verify_client_price,
        },
        metrics.clone(),
    ));
    let queries = Arc::new(OrderQueryHandler::new(Arc::new(PgOrderViewStore::new(query_pool.clone()))));

    // === 6. Background side: consumer + expiration loops under the coordinator ===
    let consumer = messaging::subscribe(&config.kafka, &CONSUMED_TOPICS).await?;
    let router = Arc::new(EventRouter::new(
        commands.clone(),
        queries.clone(),
        catalog,
        config.services.product_token.clone(),
    ));
    let expiration = ExpirationListener::new(
        commands.clone(),
        expiry,
        metrics.clone(),
        config.order.expiry_sweep_interval(),
    );

    let health_monitor = HealthMonitorActor::new(Some(producer.clone())).start();
    let coordinator = CoordinatorActor::new(
        query_pool.clone(),
        metrics.clone(),
        health_monitor.clone(),
        BackgroundWork {
            source: Box::new(consumer),
            handler: router,
            expiration,
            poll_timeout: config.kafka.poll_timeout(),
        },
    )
    .start();

    // === 7. HTTP server ===
    let state = web::Data::new(ApiState {
        commands,
        queries,
        verifier,
    });
    let health = web::Data::new(health_monitor);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .app_data(health.clone())
            .configure(api::configure)
    })
    .disable_signals()
    .shutdown_timeout(config.http.shutdown_grace_secs)
    .bind(("0.0.0.0", config.http.port))
    .with_context(|| format!("binding HTTP port {}", config.http.port))?
    .run();

    let server_handle = server.handle();
    let mut server_task = actix_web::rt::spawn(server);
    tracing::info!(port = config.http.port, "🌐 HTTP server listening");

    // === 8. Run until a signal or the server stops on its own ===
    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server_task => {
            tracing::error!(?result, "HTTP server exited unexpectedly");
        }
    }

    tracing::info!("🛑 Shutting down");
    server_handle.stop(true).await;

    if let Err(e) = coordinator.send(Shutdown).await {
        tracing::error!("Coordinator unreachable during shutdown: {}", e);
    }

    if let Err(e) = producer.flush(PRODUCER_FLUSH_TIMEOUT) {
        tracing::warn!("Producer flush incomplete: {}", e);
    }

    metrics_handle.stop(true).await;
    command_pool.close().await;
    query_pool.close().await;

    tracing::info!("👋 Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C signal, shutting down gracefully..."),
        _ = terminate => tracing::info!("Received SIGTERM signal, shutting down gracefully..."),
    }
}
