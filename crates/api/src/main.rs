//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use fulfillment::{
    CatalogLookup, DiscordNotifier, FulfillmentCoordinator, InMemoryPaymentProvider,
    MercadoPagoClient, NoopCache, NoopNotifier, Notifier, PaymentProvider, TtlCache,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use storage::{InMemoryStorage, PostgresStorage, Storage};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn build_coordinator<S: Storage>(
    storage: S,
    config: &Config,
) -> Result<FulfillmentCoordinator<S>, BoxError> {
    let lookup = if config.cache_ttl_secs == 0 {
        CatalogLookup::new(
            storage,
            Arc::new(NoopCache),
            Arc::new(NoopCache),
            config.cache_ttl(),
        )
    } else {
        CatalogLookup::new(
            storage,
            Arc::new(TtlCache::new()),
            Arc::new(TtlCache::new()),
            config.cache_ttl(),
        )
    };

    let provider: Arc<dyn PaymentProvider> = match &config.mercado_pago_access_token {
        Some(token) => Arc::new(MercadoPagoClient::new(
            token.clone(),
            config.mercado_pago_base_url.clone(),
        )?),
        None => {
            tracing::warn!("MERCADO_PAGO_ACCESS_TOKEN not set, using in-memory payment provider");
            Arc::new(InMemoryPaymentProvider::new())
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.discord_webhook_url {
        Some(url) => Arc::new(DiscordNotifier::new(url.clone())?),
        None => Arc::new(NoopNotifier),
    };

    Ok(FulfillmentCoordinator::new(
        lookup,
        provider,
        notifier,
        config.coordinator_config(),
    ))
}

async fn serve<S: Storage>(
    storage: S,
    config: Config,
    metrics_handle: PrometheusHandle,
    seed_demo: bool,
) -> Result<(), BoxError> {
    let coordinator = build_coordinator(storage, &config)?;
    if seed_demo {
        api::demo::seed_demo_catalog(&coordinator).await?;
    }

    // Background expiry sweep, stopped after the server drains.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(
        coordinator
            .sweeper()
            .run(config.sweep_interval(), shutdown_rx),
    );

    let app = api::create_app(api::AppState::new(coordinator), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, policy = ?config.fulfillment_policy, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = sweeper.await {
        tracing::error!(error = %err, "expiry sweeper task failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick storage and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            let storage = PostgresStorage::new(pool);
            storage.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");
            serve(storage, config, metrics_handle, false).await?;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage with a demo catalog");
            serve(InMemoryStorage::new(), config, metrics_handle, true).await?;
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
