//! Product service entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat, StoreBackend};
use catalog_store::{CatalogStore, InMemoryCatalogStore, PostgresCatalogStore};
use messaging::{AmqpBroker, Dispatcher, EventPublisher, Listener, NoopPublisher};
use metrics_exporter_prometheus::PrometheusHandle;
use replica::ReplicaOptions;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open the catalog store and run the service on it
    match config.store {
        StoreBackend::Postgres => {
            let dsn = config
                .database_dsn
                .as_deref()
                .expect("DATABASE_DSN is checked by Config");
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(dsn)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresCatalogStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("connected to PostgreSQL");
            run(config, store, metrics_handle).await;
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory catalog store, data is not persisted");
            run(config, InMemoryCatalogStore::new(), metrics_handle).await;
        }
    }
}

async fn run<S>(config: Config, store: S, metrics_handle: PrometheusHandle)
where
    S: CatalogStore + Clone + 'static,
{
    // 4. Connect to the broker and start listening for replica events
    let (broker, listener, publisher) = if config.disable_rabbitmq {
        tracing::warn!("RabbitMQ disabled, events are neither consumed nor published");
        (None, None, Arc::new(NoopPublisher) as Arc<dyn EventPublisher>)
    } else {
        let (broker, listener, publisher) = start_broker(&config, store.clone()).await;
        (Some(broker), Some(listener), publisher)
    };

    // 5. Build the application
    let state = api::create_state(store, publisher);
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let tcp = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop consuming and close the broker connection
    if let Some(listener) = listener {
        listener.abort();
    }
    if let Some(broker) = broker {
        if let Err(e) = broker.close().await {
            tracing::warn!(error = %e, "failed to close broker connection");
        }
    }

    tracing::info!("server shut down gracefully");
}

async fn start_broker<S>(
    config: &Config,
    store: S,
) -> (AmqpBroker, Listener, Arc<dyn EventPublisher>)
where
    S: CatalogStore + Clone + 'static,
{
    let broker = AmqpBroker::connect(&config.rabbit_dsn, config.events_exchange.clone())
        .await
        .expect("failed to connect to RabbitMQ");

    let options = ReplicaOptions {
        unit_of_work_timeout: config.unit_of_work_timeout,
    };
    let dispatcher = Dispatcher::new(replica::routing_table(store, &options))
        .with_failure_policy(config.failure_policy);

    let listener = broker
        .start_listening(Arc::new(dispatcher), config.dead_letter_exchange.as_deref())
        .await
        .expect("failed to start event listener");
    tracing::info!(queue = listener.queue_name(), "replica sync started");

    let publisher = broker
        .publisher()
        .await
        .expect("failed to open publisher channel");

    (broker, listener, Arc::new(publisher))
}
