mod config;

use anyhow::Result;
use config::WorkerConfig;
use geotrack_core::{
    AlertPublisher, CancellationToken, ConsumerOptions, DeadLetterArchiver, Dispatcher,
    EventLogConsumer, LocationConsumer, TaskPool, TransitionService,
};
use geotrack_nats::NatsAlertBroker;
use geotrack_postgres::PgStore;
use geotrack_redis::RedisQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match WorkerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!(error = %format!("{e:#}"), "Worker failed");
        std::process::exit(1);
    }
}

fn init_tracing(config: &WorkerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: WorkerConfig) -> Result<()> {
    info!(
        redis_url = %config.redis_url,
        alerts_enabled = config.nats_url.is_some(),
        "Starting geotrack worker"
    );

    let store = Arc::new(PgStore::connect(&config.database_url, config.database_max_connections).await?);
    let queue = Arc::new(RedisQueue::connect(&config.redis_url).await?);

    let dispatcher = Dispatcher::new(queue.clone(), config.queues.clone());
    let tasks = TaskPool::new(config.background_concurrency);
    let options = ConsumerOptions {
        poll_timeout: config.poll_timeout,
        error_backoff: Duration::from_secs(1),
    };

    let broker = connect_broker(&config).await;
    let mut transitions =
        TransitionService::new(store.clone(), store.clone(), dispatcher.clone(), tasks.clone());
    if let Some(broker) = broker.clone() {
        transitions =
            transitions.with_alerts(AlertPublisher::new(broker, dispatcher.clone(), &config.alert_topic));
    }

    let locations = LocationConsumer::new(
        store.clone(),
        transitions,
        dispatcher.clone(),
        tasks.clone(),
        options,
    );
    let event_log = EventLogConsumer::new(store.clone(), dispatcher.clone(), options);
    let archiver = DeadLetterArchiver::new(queue.clone(), &config.queues, options);

    let shutdown = CancellationToken::new();
    let mut loops = JoinSet::new();
    {
        let ctx = shutdown.clone();
        loops.spawn(async move { locations.run(ctx).await });
    }
    {
        let ctx = shutdown.clone();
        loops.spawn(async move { event_log.run(ctx).await });
    }
    {
        let ctx = shutdown.clone();
        loops.spawn(async move { archiver.run(ctx).await });
    }

    info!("Worker started, waiting for shutdown signal");
    wait_for_signal().await;
    info!("Shutdown signal received, stopping consumers");
    shutdown.cancel();

    while let Some(joined) = loops.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Consumer loop failed"),
            Err(e) => error!(error = %e, "Consumer loop panicked"),
        }
    }

    if !tasks.shutdown(config.shutdown_timeout).await {
        warn!("Abandoning unfinished background tasks");
    }
    let stats = tasks.stats();
    info!(
        submitted = stats.submitted,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Background tasks drained"
    );

    if let Some(broker) = broker {
        if let Err(e) = broker.close().await {
            warn!(error = %e, "Failed to close NATS connection cleanly");
        }
    }
    store.close().await;

    info!("Worker stopped");
    Ok(())
}

/// Alerts are optional: without a reachable broker the pipeline still
/// persists and audits transitions.
async fn connect_broker(config: &WorkerConfig) -> Option<Arc<NatsAlertBroker>> {
    let url = config.nats_url.as_deref()?;

    match NatsAlertBroker::connect(
        url,
        config.nats_connect_timeout,
        &config.alert_stream,
        &config.alert_topic,
    )
    .await
    {
        Ok(broker) => Some(Arc::new(broker)),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Alert broker unavailable, continuing without alerts");
            None
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
