use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use outbox_relay::actors::RelaySupervisor;
use outbox_relay::config::Args;
use outbox_relay::messaging::{BrokerClient, UserEventListener};
use outbox_relay::metrics::{self, Metrics};
use outbox_relay::notification::NotificationService;
use outbox_relay::outbox::{OutboxRelay, OutboxTable};
use outbox_relay::sink::{EmailSink, EventSink, HttpMailTransport, LogMailTransport, MailTransport};
use outbox_relay::storage::PgDatabase;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,outbox_relay=debug")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("🚀 Starting outbox relay");

    // === 1. Database ===
    tracing::info!("Connecting to PostgreSQL...");
    let db = PgDatabase::connect(&args.database_url, args.database_max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    db.migrate().await.context("failed to prepare schema")?;

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);

    // === 3. Sinks ===
    let broker = Arc::new(BrokerClient::new(&args.brokers)?);
    let event_sink = EventSink::new(broker.clone(), args.user_events_topic.clone());

    let transport: Arc<dyn MailTransport> = match &args.mail_endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Using HTTP mail transport");
            Arc::new(HttpMailTransport::new(endpoint.clone(), args.mail_timeout())?)
        }
        None => {
            tracing::warn!("No mail endpoint configured, emails will be logged only");
            Arc::new(LogMailTransport)
        }
    };
    let email_sink = EmailSink::new(transport, args.mail_timeout());

    // === 4. Relays under supervision ===
    let event_relay = OutboxRelay::new(
        OutboxTable::UserEvents,
        Arc::new(db.outbox_store(OutboxTable::UserEvents)),
        Arc::new(event_sink),
        args.event_relay_config(),
    )
    .with_metrics(metrics.clone());

    let email_relay = OutboxRelay::new(
        OutboxTable::Email,
        Arc::new(db.outbox_store(OutboxTable::Email)),
        Arc::new(email_sink),
        args.email_relay_config(),
    )
    .with_metrics(metrics.clone());

    let supervisor = RelaySupervisor::start(
        vec![event_relay, email_relay],
        Some(broker.clone()),
        Some(metrics.clone()),
    );

    // Start metrics HTTP server in background thread
    let server_metrics = metrics.clone();
    let health_monitor = supervisor.health_monitor();
    let metrics_port = args.metrics_port;
    std::thread::spawn(move || {
        let result = actix_web::rt::System::new().block_on(metrics::start_metrics_server(
            server_metrics,
            health_monitor,
            metrics_port,
        ));
        if let Err(e) = result {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 5. User event listener (email producer) ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let notifications = Arc::new(NotificationService::new(db.clone()));
    let listener = UserEventListener::new(
        &args.brokers,
        &args.consumer_group,
        &args.user_events_topic,
        notifications,
    )?;
    let listener_task = tokio::spawn(listener.run(shutdown_rx));

    tracing::info!("✅ Outbox relay running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    // === 6. Graceful shutdown ===
    tracing::info!("🛑 Shutdown requested");
    let _ = shutdown_tx.send(true);
    if let Err(e) = listener_task.await {
        tracing::error!(error = %e, "Listener task failed");
    }
    supervisor.shutdown().await;

    tracing::info!("👋 Outbox relay stopped");
    Ok(())
}
