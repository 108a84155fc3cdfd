use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clinica_delivery::{EmailConfig, SmtpMailer, VapidConfig, WebPushSender};
use clinica_worker::config::WorkerConfig;
use clinica_worker::dispatcher::{Channels, Courier, Dispatcher};
use clinica_worker::evaluator::Evaluator;
use clinica_worker::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on waiting for the loops after shutdown is requested. Covers
/// one in-flight SMTP send.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(45);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clinica_worker=debug,clinica_db=info,sqlx=warn".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        timezone = %config.timezone,
        daily_hour = config.daily_hour,
        fine_tick_secs = config.fine_tick.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = clinica_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    clinica_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    clinica_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // --- Delivery channels ---
    let mut channels = Channels::default();

    match VapidConfig::from_env().context("Invalid VAPID configuration")? {
        Some(vapid) => {
            let sender = WebPushSender::new(vapid).context("Failed to build push client")?;
            tracing::info!(public_key = %sender.public_key(), "Web Push enabled");
            channels.push = Some(Arc::new(sender));
        }
        None => tracing::warn!("VAPID_PRIVATE_KEY not set, push delivery disabled"),
    }

    match EmailConfig::from_env() {
        Some(email) => {
            let mailer = SmtpMailer::new(&email).context("Failed to build SMTP transport")?;
            tracing::info!(host = %email.smtp_host, port = email.smtp_port, "SMTP enabled");
            channels.email = Some(Arc::new(mailer));
        }
        None => tracing::warn!("SMTP_HOST not set, email delivery disabled"),
    }

    // --- Engine ---
    let evaluator = Evaluator::new(pool.clone(), config.timezone);
    let dispatcher = Dispatcher::new(
        pool.clone(),
        Courier::new(channels, config.push_click_url.clone()),
    );
    let scheduler = Scheduler::new(evaluator, dispatcher, config);

    let cancel = CancellationToken::new();
    let handles = scheduler.spawn(&cancel);
    tracing::info!("Notification worker started");

    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Worker tasks did not stop within the drain timeout");
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
