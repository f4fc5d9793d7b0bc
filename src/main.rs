use std::net::SocketAddr;

use anyhow::Context;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use integrity_ledger::config::AppConfig;
use integrity_ledger::database::Database;
use integrity_ledger::server::{self, AppState};
use integrity_ledger::{AuditLedger, LedgerError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "integrity_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting integrity ledger");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let database = Database::new(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    let ledger = AuditLedger::open(database, &config).await?;

    if config.guard.verify_on_startup {
        match ledger.ensure_intact().await {
            Ok(count) => info!("Startup integrity check passed ({} entries)", count),
            Err(LedgerError::IntegrityViolation { at_sequence, kind }) => error!(
                "Startup integrity check failed at sequence {} ({}), serving read-only",
                at_sequence, kind
            ),
            Err(e) => error!(
                "Startup integrity check could not complete, serving read-only: {}",
                e
            ),
        }
    }

    // Periodic integrity checks; without a startup check the first one
    // runs immediately since the system stays locked until then
    if config.guard.check_interval_secs > 0 {
        let checker = ledger.clone();
        let period = Duration::from_secs(config.guard.check_interval_secs);
        let checked_at_startup = config.guard.verify_on_startup;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            if checked_at_startup {
                interval.tick().await;
            }
            loop {
                interval.tick().await;
                if let Err(e) = checker.run_check().await {
                    error!("Scheduled integrity check failed: {}", e);
                }
            }
        });
        info!(
            "Integrity checks scheduled every {}s",
            config.guard.check_interval_secs
        );
    }

    // Automatic anchoring
    if config.anchor.auto_anchor_interval_secs > 0 {
        let anchorer = ledger.clone();
        let operator = config.anchor.operator.clone();
        let period = Duration::from_secs(config.anchor.auto_anchor_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match anchorer.publish_anchor(&operator).await {
                    Ok(report) => info!(
                        "Automatic anchor {}: {}/{} witness(es) succeeded",
                        report.anchor_id,
                        report.succeeded(),
                        report.witnesses.len()
                    ),
                    Err(LedgerError::EmptyChain) => info!("Nothing to anchor yet"),
                    Err(e) => error!("Automatic anchoring failed: {}", e),
                }
            }
        });
        info!(
            "Automatic anchoring every {}s",
            config.anchor.auto_anchor_interval_secs
        );
    }

    let app = server::router(AppState::new(ledger, config.guard.allow_paths.clone()));

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
