use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use billing_engine::adapters::http::{router, AppState};
use billing_engine::adapters::postgres::{
    PostgresCheckoutIntentStore, PostgresDeadLetterQueue, PostgresEntitlementStore,
    PostgresEventLedger, PostgresTransitionLog,
};
use billing_engine::adapters::stripe::{StripeConfig, StripeProvider};
use billing_engine::application::{
    CheckoutInitiator, GetEntitlement, Maintenance, Reconciler,
};
use billing_engine::config::AppConfig;
use billing_engine::domain::billing::WebhookVerifier;
use billing_engine::domain::foundation::Timestamp;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);
const RECOVERY_BATCH_LIMIT: u32 = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    // Fails fast on a missing price id, before any traffic.
    let catalog = config.payment.plan_catalog()?;

    let pool = config.database.connect().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let ledger = Arc::new(PostgresEventLedger::new(pool.clone()));
    let entitlements = Arc::new(PostgresEntitlementStore::new(pool.clone()));
    let intents = Arc::new(PostgresCheckoutIntentStore::new(pool.clone()));
    let transitions = Arc::new(PostgresTransitionLog::new(pool.clone()));
    let dead_letters = Arc::new(PostgresDeadLetterQueue::new(pool.clone()));

    let provider = Arc::new(StripeProvider::new(StripeConfig::new(
        config.payment.secret_key.clone(),
        config.payment.success_url.clone(),
        config.payment.cancel_url.clone(),
    ))?);
    let notifier = Arc::new(billing_engine::adapters::notify::LoggingNotifier::new());

    let reconciler = Arc::new(Reconciler::new(
        WebhookVerifier::new(config.payment.webhook_secret.clone()),
        catalog.clone(),
        ledger.clone(),
        entitlements.clone(),
        intents.clone(),
        transitions,
        dead_letters.clone(),
        notifier,
    ));

    // Replay anything left unreconciled by a previous run.
    match reconciler.recover_incomplete(RECOVERY_BATCH_LIMIT).await {
        Ok(0) => {}
        Ok(count) => info!(count, "recovered unreconciled events from previous run"),
        Err(err) => error!(error = %err, "startup recovery failed"),
    }

    let maintenance = Maintenance::new(ledger, intents.clone(), config.ledger_retention_days);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(err) = maintenance.run_once(Timestamp::now()).await {
                error!(error = %err, "maintenance pass failed");
            }
        }
    });

    let state = AppState {
        reconciler,
        checkout: Arc::new(CheckoutInitiator::new(
            entitlements.clone(),
            intents,
            provider,
            catalog,
        )),
        entitlements: Arc::new(GetEntitlement::new(entitlements)),
        dead_letters,
    };

    let addr = config.server.bind_addr();
    info!(addr = %addr, "billing engine listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
