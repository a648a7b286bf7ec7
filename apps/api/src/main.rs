mod analysis;
mod config;
mod conversation;
mod db;
mod document;
mod errors;
mod integrations;
mod models;
mod report;
mod routes;
mod state;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::scoring::scorer_from_config;
use crate::config::Config;
use crate::conversation::{Conversation, ConversationDeps, ReviewServices};
use crate::db::create_pool;
use crate::integrations::dedup::DeliveryDeduplicator;
use crate::integrations::mailer::SmtpMailer;
use crate::integrations::messaging::{TwilioMessenger, TwilioRequestValidator};
use crate::integrations::payments::{gateway_from_config, PaymentLinks};
use crate::integrations::storage::S3Store;
use crate::integrations::store::PgStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME").replace('-', "_"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV Review API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (sessions, profiles, review archive)
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(db));

    // Initialize Redis for inbound de-duplication (optional)
    let dedup = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            info!("Redis client initialized");
            DeliveryDeduplicator::new(Some(client))
        }
        None => {
            warn!("REDIS_URL not set; redelivered messages will be processed again");
            DeliveryDeduplicator::disabled()
        }
    };

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let objects = Arc::new(S3Store::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize messaging, scoring, email and payments
    let step_timeout = Duration::from_secs(config.step_timeout_secs);
    let messenger = Arc::new(TwilioMessenger::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_whatsapp_number.clone(),
        step_timeout,
    )?);
    let inbound_validator = match &config.twilio_webhook_url {
        Some(url) => Some(TwilioRequestValidator::new(config.twilio_auth_token.clone(), url.clone())),
        None => {
            warn!("TWILIO_WEBHOOK_URL not set; inbound webhook signatures are not checked");
            None
        }
    };
    let scorer = scorer_from_config(&config)?;
    let mailer = Arc::new(SmtpMailer::from_config(&config)?);
    let payments = Arc::new(PaymentLinks::new(
        gateway_from_config(&config)?,
        &config.payment_success_url,
        step_timeout,
    ));

    let review = ReviewServices {
        objects,
        archive: store.clone(),
        scorer,
        mailer,
        step_timeout,
        report_link_ttl: Duration::from_secs(config.report_link_ttl_secs),
    };

    let conversation = Conversation::new(ConversationDeps {
        sessions: store.clone(),
        profiles: store,
        messenger,
        payments: payments.clone(),
        review,
    });

    // Build app state
    let state = AppState {
        conversation,
        payments,
        dedup,
        inbound_validator,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "cv-review-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
