use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Inbound delivery de-duplication is off without it.
    pub redis_url: Option<String>,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,

    // Messaging
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_whatsapp_number: String,
    /// Public URL Twilio posts to. Request signatures are only checked when set.
    pub twilio_webhook_url: Option<String>,

    // Remote scoring
    pub cv_analysis_api_url: String,
    pub cv_analysis_api_key: Option<String>,
    pub cv_analysis_timeout_secs: u64,

    // Payments
    pub payment_provider: String,
    pub paystack_secret_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    /// Minor currency units.
    pub advanced_review_price: u64,
    pub payment_currency: String,
    pub payment_success_url: String,
    pub payment_cancel_url: String,

    // Email
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: String,
    pub email_from_name: String,

    // Review pipeline
    pub report_link_ttl_secs: u64,
    pub step_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_region: env_or("S3_REGION", "us-east-1"),
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),

            twilio_account_sid: require_env("TWILIO_ACCOUNT_SID")?,
            twilio_auth_token: require_env("TWILIO_AUTH_TOKEN")?,
            twilio_whatsapp_number: require_env("TWILIO_WHATSAPP_NUMBER")?,
            twilio_webhook_url: optional_env("TWILIO_WEBHOOK_URL"),

            cv_analysis_api_url: env_or("CV_ANALYSIS_API_URL", "https://api.cvanalyzer.com/analyze"),
            cv_analysis_api_key: optional_env("CV_ANALYSIS_API_KEY"),
            cv_analysis_timeout_secs: parse_env("CV_ANALYSIS_TIMEOUT_SECS", 30)?,

            payment_provider: env_or("PAYMENT_PROVIDER", "paystack").to_ascii_lowercase(),
            paystack_secret_key: optional_env("PAYSTACK_SECRET_KEY"),
            stripe_secret_key: optional_env("STRIPE_SECRET_KEY"),
            stripe_price_id: optional_env("STRIPE_PRICE_ID"),
            stripe_webhook_secret: optional_env("STRIPE_WEBHOOK_SECRET"),
            advanced_review_price: parse_env("ADVANCED_REVIEW_PRICE", 5000)?,
            payment_currency: env_or("PAYMENT_CURRENCY", "NGN"),
            payment_success_url: env_or("PAYMENT_SUCCESS_URL", "https://example.com/success"),
            payment_cancel_url: env_or("PAYMENT_CANCEL_URL", "https://example.com/cancel"),

            smtp_host: optional_env("SMTP_HOST"),
            smtp_port: parse_env("SMTP_PORT", 587)?,
            smtp_username: optional_env("SMTP_USERNAME"),
            smtp_password: optional_env("SMTP_PASSWORD"),
            email_from: env_or("EMAIL_FROM", "reviews@cvreview.app"),
            email_from_name: env_or("EMAIL_FROM_NAME", "CV Review"),

            report_link_ttl_secs: parse_env("REPORT_LINK_TTL_SECS", 7 * 24 * 60 * 60)?,
            step_timeout_secs: parse_env("STEP_TIMEOUT_SECS", 60)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank both count as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
