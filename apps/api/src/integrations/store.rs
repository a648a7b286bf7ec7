//! Durable records: conversation sessions, user profiles, and the append-only
//! review archive. One Postgres-backed `PgStore` implements all three seams.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::ReviewError;
use crate::models::review::ReviewResult;
use crate::models::session::{Session, SessionRow};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, identity: &str) -> Result<Option<Session>, ReviewError>;
    /// Last writer wins.
    async fn upsert(&self, session: &Session) -> Result<(), ReviewError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn save_email(&self, identity: &str, email: &str) -> Result<(), ReviewError>;
    async fn email_for(&self, identity: &str) -> Result<Option<String>, ReviewError>;
}

/// Write-only from the conversation's side. Deletion belongs to the retention sweep.
#[async_trait]
pub trait ReviewArchive: Send + Sync {
    async fn append(&self, identity: &str, review: &ReviewResult) -> Result<String, ReviewError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn get(&self, identity: &str) -> Result<Option<Session>, ReviewError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT identity, state, review_type, cv_file_ref, payment_status,
                   payment_reference, payment_amount, payment_currency, payment_date,
                   email, email_requested, created_at, updated_at
            FROM user_sessions
            WHERE identity = $1
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn upsert(&self, session: &Session) -> Result<(), ReviewError> {
        sqlx::query(
            r#"
            INSERT INTO user_sessions
                (identity, state, review_type, cv_file_ref, payment_status,
                 payment_reference, payment_amount, payment_currency, payment_date,
                 email, email_requested, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (identity) DO UPDATE SET
                state = EXCLUDED.state,
                review_type = EXCLUDED.review_type,
                cv_file_ref = EXCLUDED.cv_file_ref,
                payment_status = EXCLUDED.payment_status,
                payment_reference = EXCLUDED.payment_reference,
                payment_amount = EXCLUDED.payment_amount,
                payment_currency = EXCLUDED.payment_currency,
                payment_date = EXCLUDED.payment_date,
                email = EXCLUDED.email,
                email_requested = EXCLUDED.email_requested,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&session.identity)
        .bind(session.state.as_str())
        .bind(session.review_type.as_str())
        .bind(&session.cv_file_ref)
        .bind(session.payment_status.as_str())
        .bind(&session.payment_reference)
        .bind(session.payment_amount)
        .bind(&session.payment_currency)
        .bind(session.payment_date)
        .bind(&session.email)
        .bind(session.email_requested)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn save_email(&self, identity: &str, email: &str) -> Result<(), ReviewError> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (identity, email, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (identity) DO UPDATE SET email = EXCLUDED.email, updated_at = NOW()
            "#,
        )
        .bind(identity)
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn email_for(&self, identity: &str) -> Result<Option<String>, ReviewError> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM user_profiles WHERE identity = $1")
                .bind(identity)
                .fetch_optional(&self.pool)
                .await?;
        Ok(email.flatten())
    }
}

#[async_trait]
impl ReviewArchive for PgStore {
    async fn append(&self, identity: &str, review: &ReviewResult) -> Result<String, ReviewError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO review_results
                (id, identity, review_type, cv_file_name, improvement_score, insights,
                 detected_sections, metrics, provider, report_ref, email_sent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(id)
        .bind(identity)
        .bind(review.review_type.as_str())
        .bind(&review.cv_file_name)
        .bind(i16::from(review.improvement_score))
        .bind(Json(&review.insights))
        .bind(Json(&review.detected_sections))
        .bind(Json(&review.metrics))
        .bind(review.provider.as_str())
        .bind(&review.report_ref)
        .bind(review.email_sent)
        .bind(review.timestamp)
        .execute(&self.pool)
        .await?;

        info!("Archived review {id} for {identity}");
        Ok(id.to_string())
    }
}
