//! PostgreSQL-backed identity registry.
//!
//! The forum stores the platform ids a user attached to their profile in the
//! `user_custom_fields` table, one or more ids per row. The query runs in a
//! read-only transaction with a server-side statement timeout, and the whole
//! round trip is additionally bounded on the client side. The transaction is
//! always rolled back.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::debug;

use bouncer_types::config::RegistryConfig;
use bouncer_types::errors::BouncerError;
use bouncer_types::traits::IdentityRegistry;
use bouncer_types::VerifiedIdentitySnapshot;

/// SQLSTATE raised by PostgreSQL when `statement_timeout` cancels a query.
const SQLSTATE_QUERY_CANCELED: &str = "57014";

/// Connections kept by the pool. One query runs per cycle.
const MAX_CONNECTIONS: u32 = 2;

const QUERY_VERIFIED_IDS: &str = "\
/* bouncer: verified identity snapshot */ \
SELECT user_custom_fields.value \
FROM user_custom_fields \
WHERE user_custom_fields.name = $1";

/// Identity registry reading the forum's custom user fields.
pub struct PgIdentityRegistry {
    pool: PgPool,
    field_name: String,
    timeout: Duration,
}

impl PgIdentityRegistry {
    /// Create a registry for the given database URL.
    ///
    /// Connections are opened lazily, so an unreachable database surfaces as a
    /// registry error on the first cycle rather than at startup.
    pub fn new(config: &RegistryConfig) -> Result<Self, BouncerError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(config.timeout())
            .connect_lazy(&config.database_url)
            .map_err(|e| BouncerError::Config(format!("invalid registry.database_url: {e}")))?;
        Ok(Self::from_pool(
            pool,
            config.field_name.clone(),
            config.timeout(),
        ))
    }

    /// Create a registry from an existing connection pool.
    pub fn from_pool(pool: PgPool, field_name: String, timeout: Duration) -> Self {
        Self {
            pool,
            field_name,
            timeout,
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Run the snapshot query inside a read-only transaction.
    async fn query_field_values(&self) -> Result<Vec<Option<String>>, BouncerError> {
        let timeout_ms = self.timeout_ms();
        let map_err = |e: sqlx::Error| map_sqlx_error(e, timeout_ms);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        // SET does not take bind parameters; the value is an integer.
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        let values = sqlx::query_scalar::<_, Option<String>>(QUERY_VERIFIED_IDS)
            .bind(&self.field_name)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_err)?;

        tx.rollback().await.map_err(map_err)?;
        Ok(values)
    }
}

#[async_trait]
impl IdentityRegistry for PgIdentityRegistry {
    async fn list_verified_identities(&self) -> Result<VerifiedIdentitySnapshot, BouncerError> {
        let values = tokio::time::timeout(self.timeout, self.query_field_values())
            .await
            .map_err(|_| BouncerError::RegistryTimeout(self.timeout_ms()))??;

        let snapshot =
            VerifiedIdentitySnapshot::from_field_values(values.iter().flatten().map(String::as_str));
        debug!(
            rows = values.len(),
            identities = snapshot.len(),
            "loaded verified identities"
        );
        Ok(snapshot)
    }
}

// ============================================================
// Helpers
// ============================================================

/// Whether a SQLSTATE code means the statement timeout fired.
fn is_statement_timeout(code: Option<&str>) -> bool {
    code == Some(SQLSTATE_QUERY_CANCELED)
}

/// Classify a sqlx error as a registry timeout or a generic registry error.
fn map_sqlx_error(err: sqlx::Error, timeout_ms: u64) -> BouncerError {
    match &err {
        sqlx::Error::PoolTimedOut => BouncerError::RegistryTimeout(timeout_ms),
        sqlx::Error::Database(db) if is_statement_timeout(db.code().as_deref()) => {
            BouncerError::RegistryTimeout(timeout_ms)
        }
        _ => BouncerError::Registry(err.to_string()),
    }
}

// ============================================================
// Tests
// ============================================================
