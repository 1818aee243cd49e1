// src/upstream/db.rs

//! The relational backend: session rows and single-value lookups through a
//! min/max sized Postgres pool. Every call is one parameterized statement;
//! there are no multi-statement transactions.

use crate::config::DbConfig;
use crate::core::TwiceError;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Column, Row};

/// Parameterized lookups backed by the database.
#[async_trait]
pub trait Database: Send + Sync {
    /// Fetches the session row for a session id, as `(column, value)` pairs.
    async fn session(&self, id: &str) -> Result<Option<Vec<(String, String)>>, TwiceError>;

    /// Fetches a single named value.
    async fn lookup(&self, id: &str) -> Result<Option<String>, TwiceError>;
}

/// The production `Database` implementation over sqlx.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Builds the pool without dialing. A database that is down at startup
    /// surfaces per-query errors instead of aborting the proxy.
    pub fn connect_lazy(config: &DbConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password);
        let pool = PgPoolOptions::new()
            .min_connections(config.pool_min)
            .max_connections(config.pool_max)
            .connect_lazy_with(options);
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn session(&self, id: &str) -> Result<Option<Vec<(String, String)>>, TwiceError> {
        let row = sqlx::query("SELECT * FROM users WHERE session_cookie = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| {
            row.columns()
                .iter()
                .map(|col| {
                    // Non-text columns are carried as empty strings; the
                    // template layer treats those as falsy.
                    let value = row
                        .try_get::<Option<String>, _>(col.ordinal())
                        .ok()
                        .flatten()
                        .unwrap_or_default();
                    (col.name().to_string(), value)
                })
                .collect()
        }))
    }

    async fn lookup(&self, id: &str) -> Result<Option<String>, TwiceError> {
        let row = sqlx::query("SELECT value FROM viewdb WHERE name = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|row| row.try_get::<Option<String>, _>(0).ok().flatten()))
    }
}
