//! Generic row inserts into Postgres.
//!
//! A failed connection at startup or a failed insert is logged and swallowed;
//! the crawl keeps writing to the snapshot file either way.

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, error, info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::models::{FieldMap, FieldValue};

/// Sink for extracted rows.
///
/// Implementations never report failure to the caller; they log it.
pub trait Persistence {
    /// Insert `fields` as one row of `table_name`.
    async fn insert(&self, table_name: &str, fields: FieldMap);
}

/// Postgres-backed [`Persistence`].
///
/// Holds a pool so concurrent inserts each check out their own connection.
/// When the initial connection failed the pool is absent and every insert is
/// a logged no-op.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Option<PgPool>,
}

impl Database {
    /// Connect using `config`. Never fails; see [`Database::is_connected`].
    #[instrument(level = "info", skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> Self {
        let Some(url) = config.url.as_deref() else {
            warn!("No database URL configured; articles will only be written to the snapshot");
            return Self::disconnected();
        };

        match PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
        {
            Ok(pool) => {
                info!(max_connections = config.max_connections, "Database connection successful");
                Self { pool: Some(pool) }
            }
            Err(e) => {
                error!(error = %e, "Error connecting to database; inserts are disabled for this run");
                Self::disconnected()
            }
        }
    }

    pub fn disconnected() -> Self {
        Self { pool: None }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("Database connection closed");
        }
    }
}

impl Persistence for Database {
    #[instrument(level = "debug", skip_all, fields(table = %table_name))]
    async fn insert(&self, table_name: &str, fields: FieldMap) {
        let Some(pool) = &self.pool else {
            error!("No database connection. Insert failed.");
            return;
        };
        if fields.is_empty() {
            warn!("Refusing to insert a row with no columns");
            return;
        }

        let mut tx = match pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "Could not start insert transaction");
                return;
            }
        };

        debug!(columns = fields.len(), "Inserting row");
        let mut query = build_insert(table_name, &fields);
        match query.build().execute(&mut *tx).await {
            Ok(_) => match tx.commit().await {
                Ok(()) => info!("Data inserted successfully into {table_name}"),
                Err(e) => error!(error = %e, "Error committing insert"),
            },
            Err(e) => {
                error!(error = %e, "Error inserting data");
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Rollback failed");
                }
            }
        }
    }
}

/// Build `INSERT INTO "table" ("col", ...) VALUES ($1, ...)`.
///
/// Timestamps bind as `timestamptz`, which Postgres assigns to `timestamp`
/// and text columns as well. `Null` is written as a literal so it fits any
/// column type.
pub fn build_insert(table_name: &str, fields: &FieldMap) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("INSERT INTO {} (", quote_ident(table_name)));

    {
        let mut columns = query.separated(", ");
        for (column, _) in fields.iter() {
            columns.push(quote_ident(column));
        }
    }
    query.push(") VALUES (");
    {
        let mut values = query.separated(", ");
        for (_, value) in fields.iter() {
            match value {
                FieldValue::Text(s) => {
                    values.push_bind(s.clone());
                }
                FieldValue::Integer(n) => {
                    values.push_bind(*n);
                }
                FieldValue::Uuid(id) => {
                    values.push_bind(*id);
                }
                FieldValue::Timestamp(ts) => {
                    values.push_bind(*ts);
                }
                FieldValue::Null => {
                    values.push("NULL");
                }
            }
        }
    }
    query.push(")");
    query
}

/// Quote an identifier for Postgres, doubling embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// In-memory [`Persistence`] used by tests across the crate.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub rows: std::sync::Mutex<Vec<(String, FieldMap)>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn rows(&self) -> Vec<(String, FieldMap)> {
        self.rows.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Persistence for MemoryStore {
    async fn insert(&self, table_name: &str, fields: FieldMap) {
        self.rows
            .lock()
            .unwrap()
            .push((table_name.to_string(), fields));
    }
}
