use std::{ops::Deref, str::FromStr};

use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};

use crate::{errors::AppError, log_and_wrap_custom_internal};

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Database {
    pub fn new(url: &str) -> Result<Self, AppError> {
        Ok(Self(connect_lazy(url)?))
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        run_migrations(&self.0, "./migrations/principal").await
    }

    pub async fn start_transaction(&self) -> Result<Transaction<'_, Sqlite>, AppError> {
        self.begin()
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }
}

/// Opens a lazy pool. In-memory databases live as long as their connection,
/// so they get exactly one that is never recycled.
pub(crate) fn connect_lazy(url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| log_and_wrap_custom_internal!(e))?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
    };

    Ok(pool.connect_lazy_with(options))
}

pub(crate) async fn run_migrations(pool: &SqlitePool, path: &str) -> Result<(), AppError> {
    Migrator::new(std::path::Path::new(path))
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))?
        .run(pool)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
}
