use axum::extract::FromRef;

use crate::{
    config::Config, database::Database, errors::AppError, mailing::Mailer, sessions::Sessions,
};

#[derive(Clone, FromRef, Debug)]
pub struct AppState {
    config: Config,
    database: Database,
    sessions: Sessions,
    mailer: Mailer,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        Ok(Self {
            database: Database::new(&config.database_url)?,
            sessions: Sessions::new(&config.sessions_db)?,
            mailer: Mailer::new(&config)?,
            config,
        })
    }

    /// Builds the state and brings both databases up to date.
    pub async fn setup(config: Config) -> Result<Self, AppError> {
        let state = Self::new(config)?;
        state.database.run_migrations().await?;
        state.sessions.run_migrations().await?;
        Ok(state)
    }

    /// In-memory databases and an outbox mailer.
    pub async fn stub() -> Result<Self, AppError> {
        Self::setup(Config::stub()).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }
}
