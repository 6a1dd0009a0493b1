use std::sync::Arc;

use lettre::{
    transport::smtp::{authentication::Credentials, client::Tls},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::Mutex;

use crate::{
    config::{Config, Env},
    errors::AppError,
    log_and_wrap_custom_internal,
};

#[derive(Clone, Debug)]
pub enum Mailer {
    Smtp(Arc<AsyncSmtpTransport<Tokio1Executor>>),
    /// Keeps every message in memory instead of sending it.
    Outbox(Arc<Mutex<Vec<String>>>),
}

impl Mailer {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        match config.env {
            Env::Test => Ok(Self::outbox()),
            Env::Development => Ok(Self::local()),
            Env::Production => {
                let creds =
                    Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

                let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_relay)
                    .map_err(|e| log_and_wrap_custom_internal!(e))?
                    .credentials(creds)
                    .build();
                Ok(Self::Smtp(Arc::new(mailer)))
            }
        }
    }

    /// Plain SMTP on localhost:1025, the usual mail catcher setup.
    pub fn local() -> Self {
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("127.0.0.1")
            .port(1025)
            .tls(Tls::None)
            .build();
        Self::Smtp(Arc::new(mailer))
    }

    pub fn outbox() -> Self {
        Self::Outbox(Arc::default())
    }

    pub async fn send(&self, message: &Message) -> Result<(), AppError> {
        match self {
            Self::Smtp(transport) => {
                let raw = message.formatted();
                let envelope = message.envelope();
                transport
                    .send_raw(envelope, &raw)
                    .await
                    .map_err(|e| log_and_wrap_custom_internal!(e))?;
            }
            Self::Outbox(outbox) => {
                let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
                outbox.lock().await.push(raw);
            }
        }
        tracing::info!(to = ?message.envelope().to(), "email sent");
        Ok(())
    }

    /// Messages collected so far, empty for real transports.
    pub async fn sent(&self) -> Vec<String> {
        match self {
            Self::Smtp(_) => Vec::new(),
            Self::Outbox(outbox) => outbox.lock().await.clone(),
        }
    }
}
