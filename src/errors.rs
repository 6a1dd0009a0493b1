use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::slug::SlugError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Does not exist")]
    DoesNotExist,

    #[error("{0} is already taken")]
    AlreadyExists(&'static str),

    #[error("Wrong username or password")]
    WrongCredentials,

    #[error("This account is disabled")]
    AccountDisabled,

    #[error("Please activate your account first")]
    AccountNotActivated,

    #[error("You are not allowed to see this page")]
    Forbidden,

    #[error("This link has expired")]
    ActivationExpired,

    #[error("Could not generate the password reset code")]
    ActivationCodeMissing,

    #[error("Invalid identifier: {0}")]
    InvalidSlug(#[from] SlugError),

    #[error("Invalid input: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Error hashing the password: {0}")]
    ErrorHashingPassword(argon2::password_hash::Error),

    #[error("Wrong password")]
    WrongPassword(argon2::password_hash::Error),

    #[error("Template error: {0}")]
    TemplateError(#[from] askama::Error),

    #[error("{0}")]
    CustomInternal(String),
}

impl AppError {
    pub fn custom_internal(message: &str) -> Self {
        Self::CustomInternal(message.to_owned())
    }

    pub fn get_status_code_and_message(&self) -> (StatusCode, String) {
        let status = match self {
            Self::DoesNotExist => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::WrongCredentials | Self::WrongPassword(_) => StatusCode::UNAUTHORIZED,
            Self::AccountDisabled | Self::AccountNotActivated | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ActivationExpired => StatusCode::GONE,
            Self::InvalidSlug(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ActivationCodeMissing
            | Self::ErrorHashingPassword(_)
            | Self::TemplateError(_)
            | Self::CustomInternal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details stay in the logs.
        let message = if status.is_server_error() {
            "Sorry, something went wrong on our side".to_owned()
        } else {
            self.to_string()
        };

        (status, message)
    }
}

#[derive(Template)]
#[template(path = "error.html")]
struct ErrorTemplate<'a> {
    status: u16,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.get_status_code_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let template = ErrorTemplate {
            status: status.as_u16(),
            message: &message,
        };
        match template.render() {
            Ok(body) => (status, Html(body)).into_response(),
            Err(_) => (status, message).into_response(),
        }
    }
}

/// Logs an error and turns it into an opaque `AppError::CustomInternal`.
#[macro_export]
macro_rules! log_and_wrap_custom_internal {
    ($e:expr) => {{
        let error = $e;
        ::tracing::error!(error = %error, "internal error");
        $crate::errors::AppError::custom_internal(&error.to_string())
    }};
}
