use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Router,
};
use serde::Deserialize;
use validator::Validate;

use super::{
    emails::{send_activation_email, send_password_reset_email},
    services::safe_redirect,
};
use crate::{
    errors::AppError,
    log_and_wrap_custom_internal,
    registry::{DefaultEmailBasedUserRegistry, SignUp, UserRegistry},
    sessions::Session,
    state::AppState,
    website::{template_to_response, template_with_status, HtmlResult, Meta},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login).post(post_login))
        .route("/logout", post(logout))
        .route("/register", get(register).post(post_register))
        .route("/activate/{code}", get(activate))
        .route(
            "/forgot-password",
            get(forgot_password).post(post_forgot_password),
        )
        .route(
            "/reset-password/{code}",
            get(reset_password).post(post_reset_password),
        )
}

#[derive(Debug, Deserialize)]
pub struct NextParams {
    next: Option<String>,
}

#[derive(Template)]
#[template(path = "auth/message.html")]
struct MessageTemplate<'a> {
    meta: Meta<'a>,
    message: &'a str,
}

async fn commit(tx: sqlx::Transaction<'_, sqlx::Sqlite>) -> Result<(), AppError> {
    tx.commit()
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
}

/// Commits on success. An expired code is deleted while being rejected, so
/// that failure is committed too.
async fn settle<T>(
    tx: sqlx::Transaction<'_, sqlx::Sqlite>,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => commit(tx).await.map(|_| value),
        Err(AppError::ActivationExpired) => {
            commit(tx).await?;
            Err(AppError::ActivationExpired)
        }
        Err(error) => Err(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate<'a> {
    meta: Meta<'a>,
    action: String,
    username: &'a str,
    error: Option<String>,
}

impl<'a> LoginTemplate<'a> {
    fn new(params: &NextParams, username: &'a str, error: Option<String>) -> Self {
        let action = match params.next.as_deref() {
            Some(next) => serde_urlencoded::to_string([("next", next)])
                .map(|query| format!("/login?{}", query))
                .unwrap_or_else(|_| "/login".into()),
            None => "/login".into(),
        };
        Self {
            meta: Meta::new("Log in"),
            action,
            username,
            error,
        }
    }
}

async fn login(Query(params): Query<NextParams>) -> HtmlResult {
    template_to_response(&LoginTemplate::new(&params, "", None))
}

async fn post_login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<NextParams>,
    Form(input): Form<LoginForm>,
) -> Result<Response, AppError> {
    let config = state.config();
    let mut tx = state.database().start_transaction().await?;
    let mut registry = DefaultEmailBasedUserRegistry::new(&mut tx, config);

    let user = if config.allow_email_auth && input.username.contains('@') {
        registry
            .get_authenticated_user_by_email(&input.username, &input.password)
            .await?
    } else {
        registry
            .get_authenticated_user_by_username(&input.username, &input.password)
            .await?
    };

    let Some(user) = user else {
        tracing::info!("failed login attempt");
        let error = AppError::WrongCredentials.to_string();
        return template_with_status(
            StatusCode::UNAUTHORIZED,
            &LoginTemplate::new(&params, &input.username, Some(error)),
        );
    };

    if !registry.can_login(&user) {
        return Err(AppError::AccountDisabled);
    }
    if !user.is_activated() {
        return Err(AppError::AccountNotActivated);
    }

    let token = registry.get_session_token(&user);
    let user = registry.mark_logged_in(user).await?;
    commit(tx).await?;

    state.sessions().login(&session, token).await?;
    tracing::info!(user_pk = user.pk, "user logged in");

    Ok(Redirect::to(safe_redirect(params.next.as_deref(), &config.login_redirect_to)).into_response())
}

async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Redirect, AppError> {
    state.sessions().logout(&session).await?;
    Ok(Redirect::to("/login"))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 3, max = 64))]
    username: String,
    #[validate(email)]
    email: String,
    #[serde(default)]
    full_name: String,
    #[validate(length(min = 8))]
    password: String,
}

#[derive(Template)]
#[template(path = "auth/register.html")]
struct RegisterTemplate<'a> {
    meta: Meta<'a>,
    input: &'a RegisterForm,
    error: Option<String>,
}

impl<'a> RegisterTemplate<'a> {
    fn new(input: &'a RegisterForm, error: Option<String>) -> Self {
        Self {
            meta: Meta::new("Create an account"),
            input,
            error,
        }
    }
}

async fn register() -> HtmlResult {
    template_to_response(&RegisterTemplate::new(&RegisterForm::default(), None))
}

async fn post_register(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(input): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if let Err(errors) = input.validate() {
        let error = AppError::Validation(errors).to_string();
        return template_with_status(
            StatusCode::BAD_REQUEST,
            &RegisterTemplate::new(&input, Some(error)),
        );
    }

    let config = state.config();
    let mut tx = state.database().start_transaction().await?;
    let mut registry = DefaultEmailBasedUserRegistry::new(&mut tx, config);

    let full_name = input.full_name.trim();
    let signed_up = registry
        .sign_up(SignUp {
            username: input.username.trim(),
            email: input.email.trim(),
            full_name: (!full_name.is_empty()).then_some(full_name),
            password: &input.password,
        })
        .await;

    let (user, code) = match signed_up {
        Ok(signed_up) => signed_up,
        Err(error @ AppError::AlreadyExists(_)) => {
            let (status, message) = error.get_status_code_and_message();
            return template_with_status(status, &RegisterTemplate::new(&input, Some(message)));
        }
        Err(error) => return Err(error),
    };
    let token = registry.get_session_token(&user);
    commit(tx).await?;

    match code {
        Some(code) => {
            send_activation_email(config, state.mailer(), &user, &code).await?;
            template_with_status(
                StatusCode::OK,
                &MessageTemplate {
                    meta: Meta::new("Check your inbox"),
                    message: "We sent you an email with a link to activate your account.",
                },
            )
        }
        None => {
            state.sessions().login(&session, token).await?;
            Ok(Redirect::to(&config.login_redirect_to).into_response())
        }
    }
}

async fn activate(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(code): Path<String>,
) -> Result<Redirect, AppError> {
    let config = state.config();
    let mut tx = state.database().start_transaction().await?;
    let mut registry = DefaultEmailBasedUserRegistry::new(&mut tx, config);
    let result = registry
        .activate_user(&code)
        .await
        .map(|user| registry.get_session_token(&user));
    let token = settle(tx, result).await?;

    state.sessions().login(&session, token).await?;
    Ok(Redirect::to(&config.login_redirect_to))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    email: String,
}

#[derive(Template)]
#[template(path = "auth/forgot_password.html")]
struct ForgotPasswordTemplate<'a> {
    meta: Meta<'a>,
    email: &'a str,
    error: Option<String>,
}

async fn forgot_password() -> HtmlResult {
    template_to_response(&ForgotPasswordTemplate {
        meta: Meta::new("Forgot your password?"),
        email: "",
        error: None,
    })
}

async fn post_forgot_password(
    State(state): State<AppState>,
    Form(input): Form<ForgotPasswordForm>,
) -> Result<Response, AppError> {
    let config = state.config();
    let email = input.email.trim();
    let mut tx = state.database().start_transaction().await?;
    let mut registry = DefaultEmailBasedUserRegistry::new(&mut tx, config);

    if registry.get_by_email(email).await?.is_none() {
        return template_with_status(
            StatusCode::NOT_FOUND,
            &ForgotPasswordTemplate {
                meta: Meta::new("Forgot your password?"),
                email,
                error: Some("There is no account with this email".into()),
            },
        );
    }

    let (user, code) = registry
        .create_password_reset_token(email)
        .await?
        .ok_or(AppError::AccountDisabled)?;
    commit(tx).await?;

    send_password_reset_email(config, state.mailer(), &user, &code).await?;
    template_to_response(&MessageTemplate {
        meta: Meta::new("Check your inbox"),
        message: "We sent you an email with a link to choose a new password.",
    })
    .map(IntoResponse::into_response)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordForm {
    #[validate(length(min = 8))]
    password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    password_confirmation: String,
}

#[derive(Template)]
#[template(path = "auth/reset_password.html")]
struct ResetPasswordTemplate<'a> {
    meta: Meta<'a>,
    code: &'a str,
    error: Option<String>,
}

async fn reset_password(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let mut tx = state.database().start_transaction().await?;
    let result = DefaultEmailBasedUserRegistry::new(&mut tx, state.config())
        .resolve_activation(&code)
        .await;
    settle(tx, result).await?;

    template_to_response(&ResetPasswordTemplate {
        meta: Meta::new("Choose a new password"),
        code: &code,
        error: None,
    })
    .map(IntoResponse::into_response)
}

async fn post_reset_password(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Form(input): Form<ResetPasswordForm>,
) -> Result<Response, AppError> {
    if let Err(errors) = input.validate() {
        return template_with_status(
            StatusCode::BAD_REQUEST,
            &ResetPasswordTemplate {
                meta: Meta::new("Choose a new password"),
                code: &code,
                error: Some(AppError::Validation(errors).to_string()),
            },
        );
    }

    let mut tx = state.database().start_transaction().await?;
    let result = DefaultEmailBasedUserRegistry::new(&mut tx, state.config())
        .reset_password(&code, &input.password)
        .await;
    settle(tx, result).await?;

    Ok(Redirect::to("/login").into_response())
}
