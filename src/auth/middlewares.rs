use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use axum_extra::{headers::Cookie, TypedHeader};

use super::services::{remove_session_cookie, set_security_headers, set_session_cookie};
use crate::{
    errors::AppError,
    log_and_wrap_custom_internal,
    models::{User, ADMIN_GROUP},
    registry::{DefaultEmailBasedUserRegistry, UserRegistry},
    sessions::Session,
    state::AppState,
};

/// The authenticated user, available to handlers behind
/// [`login_required_middleware`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

pub async fn sessions_middleware(
    State(state): State<AppState>,
    cookie: Option<TypedHeader<Cookie>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let sessions = state.sessions();
    let config = state.config();

    let cookie_value = cookie
        .as_ref()
        .and_then(|TypedHeader(cookie)| cookie.get(&config.session_cookie_name));

    let current_session = match cookie_value {
        Some(cookie_value) => sessions.find_session(cookie_value, &config.session_key).await?,
        None => None,
    };

    let session = match current_session {
        Some(session) => session,
        None => sessions.create_session(config.session_expiration),
    };

    request.extensions_mut().insert(session.clone());

    let mut resp = next.run(request).await;

    let headers = resp.headers_mut();
    set_security_headers(headers);
    if session.is_stored().await {
        set_session_cookie(headers, &session, config).await?;
    } else if cookie_value.is_some() {
        remove_session_cookie(headers, config)?;
    }

    Ok(resp)
}

pub async fn login_required_middleware(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match session.user_token().await {
        Some(token) => {
            // Released before the handler opens its own transaction.
            let mut conn = state
                .database()
                .acquire()
                .await
                .map_err(|e| log_and_wrap_custom_internal!(e))?;
            let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, state.config());
            registry
                .get_user_by_session_token(&token)
                .await?
                .filter(|user| registry.can_login(user))
        }
        None => None,
    };

    match user {
        Some(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            Ok(next.run(request).await)
        }
        None => {
            let next = serde_urlencoded::to_string([("next", request.uri().to_string())])
                .map_err(|e| log_and_wrap_custom_internal!(e))?;
            Ok(Redirect::to(&format!("/login?{}", next)).into_response())
        }
    }
}

/// Must run after [`login_required_middleware`].
pub async fn admin_required_middleware(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !user.is_in_group(ADMIN_GROUP, &**state.database()).await? {
        tracing::warn!(user_pk = user.pk, path = %request.uri(), "admin access denied");
        return Err(AppError::Forbidden);
    }
    Ok(next.run(request).await)
}
