use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::http::{header::SET_COOKIE, uri::PathAndQuery, HeaderMap, HeaderValue};
use cookie::{time::Duration, SameSite};

use crate::{config::Config, errors::AppError, log_and_wrap_custom_internal, sessions::Session};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(AppError::ErrorHashingPassword)?
        .to_string())
}

pub fn verify_password(raw_password: &str, db_password: &str) -> Result<(), AppError> {
    let parsed_hash = PasswordHash::new(db_password).map_err(AppError::ErrorHashingPassword)?;
    Argon2::default()
        .verify_password(raw_password.as_bytes(), &parsed_hash)
        .map_err(AppError::WrongPassword)
}

/// Only local paths are followed after a login, anything else falls back to
/// `default`.
pub fn safe_redirect<'a>(next: Option<&'a str>, default: &'a str) -> &'a str {
    match next {
        Some(path) if is_local_path(path) => path,
        _ => default,
    }
}

// Browsers read `\` as `/`, so `/\evil.com` leaves the site as well.
fn is_local_path(path: &str) -> bool {
    path.starts_with('/')
        && !path.starts_with("//")
        && path.bytes().all(|b| b.is_ascii_graphic() && b != b'\\')
        && path.parse::<PathAndQuery>().is_ok()
}

/// Signed session cookie for a stored session.
pub async fn set_session_cookie(
    headers: &mut HeaderMap<HeaderValue>,
    session: &Session,
    config: &Config,
) -> Result<(), AppError> {
    let cookie = session_cookie(config, session.signed_id(&config.session_key).await)
        .max_age(Duration::days(i64::from(config.session_expiration)))
        .build();
    append_cookie(headers, cookie)
}

/// Tells the browser to forget a cookie that no longer points to a session.
pub fn remove_session_cookie(
    headers: &mut HeaderMap<HeaderValue>,
    config: &Config,
) -> Result<(), AppError> {
    let cookie = session_cookie(config, String::new())
        .max_age(Duration::ZERO)
        .build();
    append_cookie(headers, cookie)
}

fn session_cookie(config: &Config, value: String) -> cookie::CookieBuilder<'_> {
    cookie::Cookie::build((config.session_cookie_name.as_str(), value))
        .domain(config.domain())
        .path("/")
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Lax)
}

fn append_cookie(headers: &mut HeaderMap<HeaderValue>, cookie: cookie::Cookie<'_>) -> Result<(), AppError> {
    headers.append(
        SET_COOKIE,
        HeaderValue::from_bytes(cookie.encoded().to_string().as_bytes())
            .map_err(|e| log_and_wrap_custom_internal!(e))?,
    );
    Ok(())
}

pub fn set_security_headers(headers: &mut HeaderMap<HeaderValue>) {
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("frame-ancestors 'none'"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
}
