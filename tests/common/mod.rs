#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde::Serialize;
use tower::ServiceExt;
use userhub::{
    models::{Group, User, ADMIN_GROUP},
    state::AppState,
    Config,
};

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Response {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }
}

/// Drives the router like a browser would, keeping the session cookie
/// between requests.
pub struct Client {
    pub state: AppState,
    app: Router,
    cookie: Option<String>,
}

impl Client {
    pub async fn new() -> Self {
        Self::with_config(Config::stub()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let state = AppState::setup(config).await.unwrap();
        Self {
            app: userhub::app(state.clone()),
            state,
            cookie: None,
        }
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn set_cookie(&mut self, cookie: String) {
        self.cookie = Some(cookie);
    }

    pub async fn get(&mut self, uri: &str) -> Response {
        let request = self.request("GET", uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post(&mut self, uri: &str, form: &impl Serialize) -> Response {
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(serde_urlencoded::to_string(form).unwrap()))
            .unwrap();
        self.send(request).await
    }

    pub async fn register(&mut self, username: &str, email: &str, password: &str) -> Response {
        self.post(
            "/register",
            &[
                ("username", username),
                ("email", email),
                ("full_name", ""),
                ("password", password),
            ],
        )
        .await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Response {
        self.post("/login", &[("username", username), ("password", password)])
            .await
    }

    pub async fn logout(&mut self) -> Response {
        self.post("/logout", &[("", "")]).await
    }

    pub async fn make_admin(&self, username: &str) {
        let mut conn = self.state.database().acquire().await.unwrap();
        let user = User::find_by_lower_username(username, &mut *conn)
            .await
            .unwrap()
            .unwrap();
        let admin = Group::get_by_name(ADMIN_GROUP, &mut *conn)
            .await
            .unwrap()
            .unwrap();
        user.add_to_group(&admin, &mut conn).await.unwrap();
    }

    pub async fn disable(&self, username: &str) {
        let user = self.user(username).await;
        let mut conn = self.state.database().acquire().await.unwrap();
        user.set_enabled(false, &mut conn).await.unwrap();
    }

    /// The code in the last email linking to `path`, e.g. `/activate/`.
    pub async fn code_from_outbox(&self, path: &str) -> String {
        let sent = self.state.mailer().sent().await;
        let email = sent.last().expect("no email sent");
        let link = format!("https://test.com{}", path);
        let start = email.find(&link).expect("no link in the email") + link.len();
        email[start..start + 22].to_owned()
    }

    pub async fn user(&self, username: &str) -> User {
        User::find_by_lower_username(username, &**self.state.database())
            .await
            .unwrap()
            .unwrap()
    }

    fn request(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri);
        match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn send(&mut self, request: Request<Body>) -> Response {
        let response = self.app.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            let pair = set_cookie.split(';').next().unwrap();
            // An empty value is the server dropping the session.
            self.cookie = (!pair.ends_with('=')).then(|| pair.to_owned());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        Response {
            status,
            headers,
            body: String::from_utf8(body.to_vec()).unwrap(),
        }
    }
}
