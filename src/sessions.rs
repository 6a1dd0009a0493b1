use chrono::{Days, NaiveDateTime};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    database::{connect_lazy, run_migrations},
    errors::AppError,
    log_and_wrap_custom_internal,
    models::now,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug)]
pub struct Session(Arc<RwLock<UserSession>>);

impl Session {
    pub async fn is_authenticated(&self) -> bool {
        self.0.read().await.user_token.is_some()
    }

    /// Registry token of the logged in user.
    pub async fn user_token(&self) -> Option<String> {
        self.0.read().await.user_token.clone()
    }

    pub async fn id(&self) -> String {
        self.0.read().await.session_id.to_owned()
    }

    /// Whether the session has a row, only those are worth a cookie.
    pub async fn is_stored(&self) -> bool {
        !self.0.read().await.unsaved
    }

    /// Cookie value: the session id and its signature.
    pub async fn signed_id(&self, secret: &str) -> String {
        let session_id = self.id().await;
        let signature = generate_token(secret, &session_id);
        format!("{}.{}", session_id, signature)
    }
}

#[derive(Clone, Debug)]
pub struct Sessions(SqlitePool);

impl Sessions {
    pub fn new(sessions_db: &str) -> Result<Self, AppError> {
        Ok(Self(connect_lazy(sessions_db)?))
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        run_migrations(&self.0, "./migrations/sessions").await
    }

    pub fn get_connection(&self) -> &SqlitePool {
        &self.0
    }

    /// Loads the session behind a cookie value. Forged, unknown and expired
    /// sessions all come back as `None`, expired ones are deleted on the way.
    pub async fn find_session(
        &self,
        cookie_value: &str,
        secret: &str,
    ) -> Result<Option<Session>, AppError> {
        let Some(session_id) = verify_signed_id(cookie_value, secret) else {
            tracing::debug!("session cookie with a bad signature");
            return Ok(None);
        };

        let Some(mut session) =
            UserSession::from_session_id(session_id, self.get_connection()).await?
        else {
            return Ok(None);
        };

        if session.expiration <= now() {
            session.delete(self.get_connection()).await?;
            return Ok(None);
        }

        session.update_last_accessed().update(self.get_connection()).await?;
        Ok(Some(Session(Arc::new(RwLock::new(session)))))
    }

    /// An anonymous session. It is only stored once someone logs in with it.
    pub fn create_session(&self, session_expiration: u16) -> Session {
        Session(Arc::new(RwLock::new(UserSession::new(session_expiration))))
    }

    /// Binds the session to a user under a brand new id.
    pub async fn login(&self, session: &Session, user_token: String) -> Result<(), AppError> {
        self.reuse_current_as_new_one(session, user_token).await
    }

    /// Drops the stored session, the handle goes back to anonymous.
    pub async fn logout(&self, session: &Session) -> Result<(), AppError> {
        let mut storage = session.0.write().await;
        storage.delete(self.get_connection()).await?;
        storage.new_session_id().update_user(None);
        Ok(())
    }

    /// Deletes every expired session, returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM web_sessions WHERE expiration <= $1;")
            .bind(now())
            .execute(self.get_connection())
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        Ok(result.rows_affected())
    }

    async fn reuse_current_as_new_one(
        &self,
        session: &Session,
        user_token: String,
    ) -> Result<(), AppError> {
        let mut storage = session.0.write().await;
        storage.delete(self.get_connection()).await?;
        storage
            .new_session_id()
            .update_user(Some(user_token))
            .update_last_accessed()
            .save(self.get_connection())
            .await
    }
}

#[derive(Debug, sqlx::FromRow, Clone)]
pub struct UserSession {
    session_id: String,
    user_token: Option<String>,
    last_accessed: NaiveDateTime,
    expiration: NaiveDateTime,
    #[sqlx(skip)]
    unsaved: bool,
}

impl UserSession {
    fn new(session_expiration: u16) -> Self {
        let today = now();
        Self {
            session_id: Uuid::now_v7().to_string(),
            user_token: None,
            last_accessed: today,
            expiration: today + Days::new(u64::from(session_expiration)),
            unsaved: true,
        }
    }

    fn new_session_id(&mut self) -> &mut Self {
        self.session_id = Uuid::now_v7().to_string();
        self
    }

    fn update_user(&mut self, user_token: Option<String>) -> &mut Self {
        self.user_token = user_token;
        self
    }

    fn update_last_accessed(&mut self) -> &mut Self {
        self.last_accessed = now();
        self
    }

    async fn from_session_id(
        session_id: &str,
        conn: &SqlitePool,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM web_sessions WHERE session_id = $1;")
            .bind(session_id)
            .fetch_optional(conn)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    async fn save(&mut self, conn: &SqlitePool) -> Result<(), AppError> {
        sqlx::query("INSERT INTO web_sessions (session_id, user_token, last_accessed, expiration) VALUES ($1, $2, $3, $4);")
            .bind(&self.session_id)
            .bind(&self.user_token)
            .bind(self.last_accessed)
            .bind(self.expiration)
            .execute(conn)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        self.unsaved = false;
        Ok(())
    }

    async fn update(&self, conn: &SqlitePool) -> Result<(), AppError> {
        sqlx::query("UPDATE web_sessions SET last_accessed = $1 WHERE session_id = $2;")
            .bind(self.last_accessed)
            .bind(&self.session_id)
            .execute(conn)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        Ok(())
    }

    async fn delete(&mut self, conn: &SqlitePool) -> Result<(), AppError> {
        sqlx::query("DELETE FROM web_sessions WHERE session_id = $1;")
            .bind(&self.session_id)
            .execute(conn)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        self.unsaved = true;
        Ok(())
    }
}

fn new_mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}

fn generate_token(secret: &str, data: &str) -> String {
    let mut mac = new_mac(secret);
    mac.update(data.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

fn verify_signed_id<'a>(cookie_value: &'a str, secret: &str) -> Option<&'a str> {
    let (session_id, signature) = cookie_value.rsplit_once('.')?;
    let signature = hex::decode(signature).ok()?;
    let mut mac = new_mac(secret);
    mac.update(session_id.as_bytes());
    mac.verify_slice(&signature).ok().map(|_| session_id)
}
