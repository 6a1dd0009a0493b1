use chrono::{Duration, NaiveDateTime, Utc};
use sqlx::{prelude::FromRow, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

use crate::{
    auth::verify_password, errors::AppError, log_and_wrap_custom_internal, slug::uuid_to_slug,
};

pub const ADMIN_GROUP: &str = "admin";

pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn map_write_error(error: sqlx::Error, what: &'static str) -> AppError {
    if let sqlx::Error::Database(e) = &error {
        if e.is_unique_violation() {
            return AppError::AlreadyExists(what);
        }
    }
    log_and_wrap_custom_internal!(error)
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub pk: i64,
    pub uuid: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    hashed_password: Option<String>,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub activated_at: Option<NaiveDateTime>,
    pub last_login_at: Option<NaiveDateTime>,
    pub registration_source: String,
    pub activation_pk: Option<i64>,
}

#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: Option<&'a str>,
    pub hashed_password: Option<&'a str>,
    pub activated_at: Option<NaiveDateTime>,
    pub registration_source: &'a str,
}

impl User {
    pub async fn create(new: NewUser<'_>, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        let now = now();
        sqlx::query_as(
            "INSERT INTO users (uuid, username, username_lower, email, email_lower, full_name, hashed_password, enabled, created_at, updated_at, activated_at, registration_source)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8, $8, $9, $10)
                RETURNING *;",
        )
        .bind(Uuid::new_v4())
        .bind(new.username)
        .bind(new.username.to_lowercase())
        .bind(new.email)
        .bind(new.email.to_lowercase())
        .bind(new.full_name)
        .bind(new.hashed_password)
        .bind(now)
        .bind(new.activated_at)
        .bind(new.registration_source)
        .fetch_one(tx)
        .await
        .map_err(|e| map_write_error(e, "Username or email"))
    }

    pub async fn get_by_pk<'e>(
        pk: i64,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE pk = $1;")
            .bind(pk)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn get_by_uuid<'e>(
        uuid: Uuid,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE uuid = $1;")
            .bind(uuid)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    /// `username` must already be lower-cased.
    pub async fn find_by_lower_username<'e>(
        username: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE username_lower = $1;")
            .bind(username)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    /// `email` must already be lower-cased.
    pub async fn find_by_lower_email<'e>(
        email: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE email_lower = $1;")
            .bind(email)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn find_by_activation<'e>(
        activation_pk: i64,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM users WHERE activation_pk = $1;")
            .bind(activation_pk)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn count<'e>(executor: impl SqliteExecutor<'e>) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users;")
            .fetch_one(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn latest_activated<'e>(
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as(
            "SELECT * FROM users WHERE activated_at IS NOT NULL ORDER BY activated_at DESC, pk DESC LIMIT 1;",
        )
        .fetch_optional(executor)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub fn friendly_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }

    pub fn slug(&self) -> String {
        uuid_to_slug(&self.uuid)
    }

    pub fn is_activated(&self) -> bool {
        self.activated_at.is_some()
    }

    pub fn can_login(&self) -> bool {
        self.enabled
    }

    /// Accounts without a password never match.
    pub fn verify_password(&self, raw_password: &str) -> bool {
        let Some(hashed_password) = self.hashed_password.as_deref() else {
            return false;
        };
        match verify_password(raw_password, hashed_password) {
            Ok(()) => true,
            Err(AppError::WrongPassword(_)) => false,
            Err(e) => {
                tracing::warn!(user_pk = self.pk, error = %e, "stored password hash is unreadable");
                false
            }
        }
    }

    pub async fn groups<'e>(&self, executor: impl SqliteExecutor<'e>) -> Result<Vec<Group>, AppError> {
        sqlx::query_as(
            "SELECT groups.* FROM groups
                INNER JOIN users_groups_m2m ON users_groups_m2m.group_pk = groups.pk
                WHERE users_groups_m2m.user_pk = $1
                ORDER BY groups.name;",
        )
        .bind(self.pk)
        .fetch_all(executor)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn is_in_group<'e>(
        &self,
        name: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<bool, AppError> {
        sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM users_groups_m2m
                INNER JOIN groups ON users_groups_m2m.group_pk = groups.pk
                WHERE users_groups_m2m.user_pk = $1 AND groups.name = $2
            );",
        )
        .bind(self.pk)
        .bind(name)
        .fetch_one(executor)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn set_activation(
        mut self,
        activation: &Activation,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        if let Some(previous) = self.activation_pk.filter(|pk| *pk != activation.pk) {
            Activation::delete(previous, &mut *tx).await?;
        }
        self.updated_at = now();
        sqlx::query("UPDATE users SET activation_pk = $1, updated_at = $2 WHERE pk = $3;")
            .bind(activation.pk)
            .bind(self.updated_at)
            .bind(self.pk)
            .execute(&mut *tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        self.activation_pk = Some(activation.pk);
        Ok(self)
    }

    /// Drops the pending activation, if any, together with its row.
    pub async fn consume_activation(mut self, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        if let Some(activation_pk) = self.activation_pk.take() {
            // The foreign key clears users.activation_pk.
            Activation::delete(activation_pk, &mut *tx).await?;
        }
        Ok(self)
    }

    pub async fn set_to_active(mut self, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        if self.activated_at.is_some() {
            return Ok(self);
        }
        let now = now();
        sqlx::query("UPDATE users SET activated_at = $1, updated_at = $1 WHERE pk = $2;")
            .bind(now)
            .bind(self.pk)
            .execute(tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        self.activated_at = Some(now);
        self.updated_at = now;
        Ok(self)
    }

    pub async fn set_password(
        mut self,
        hashed_password: String,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        self.updated_at = now();
        sqlx::query("UPDATE users SET hashed_password = $1, updated_at = $2 WHERE pk = $3;")
            .bind(&hashed_password)
            .bind(self.updated_at)
            .bind(self.pk)
            .execute(tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        self.hashed_password = Some(hashed_password);
        Ok(self)
    }

    pub async fn set_enabled(mut self, enabled: bool, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        self.updated_at = now();
        sqlx::query("UPDATE users SET enabled = $1, updated_at = $2 WHERE pk = $3;")
            .bind(enabled)
            .bind(self.updated_at)
            .bind(self.pk)
            .execute(tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        self.enabled = enabled;
        Ok(self)
    }

    pub async fn touch_last_login(mut self, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        let now = now();
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE pk = $2;")
            .bind(now)
            .bind(self.pk)
            .execute(tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        self.last_login_at = Some(now);
        Ok(self)
    }

    pub async fn add_to_group(self, group: &Group, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        sqlx::query("INSERT OR IGNORE INTO users_groups_m2m (user_pk, group_pk) VALUES ($1, $2);")
            .bind(self.pk)
            .bind(group.pk)
            .execute(tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        Ok(self)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Group {
    pub pk: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

impl Group {
    pub async fn create(
        name: &str,
        description: &str,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        sqlx::query_as(
            "INSERT INTO groups (uuid, name, description, created_at) VALUES ($1, $2, $3, $4) RETURNING *;",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(now())
        .fetch_one(tx)
        .await
        .map_err(|e| map_write_error(e, "Group name"))
    }

    pub async fn get_by_name<'e>(
        name: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM groups WHERE name = $1;")
            .bind(name)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn get_by_uuid<'e>(
        uuid: Uuid,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM groups WHERE uuid = $1;")
            .bind(uuid)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn members<'e>(&self, executor: impl SqliteExecutor<'e>) -> Result<Vec<User>, AppError> {
        sqlx::query_as(
            "SELECT users.* FROM users
                INNER JOIN users_groups_m2m ON users_groups_m2m.user_pk = users.pk
                WHERE users_groups_m2m.group_pk = $1
                ORDER BY users.created_at DESC, users.pk DESC;",
        )
        .bind(self.pk)
        .fetch_all(executor)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub fn slug(&self) -> String {
        uuid_to_slug(&self.uuid)
    }
}

/// One-time code handed out for account activation and password resets.
#[derive(Debug, Clone, FromRow)]
pub struct Activation {
    pub pk: i64,
    pub code: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Activation {
    pub async fn create(
        expiration_hours: i64,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        let now = now();
        sqlx::query_as(
            "INSERT INTO activations (code, created_at, expires_at) VALUES ($1, $2, $3) RETURNING *;",
        )
        .bind(uuid_to_slug(&Uuid::new_v4()))
        .bind(now)
        .bind(now + Duration::hours(expiration_hours))
        .fetch_one(tx)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn get_by_code<'e>(
        code: &str,
        executor: impl SqliteExecutor<'e>,
    ) -> Result<Option<Self>, AppError> {
        sqlx::query_as("SELECT * FROM activations WHERE code = $1;")
            .bind(code)
            .fetch_optional(executor)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn delete(pk: i64, tx: &mut SqliteConnection) -> Result<(), AppError> {
        sqlx::query("DELETE FROM activations WHERE pk = $1;")
            .bind(pk)
            .execute(tx)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        Ok(())
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= now()
    }
}
