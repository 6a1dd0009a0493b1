//! Lookups and credential checks for users, over the request's transaction.

use std::future::Future;

use sqlx::SqliteConnection;

use crate::{
    auth::hash_password,
    config::Config,
    errors::AppError,
    models::{now, Activation, Group, NewUser, User},
};

/// Everything the rest of the application asks about users goes through here.
pub trait UserRegistry: Send {
    fn get_by_username(
        &mut self,
        username: &str,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    fn get_by_email(
        &mut self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    fn get_by_activation(
        &mut self,
        activation: &Activation,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    fn get_groups(
        &mut self,
        user: &User,
    ) -> impl Future<Output = Result<Vec<Group>, AppError>> + Send;

    /// Issues a fresh activation for the user owning `email`.
    ///
    /// Returns `None` when the user is not allowed to log in. The user must
    /// exist, otherwise `AppError::DoesNotExist`.
    fn create_password_reset_token(
        &mut self,
        email: &str,
    ) -> impl Future<Output = Result<Option<(User, String)>, AppError>> + Send;

    fn get_user_by_session_token(
        &mut self,
        token: &str,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    fn verify_password(&self, user: &User, password: &str) -> bool {
        user.verify_password(password)
    }

    fn can_login(&self, user: &User) -> bool {
        user.can_login()
    }

    /// Marker stored in the authenticated session to find the user again.
    fn get_session_token(&self, user: &User) -> String {
        user.pk.to_string()
    }

    fn get_authenticated_user_by_username(
        &mut self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send {
        async move {
            let user = self.get_by_username(username).await?;
            Ok(user.filter(|u| self.verify_password(u, password)))
        }
    }

    fn get_authenticated_user_by_email(
        &mut self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<User>, AppError>> + Send {
        async move {
            let user = self.get_by_email(email).await?;
            Ok(user.filter(|u| self.verify_password(u, password)))
        }
    }
}

#[derive(Debug)]
pub struct SignUp<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: Option<&'a str>,
    pub password: &'a str,
}

/// Registry for email based accounts stored in the application database.
#[derive(Debug)]
pub struct DefaultEmailBasedUserRegistry<'c> {
    conn: &'c mut SqliteConnection,
    config: &'c Config,
}

impl<'c> DefaultEmailBasedUserRegistry<'c> {
    pub fn new(conn: &'c mut SqliteConnection, config: &'c Config) -> Self {
        Self { conn, config }
    }

    /// Creates an account. When activation is required the user starts
    /// inactive and the activation code is returned along with it.
    pub async fn sign_up(&mut self, input: SignUp<'_>) -> Result<(User, Option<String>), AppError> {
        if self.get_by_username(input.username).await?.is_some() {
            return Err(AppError::AlreadyExists("Username"));
        }
        if self.get_by_email(input.email).await?.is_some() {
            return Err(AppError::AlreadyExists("Email"));
        }

        let hashed_password = hash_password(input.password)?;
        let activated_at = (!self.config.require_activation).then(now);

        let user = User::create(
            NewUser {
                username: input.username,
                email: input.email,
                full_name: input.full_name,
                hashed_password: Some(&hashed_password),
                activated_at,
                registration_source: "email",
            },
            &mut *self.conn,
        )
        .await?;
        tracing::info!(user_pk = user.pk, "user signed up");

        if user.is_activated() {
            return Ok((user, None));
        }

        let activation = Activation::create(self.config.activation_expiration, &mut *self.conn).await?;
        let user = user.set_activation(&activation, &mut *self.conn).await?;
        Ok((user, Some(activation.code)))
    }

    /// Finds the user a code was issued for. Expired codes are rejected and
    /// dropped.
    pub async fn resolve_activation(&mut self, code: &str) -> Result<User, AppError> {
        let activation = Activation::get_by_code(code, &mut *self.conn)
            .await?
            .ok_or(AppError::DoesNotExist)?;

        if activation.is_expired() {
            Activation::delete(activation.pk, &mut *self.conn).await?;
            return Err(AppError::ActivationExpired);
        }

        self.get_by_activation(&activation)
            .await?
            .ok_or(AppError::DoesNotExist)
    }

    pub async fn activate_user(&mut self, code: &str) -> Result<User, AppError> {
        let user = self
            .resolve_activation(code)
            .await?
            .set_to_active(&mut *self.conn)
            .await?
            .consume_activation(&mut *self.conn)
            .await?;
        tracing::info!(user_pk = user.pk, "user activated");
        Ok(user)
    }

    pub async fn reset_password(&mut self, code: &str, new_password: &str) -> Result<User, AppError> {
        let user = self.resolve_activation(code).await?;
        let hashed_password = hash_password(new_password)?;
        let user = user
            .set_password(hashed_password, &mut *self.conn)
            .await?
            .consume_activation(&mut *self.conn)
            .await?;
        tracing::info!(user_pk = user.pk, "password reset");
        Ok(user)
    }

    pub async fn mark_logged_in(&mut self, user: User) -> Result<User, AppError> {
        user.touch_last_login(&mut *self.conn).await
    }
}

impl UserRegistry for DefaultEmailBasedUserRegistry<'_> {
    async fn get_by_username(&mut self, username: &str) -> Result<Option<User>, AppError> {
        User::find_by_lower_username(&username.to_lowercase(), &mut *self.conn).await
    }

    async fn get_by_email(&mut self, email: &str) -> Result<Option<User>, AppError> {
        User::find_by_lower_email(&email.to_lowercase(), &mut *self.conn).await
    }

    async fn get_by_activation(&mut self, activation: &Activation) -> Result<Option<User>, AppError> {
        User::find_by_activation(activation.pk, &mut *self.conn).await
    }

    async fn get_groups(&mut self, user: &User) -> Result<Vec<Group>, AppError> {
        user.groups(&mut *self.conn).await
    }

    async fn create_password_reset_token(
        &mut self,
        email: &str,
    ) -> Result<Option<(User, String)>, AppError> {
        let user = self.get_by_email(email).await?.ok_or_else(|| {
            tracing::warn!("password reset requested for a non-existing email");
            AppError::DoesNotExist
        })?;

        if !self.can_login(&user) {
            return Ok(None);
        }

        let activation = Activation::create(self.config.activation_expiration, &mut *self.conn).await?;
        let user = user.set_activation(&activation, &mut *self.conn).await?;

        if activation.code.is_empty() {
            return Err(AppError::ActivationCodeMissing);
        }

        Ok(Some((user, activation.code)))
    }

    async fn get_user_by_session_token(&mut self, token: &str) -> Result<Option<User>, AppError> {
        match token.parse::<i64>() {
            Ok(pk) => User::get_by_pk(pk, &mut *self.conn).await,
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn setup() -> Database {
        let database = Database::new("sqlite::memory:").unwrap();
        database.run_migrations().await.unwrap();
        database
    }

    fn sign_up_input<'a>(username: &'a str, email: &'a str) -> SignUp<'a> {
        SignUp {
            username,
            email,
            full_name: None,
            password: "correct horse battery",
        }
    }

    #[tokio::test]
    async fn test_lookups_ignore_case() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);

        let (user, code) = registry
            .sign_up(sign_up_input("Alice", "Alice@Example.com"))
            .await
            .unwrap();
        assert!(code.is_none());

        let by_username = registry.get_by_username("aLiCe").await.unwrap().unwrap();
        assert_eq!(by_username.pk, user.pk);
        let by_email = registry.get_by_email("alice@example.COM").await.unwrap().unwrap();
        assert_eq!(by_email.pk, user.pk);

        assert!(registry.get_by_username("bob").await.unwrap().is_none());
        assert!(registry.get_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_ascii_lookups() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);

        let (user, _) = registry
            .sign_up(sign_up_input("Émile", "Émile@Exemple.fr"))
            .await
            .unwrap();

        for username in ["Émile", "émile", "ÉMILE"] {
            let found = registry.get_by_username(username).await.unwrap();
            assert_eq!(found.map(|u| u.pk), Some(user.pk), "{}", username);
        }
        let found = registry.get_by_email("émile@exemple.fr").await.unwrap();
        assert_eq!(found.map(|u| u.pk), Some(user.pk));

        let authenticated = registry
            .get_authenticated_user_by_username("Émile", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(authenticated.map(|u| u.pk), Some(user.pk));

        let duplicate = registry
            .sign_up(sign_up_input("éMILE", "other@exemple.fr"))
            .await;
        assert!(matches!(duplicate, Err(AppError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_authentication() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);
        let (user, _) = registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();

        let authenticated = registry
            .get_authenticated_user_by_username("ALICE", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(authenticated.map(|u| u.pk), Some(user.pk));

        let authenticated = registry
            .get_authenticated_user_by_email("alice@example.com", "correct horse battery")
            .await
            .unwrap();
        assert_eq!(authenticated.map(|u| u.pk), Some(user.pk));

        assert!(registry
            .get_authenticated_user_by_username("alice", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(registry
            .get_authenticated_user_by_email("nobody@example.com", "correct horse battery")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_rejected() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);
        registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();

        let error = registry
            .sign_up(sign_up_input("ALICE", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::AlreadyExists("Username")));

        let error = registry
            .sign_up(sign_up_input("bob", "Alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::AlreadyExists("Email")));
    }

    #[tokio::test]
    async fn test_session_token_round_trip() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);
        let (user, _) = registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();

        let token = registry.get_session_token(&user);
        let found = registry.get_user_by_session_token(&token).await.unwrap();
        assert_eq!(found.map(|u| u.uuid), Some(user.uuid));

        assert!(registry
            .get_user_by_session_token("not-a-token")
            .await
            .unwrap()
            .is_none());
        assert!(registry
            .get_user_by_session_token("9999")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_password_reset_token() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);
        registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();

        let (user, code) = registry
            .create_password_reset_token("ALICE@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!code.is_empty());
        assert!(user.activation_pk.is_some());

        let activation = Activation::get_by_code(&code, &mut *registry.conn)
            .await
            .unwrap()
            .unwrap();
        let owner = registry.get_by_activation(&activation).await.unwrap().unwrap();
        assert_eq!(owner.pk, user.pk);

        // A second request replaces the first code.
        let (_, second_code) = registry
            .create_password_reset_token("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(code, second_code);
        assert!(Activation::get_by_code(&code, &mut *registry.conn)
            .await
            .unwrap()
            .is_none());

        let user = registry
            .reset_password(&second_code, "a brand new password")
            .await
            .unwrap();
        assert!(user.activation_pk.is_none());
        assert!(registry
            .get_authenticated_user_by_username("alice", "a brand new password")
            .await
            .unwrap()
            .is_some());
        assert!(matches!(
            registry.reset_password(&second_code, "again").await,
            Err(AppError::DoesNotExist)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_for_missing_user_fails() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);

        assert!(matches!(
            registry.create_password_reset_token("ghost@example.com").await,
            Err(AppError::DoesNotExist)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_for_disabled_user_is_none() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);
        let (user, _) = registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();
        user.set_enabled(false, &mut *registry.conn).await.unwrap();

        assert!(registry
            .create_password_reset_token("alice@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_activation_flow() {
        let database = setup().await;
        let mut config = Config::stub();
        config.require_activation = true;
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);

        let (user, code) = registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();
        assert!(!user.is_activated());

        let user = registry.activate_user(&code.unwrap()).await.unwrap();
        assert!(user.is_activated());
        assert!(user.activation_pk.is_none());
    }

    #[tokio::test]
    async fn test_expired_activation_is_rejected() {
        let database = setup().await;
        let mut config = Config::stub();
        config.require_activation = true;
        config.activation_expiration = 0;
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);

        let (_, code) = registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();
        let code = code.unwrap();

        assert!(matches!(
            registry.activate_user(&code).await,
            Err(AppError::ActivationExpired)
        ));
        assert!(matches!(
            registry.activate_user(&code).await,
            Err(AppError::DoesNotExist)
        ));
    }

    #[tokio::test]
    async fn test_groups() {
        let database = setup().await;
        let config = Config::stub();
        let mut conn = database.acquire().await.unwrap();
        let mut registry = DefaultEmailBasedUserRegistry::new(&mut conn, &config);
        let (user, _) = registry
            .sign_up(sign_up_input("alice", "alice@example.com"))
            .await
            .unwrap();
        assert!(registry.get_groups(&user).await.unwrap().is_empty());

        let admin = Group::get_by_name(crate::models::ADMIN_GROUP, &mut *registry.conn)
            .await
            .unwrap()
            .unwrap();
        let user = user.add_to_group(&admin, &mut *registry.conn).await.unwrap();
        // Adding twice is harmless.
        let user = user.add_to_group(&admin, &mut *registry.conn).await.unwrap();

        let groups = registry.get_groups(&user).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "admin");
    }
}
