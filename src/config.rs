use menva::FromEnv;
use std::{fmt, net::Ipv4Addr, str::FromStr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Env {
    Development,
    Production,
    Test,
}

impl FromStr for Env {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(Env::Development),
            "production" => Ok(Env::Production),
            "test" => Ok(Env::Test),
            _ => Err(format!("Invalid value for enum Env: {}", s)),
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, FromEnv)]
pub struct Config {
    pub env: Env,
    ip: Ipv4Addr,
    port: u16,
    domain: String,
    pub database_url: String,
    pub sessions_db: String,
    pub session_key: String,
    pub session_cookie_name: String,
    /// Days.
    pub session_expiration: u16,
    pub login_redirect_to: String,
    pub require_activation: bool,
    pub allow_email_auth: bool,
    /// Hours.
    pub activation_expiration: i64,
    pub email_default_sender: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_relay: String,
    sentry_dsn: String,
}

impl Config {
    pub fn stub() -> Self {
        Self {
            env: Env::Test,
            ip: Ipv4Addr::new(0, 0, 0, 0),
            port: 8000,
            domain: "test.com".into(),
            database_url: "sqlite::memory:".into(),
            sessions_db: "sqlite::memory:".into(),
            session_key: "session_key".into(),
            session_cookie_name: "session_id".into(),
            session_expiration: 30,
            login_redirect_to: "/admin".into(),
            require_activation: false,
            allow_email_auth: true,
            activation_expiration: 24,
            email_default_sender: "noreply@test.com".into(),
            smtp_username: "smtp_username".into(),
            smtp_password: "smtp_password".into(),
            smtp_relay: "smtp_relay".into(),
            sentry_dsn: String::new(),
        }
    }

    pub fn socket_addr(&self) -> (Ipv4Addr, u16) {
        (self.ip, self.port)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn sentry_dsn(&self) -> Option<&str> {
        (!self.sentry_dsn.is_empty()).then_some(self.sentry_dsn.as_str())
    }

    pub fn build_url(&self, path: &str) -> String {
        let (protocol, domain) = if self.domain.starts_with("localhost")
            || self.domain.starts_with("127.0.0.1")
            || self.domain.starts_with("0.0.0.0")
        {
            ("http", format!("{}:{}", self.domain, self.port))
        } else {
            ("https", self.domain.clone())
        };

        format!("{}://{}{}", protocol, domain, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_from_str_ignores_case() {
        assert_eq!("Production".parse::<Env>(), Ok(Env::Production));
        assert_eq!("test".parse::<Env>(), Ok(Env::Test));
        assert!("staging".parse::<Env>().is_err());
    }

    #[test]
    fn test_build_url() {
        let mut config = Config::stub();
        assert_eq!(
            config.build_url("/reset-password/abc"),
            "https://test.com/reset-password/abc"
        );

        config.domain = "localhost".into();
        assert_eq!(config.build_url("/login"), "http://localhost:8000/login");
    }

    #[test]
    fn test_empty_sentry_dsn_disables_sentry() {
        assert_eq!(Config::stub().sentry_dsn(), None);
    }
}
