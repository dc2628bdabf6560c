use std::fmt;

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "baby_foot";

/// Basic-auth credentials sent with every CouchDB request.
#[derive(Clone)]
pub struct CouchCredentials {
    /// CouchDB user.
    pub username: String,
    /// Password of `username`.
    pub password: String,
}

impl fmt::Debug for CouchCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Server and database holding the match and event documents.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, without trailing slash.
    pub base_url: String,
    /// Database name; `baby_foot` unless overridden.
    pub database: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<CouchCredentials>,
}

impl CouchConfig {
    /// Target the default database on `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            database: DEFAULT_DATABASE.to_owned(),
            credentials: None,
        }
    }

    /// Use another database on the same server.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Authenticate as `username`.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(CouchCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB`, `COUCH_USERNAME` and
    /// `COUCH_PASSWORD`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;

        let mut config = Self::new(base_url);
        if let Some(database) = lookup("COUCH_DB").filter(|name| !name.is_empty()) {
            config = config.with_database(database);
        }
        // Credentials only count when both halves are present.
        if let (Some(username), Some(password)) = (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD")) {
            config = config.with_credentials(username, password);
        }
        Ok(config)
    }

    /// URL of the configured database.
    pub(super) fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn database_defaults_to_baby_foot() {
        let config = CouchConfig::from_lookup(lookup(&[("COUCH_BASE_URL", "http://couch:5984/")]))
            .unwrap();
        assert_eq!(config.database_url(), "http://couch:5984/baby_foot");
        assert!(config.credentials.is_none());
    }

    #[test]
    fn credentials_need_both_halves() {
        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_DB", "league"),
            ("COUCH_USERNAME", "referee"),
        ]))
        .unwrap();
        assert_eq!(config.database, "league");
        assert!(config.credentials.is_none());

        let config = config.with_credentials("referee", "secret");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn base_url_is_required() {
        assert!(matches!(
            CouchConfig::from_lookup(lookup(&[])),
            Err(CouchDaoError::MissingEnvVar { var: "COUCH_BASE_URL" })
        ));
    }
}
