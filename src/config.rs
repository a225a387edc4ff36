use std::env;

use crate::negotiation::OfferPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub frontend_origin: String,
    pub bind_address: String,
    pub commit_attempts: u32,
    pub offer_policy: OfferPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key/value source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let commit_attempts = match lookup("COMMIT_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or_else(|| ConfigError::Invalid {
                    name: "COMMIT_ATTEMPTS",
                    reason: format!("expected a positive integer, got '{}'", raw),
                })?,
            None => 5,
        };
        let offer_policy = match lookup("OFFER_POLICY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                name: "OFFER_POLICY",
                reason,
            })?,
            None => OfferPolicy::default(),
        };

        Ok(Self {
            mongo_uri: required("MONGO_URI")?,
            database_name: lookup("DATABASE_NAME").unwrap_or_else(|| "skillswap".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            frontend_origin: lookup("FRONTEND_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            commit_attempts,
            offer_policy,
        })
    }
}
