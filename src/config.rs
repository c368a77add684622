use crate::auth::AuthConfig;
use std::collections::HashMap;
use std::env;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATABASE: &str = "OpenSplit";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You need to add the {0} to the env")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    /// No URI means the in-memory store is used.
    pub mongodb_uri: Option<String>,
    pub database_name: String,
    pub cors_origin: Option<String>,
    pub auth: AuthConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let bot_token = require("BOT_API_TOKEN")?;
        let max_age_secs = get("AUTH_MAX_AGE_SECS")
            .map(|value| {
                value
                    .parse::<i64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ConfigError::Invalid {
                        name: "AUTH_MAX_AGE_SECS",
                        value,
                    })
            })
            .transpose()?;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            mongodb_uri: get("MONGODB_URI"),
            database_name: get("DATABASE_NAME").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            cors_origin: get("CORS_ORIGIN"),
            auth: AuthConfig {
                bot_token,
                max_age_secs,
            },
        })
    }
}
