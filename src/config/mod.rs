//! Connection settings for an Endeavor client.
//!
//! The process environment is only consulted by [`Config::from_env`]; the
//! connector itself always takes an explicit [`Config`].

use std::time::Duration;

use crate::consts::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_POOL_MAX_IDLE, DEFAULT_REQUEST_TIMEOUT, ENV_CLIENT_ID,
    ENV_CLIENT_SECRET, ENV_URL, redact,
};
use crate::error::{Error, Result};

/// Base URL, API key, and transport options.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    /// Retries for failures to establish a connection. Requests that reached
    /// the server are never retried.
    pub max_retries: u32,
}

impl Config {
    pub fn new(
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE,
            max_retries: 0,
        }
    }

    /// Load `ENDEAVOR_URL`, `ENDEAVOR_CLIENT_ID` and `ENDEAVOR_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the three required settings through `lookup`, which maps an
    /// environment variable name to its value.
    ///
    /// Fails on the first variable that is unset or blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                Some(_) => Err(Error::Configuration(format!("{key} is empty"))),
                None => Err(Error::Configuration(format!("{key} is not set"))),
            }
        };

        Ok(Self::new(
            required(ENV_URL)?,
            required(ENV_CLIENT_ID)?,
            required(ENV_CLIENT_SECRET)?,
        ))
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Check the invariants a connection attempt relies on.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            (ENV_URL, &self.url),
            (ENV_CLIENT_ID, &self.client_id),
            (ENV_CLIENT_SECRET, &self.client_secret),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{name} is empty")));
            }
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(Error::Configuration(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// Keep the secret out of logs and panic messages.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
