//! Project-wide constants.

use std::time::Duration;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variables read by [`Config::from_env`](crate::config::Config::from_env).
pub const ENV_URL: &str = "ENDEAVOR_URL";
pub const ENV_CLIENT_ID: &str = "ENDEAVOR_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ENDEAVOR_CLIENT_SECRET";

/// API version prefix prepended to every endpoint.
pub const API_VERSION: &str = "v1";

// Default header values
pub const ACCEPT: &str = "application/json";
pub const ACCEPT_LANG: &str = "en-US,en";
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POOL_MAX_IDLE: usize = 16;

pub fn user_agent() -> String {
    format!("guidelight/{VERSION} rust")
}

/// Mask a secret for display, keeping only the first four characters.
pub fn redact(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}
