pub mod credentials;

pub use credentials::{Claims, Credentials, Token};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Endpoint that exchanges an API key for a token pair.
pub const AUTHENTICATE: &str = "authenticate";

/// Endpoint that exchanges a refresh token for a new token pair.
pub const REAUTHENTICATE: &str = "reauthenticate";

/// Body of `POST /v1/authenticate`.
#[derive(Serialize)]
pub struct ApiKey<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Body of `POST /v1/reauthenticate`.
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Reply to both token exchanges.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    pub fn into_credentials(self) -> Result<Credentials> {
        if self.access_token.is_empty() {
            return Err(Error::Authentication(
                "server returned an empty access token".to_string(),
            ));
        }
        Ok(Credentials::new(self.access_token, self.refresh_token))
    }
}
