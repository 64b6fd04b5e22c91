use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

/// The subset of JWT claims that decide whether a token can be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Expiration, seconds since epoch.
    pub exp: Option<u64>,
    /// Not-before, seconds since epoch.
    pub nbf: Option<u64>,
}

/// A bearer token issued by Endeavor.
///
/// Tokens are usually JWTs; their claims are decoded without verifying the
/// signature, only to avoid sending a token the server will reject. A token
/// whose payload cannot be decoded is treated as opaque and assumed usable
/// until the server says otherwise.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    claims: Option<Claims>,
}

impl Token {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let claims = decode_claims(&raw);
        Self { raw, claims }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Usable at `now` (seconds since epoch).
    pub fn is_valid_at(&self, now: u64) -> bool {
        if self.raw.is_empty() {
            return false;
        }
        match &self.claims {
            None => true,
            Some(claims) => {
                claims.nbf.is_none_or(|nbf| nbf <= now) && claims.exp.is_none_or(|exp| now < exp)
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("raw", &crate::consts::redact(&self.raw))
            .field("claims", &self.claims)
            .finish()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Access/refresh token pair returned by `authenticate` and `reauthenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Token,
    pub refresh_token: Option<Token>,
}

impl Credentials {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access_token: Token::new(access),
            refresh_token: refresh.filter(|r| !r.is_empty()).map(Token::new),
        }
    }

    /// The access token can be sent as-is.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_valid()
    }

    /// The refresh token can be exchanged for a new pair.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_ref().is_some_and(Token::is_valid)
    }
}

fn decode_claims(raw: &str) -> Option<Claims> {
    let mut segments = raw.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build an unsigned JWT with the given claims, for tests.
#[cfg(test)]
pub(crate) fn fake_jwt(exp: u64, nbf: Option<u64>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let mut claims = serde_json::json!({ "sub": "test", "exp": exp });
    if let Some(nbf) = nbf {
        claims["nbf"] = serde_json::json!(nbf);
    }
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
