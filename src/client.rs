//! The Endeavor session handle.
//!
//! A [`Client`] owns the resolved configuration, an HTTP connection pool and
//! the cached token pair. Every request goes to `/v1/<endpoint>` on the
//! configured host; authenticated requests first make sure a usable access
//! token is cached, exchanging the refresh token or the API key as needed.

use std::sync::{Mutex, PoisonError};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{self, ApiKey, Credentials, RefreshRequest, TokenResponse};
use crate::config::Config;
use crate::consts::{self, API_VERSION};
use crate::error::{Error, Result};
use crate::status::{STATUS, Status};
use crate::url::{is_local_host, parse_base_url, parse_content_type, parse_host, resolve};

/// Read configuration from `ENDEAVOR_URL`, `ENDEAVOR_CLIENT_ID` and
/// `ENDEAVOR_CLIENT_SECRET`, then [`connect_with`] it.
///
/// Missing or empty variables fail with [`Error::Configuration`] before any
/// network traffic.
pub async fn connect() -> Result<Client> {
    connect_with(Config::from_env()?).await
}

/// Build a client and authenticate it right away, so bad credentials or an
/// unreachable server are reported here rather than on first use.
pub async fn connect_with(config: Config) -> Result<Client> {
    let client = Client::new(config)?;
    client.authenticate().await?;
    info!(host = client.host(), "connected to Endeavor");
    Ok(client)
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 204 No Content.
    Empty,
    Json(serde_json::Value),
    /// Any non-JSON content type.
    Bytes(Vec<u8>),
}

impl Payload {
    /// Deserialize a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Payload::Json(value) => serde_json::from_value(value)
                .map_err(|e| Error::MalformedResponse(format!("unexpected JSON shape: {e}"))),
            Payload::Empty => Err(Error::MalformedResponse(
                "expected a JSON body, got no content".to_string(),
            )),
            Payload::Bytes(_) => Err(Error::MalformedResponse(
                "expected a JSON body, got a different content type".to_string(),
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// Session handle for one Endeavor server.
///
/// Meant for a single caller at a time; the token cache is locked only
/// between awaits and is never held across a request.
#[derive(Debug)]
pub struct Client {
    config: Config,
    base: Url,
    http: reqwest::Client,
    creds: Mutex<Option<Credentials>>,
}

impl Client {
    /// Validate `config` and prepare the transport. No network I/O happens
    /// until the first request.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let base = parse_base_url(&config.url)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(consts::ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(consts::ACCEPT_LANG),
        );
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(consts::CONTENT_TYPE),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(consts::user_agent())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            base,
            http,
            creds: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `host[:port]` of the configured server.
    pub fn host(&self) -> &str {
        parse_host(self.base.as_str())
    }

    pub fn is_localhost(&self) -> bool {
        is_local_host(self.host())
    }

    /// A cached access token is present and not expired.
    pub fn is_authenticated(&self) -> bool {
        self.lock_creds()
            .as_ref()
            .is_some_and(Credentials::is_authenticated)
    }

    /// A cached refresh token is present and currently usable.
    pub fn is_refreshable(&self) -> bool {
        self.lock_creds()
            .as_ref()
            .is_some_and(Credentials::is_refreshable)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.lock_creds().clone()
    }

    /// Exchange the API key for a fresh token pair and cache it.
    pub async fn authenticate(&self) -> Result<()> {
        let creds = self.exchange_api_key().await?;
        self.store_creds(creds);
        Ok(())
    }

    /// Query the server's health through an authenticated `GET /v1/status`.
    ///
    /// Any 2xx reply succeeds, whatever its body looks like.
    pub async fn status(&self) -> Result<Status> {
        let payload = self.get(&[STATUS], &[]).await?;
        Ok(Status::from_payload(payload))
    }

    pub async fn get(&self, endpoint: &[&str], query: &[(&str, &str)]) -> Result<Payload> {
        self.request::<()>(Method::GET, None, endpoint, query).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        data: &B,
        endpoint: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Payload> {
        self.request(Method::POST, Some(data), endpoint, query).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        data: &B,
        endpoint: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Payload> {
        self.request(Method::PUT, Some(data), endpoint, query).await
    }

    pub async fn delete(&self, endpoint: &[&str], query: &[(&str, &str)]) -> Result<Payload> {
        self.request::<()>(Method::DELETE, None, endpoint, query).await
    }

    /// Resolve `endpoint` against the API root. Absolute components replace
    /// the path built so far, so `["/v1/agents"]` and `["agents"]` match.
    pub fn endpoint(&self, endpoint: &[&str], query: &[(&str, &str)]) -> Url {
        let mut components = Vec::with_capacity(endpoint.len() + 2);
        components.push("/");
        components.push(API_VERSION);
        components.extend_from_slice(endpoint);
        resolve(&self.base, &components, query)
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        body: Option<&B>,
        endpoint: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Payload> {
        let bearer = self.preflight().await?;
        let url = self.endpoint(endpoint, query);
        self.send(method, url, Some(&bearer), body).await
    }

    /// Make sure a usable access token is cached and return it.
    async fn preflight(&self) -> Result<String> {
        let current = self.credentials();
        if let Some(creds) = &current
            && creds.is_authenticated()
        {
            return Ok(creds.access_token.to_string());
        }

        let creds = match current {
            Some(creds) if creds.is_refreshable() => self.exchange_refresh_token(&creds).await?,
            _ => self.exchange_api_key().await?,
        };
        let token = creds.access_token.to_string();
        self.store_creds(creds);
        Ok(token)
    }

    async fn exchange_api_key(&self) -> Result<Credentials> {
        if self.config.client_id.is_empty() || self.config.client_secret.is_empty() {
            return Err(Error::Authentication(
                "no client id or secret specified".to_string(),
            ));
        }

        debug!(client_id = %self.config.client_id, "authenticating with API key");
        let key = ApiKey {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
        };
        let url = self.endpoint(&[auth::AUTHENTICATE], &[]);
        let rep: TokenResponse = self.send(Method::POST, url, None, Some(&key)).await?.json()?;
        rep.into_credentials()
    }

    async fn exchange_refresh_token(&self, creds: &Credentials) -> Result<Credentials> {
        let refresh = creds
            .refresh_token
            .as_ref()
            .ok_or_else(|| Error::Authentication("no refresh token available".to_string()))?;

        debug!("reauthenticating with refresh token");
        let body = RefreshRequest {
            refresh_token: refresh.as_str(),
        };
        let url = self.endpoint(&[auth::REAUTHENTICATE], &[]);
        let rep: TokenResponse = self
            .send(Method::POST, url, None, Some(&body))
            .await?
            .json()?;
        rep.into_credentials()
    }

    /// One HTTP exchange. Only failures to establish a connection are retried,
    /// up to `max_retries` times.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        bearer: Option<&str>,
        body: Option<&B>,
    ) -> Result<Payload> {
        debug!("{} {}", method, url);

        let mut attempt = 0;
        let resp = loop {
            let mut req = self.http.request(method.clone(), url.clone());
            if let Some(token) = bearer {
                req = req.bearer_auth(token);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            match req.send().await {
                Ok(resp) => break resp,
                Err(e) if e.is_connect() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "connection failed, retrying");
                }
                Err(e) => return Err(Error::Connection(e)),
            }
        };

        self.handle(resp).await
    }

    /// Map a response to a payload or a typed error.
    async fn handle(&self, resp: Response) -> Result<Payload> {
        let code = resp.status().as_u16();
        match code {
            401 | 403 => {
                let body = resp.bytes().await.unwrap_or_default();
                let message = error_field(&body)
                    .unwrap_or_else(|| format!("{code} response from {}", self.host()));
                Err(Error::Authentication(message))
            }
            204 => Ok(Payload::Empty),
            200..=299 => {
                let mime = resp
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| parse_content_type(v).0);
                let body = resp.bytes().await?;
                if mime.as_deref() == Some("application/json") {
                    serde_json::from_slice(&body).map(Payload::Json).map_err(|e| {
                        Error::MalformedResponse(format!("invalid JSON from {}: {e}", self.host()))
                    })
                } else {
                    Ok(Payload::Bytes(body.to_vec()))
                }
            }
            400..=499 => {
                let body = resp.bytes().await?;
                warn!("client error: {} {:?}", code, String::from_utf8_lossy(&body));
                let message = client_error_message(
                    &body,
                    format!("{code} response from {}", self.host()),
                );
                if code == 404 {
                    Err(Error::NotFound(message))
                } else {
                    Err(Error::Client {
                        status: code,
                        message,
                    })
                }
            }
            500..=599 => {
                let body = resp.bytes().await?;
                warn!("server error: {} {:?}", code, String::from_utf8_lossy(&body));
                let message = error_field(&body)
                    .unwrap_or_else(|| format!("{code} response from {}", self.host()));
                Err(Error::Server {
                    status: code,
                    message,
                })
            }
            _ => Err(Error::UnhandledStatus(code)),
        }
    }

    fn lock_creds(&self) -> std::sync::MutexGuard<'_, Option<Credentials>> {
        self.creds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_creds(&self, creds: Credentials) {
        *self.lock_creds() = Some(creds);
    }
}

#[derive(Deserialize)]
struct ErrorReply {
    error: Option<String>,
    #[serde(default)]
    errors: Vec<FieldError>,
}

#[derive(Deserialize)]
struct FieldError {
    #[serde(default)]
    field: String,
    #[serde(default)]
    error: String,
}

fn error_field(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorReply>(body)
        .ok()
        .and_then(|reply| reply.error)
}

/// `error` from the body, followed by one `field: error` line per field error.
fn client_error_message(body: &[u8], default: String) -> String {
    let Ok(reply) = serde_json::from_slice::<ErrorReply>(body) else {
        return default;
    };

    let mut message = reply.error.unwrap_or(default);
    if !reply.errors.is_empty() {
        let lines: Vec<String> = reply
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.error))
            .collect();
        message.push_str(":\n  ");
        message.push_str(&lines.join("\n  "));
    }
    message
}
