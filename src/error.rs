use thiserror::Error;

/// Everything that can go wrong talking to Endeavor.
#[derive(Error, Debug)]
pub enum Error {
    /// A required setting is missing, empty, or unusable. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The server rejected the credentials (401/403) or no usable token exists.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The request never completed: DNS, refused connection, timeout, TLS.
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// The server answered with a body that could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("unhandled status code {0}")]
    UnhandledStatus(u16),
}

impl Error {
    /// True for transport failures and undecodable replies.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::MalformedResponse(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }

    /// True for every 4xx reply, including 401/403 and 404.
    pub fn is_client(&self) -> bool {
        matches!(
            self,
            Error::Client { .. } | Error::NotFound(_) | Error::Authentication(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
