//! A client for building task-oriented AI systems that integrate with Endeavor.
//!
//! ```no_run
//! # async fn run() -> guidelight::Result<()> {
//! let client = guidelight::connect().await?;
//! let status = client.status().await?;
//! println!("{:?}", status.status);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod banner;
pub mod client;
pub mod config;
pub mod consts;
pub mod error;
pub mod spinner;
pub mod status;
pub mod url;

pub use client::{Client, Payload, connect, connect_with};
pub use config::Config;
pub use error::{Error, Result};
pub use status::Status;
