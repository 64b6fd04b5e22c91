//! Connection summary display for the CLI.

use serde_json::Value;

use crate::consts::{VERSION, redact};
use crate::status::Status;

/// What the CLI knows about the current session.
pub struct BannerInfo<'a> {
    pub endpoint: &'a str,
    pub host: &'a str,
    pub client_id: &'a str,
    pub auth_status: &'a str,
}

/// Render the session summary block.
pub fn render_banner(info: &BannerInfo) -> String {
    format!(
        r#"
   guidelight {}

   endpoint  {}
   host      {}
   client    {}
   auth      {}
"#,
        VERSION,
        info.endpoint,
        info.host,
        redact(info.client_id),
        info.auth_status,
    )
}

pub fn print_banner(info: &BannerInfo) {
    println!("{}", render_banner(info));
}

/// One-line summary of a status report, e.g. `ok (version 1.4.2, up 3h)`.
///
/// A reply without a textual `status` is reported as `reachable`.
pub fn status_line(status: &Status) -> String {
    let mut details = Vec::new();
    if let Some(version) = &status.version {
        details.push(format!("version {version}"));
    }
    match &status.uptime {
        Some(Value::String(uptime)) => details.push(format!("up {uptime}")),
        Some(uptime) => details.push(format!("up {uptime}")),
        None => {}
    }

    let state = status.status.as_deref().unwrap_or("reachable");
    if details.is_empty() {
        state.to_string()
    } else {
        format!("{state} ({})", details.join(", "))
    }
}
