use serde_json::{Map, Value};

use crate::client::Payload;

/// Endpoint queried by [`Client::status`](crate::Client::status).
pub const STATUS: &str = "status";

/// Health report returned by `GET /v1/status`.
///
/// Any successful reply counts: the server was reached and accepted the
/// credentials. Fields are picked out of a JSON object when they have the
/// expected type; everything else stays in `extra`, and the undecoded reply
/// is kept in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub status: Option<String>,
    pub version: Option<String>,
    pub uptime: Option<Value>,
    pub extra: Map<String, Value>,
    pub raw: Payload,
}

impl Status {
    pub fn from_payload(raw: Payload) -> Self {
        let mut extra = match &raw {
            Payload::Json(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        let status = take_string(&mut extra, "status");
        let version = take_string(&mut extra, "version");
        let uptime = extra.remove("uptime");

        Self {
            status,
            version,
            uptime,
            extra,
            raw,
        }
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(_)) => match map.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}
