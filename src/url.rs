//! Base URL parsing and endpoint resolution.

use std::collections::HashMap;

use url::Url;

use crate::error::{Error, Result};

/// Parse a configured base URL.
///
/// A URL without a scheme gets `http` for local hosts and `https` otherwise,
/// so `localhost:8000` and `endeavor.example.com` both work.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Configuration("no Endeavor URL has been configured".to_string()));
    }

    let candidate = if split_scheme(raw).is_some() {
        raw.to_string()
    } else {
        let scheme = if is_local_host(parse_host(raw)) {
            "http"
        } else {
            "https"
        };
        format!("{scheme}://{raw}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| Error::Configuration(format!("invalid Endeavor URL {raw:?}: {e}")))?;
    if url.host_str().is_none() {
        return Err(Error::Configuration(format!(
            "Endeavor URL {raw:?} has no host"
        )));
    }
    Ok(url)
}

/// Extract `host[:port]` from a URL string, with or without a scheme.
pub fn parse_host(raw: &str) -> &str {
    let rest = split_scheme(raw).map_or(raw, |(_, rest)| rest);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let netloc = &rest[..end];
    // Drop userinfo if present
    match netloc.rsplit_once('@') {
        Some((_, host)) => host,
        None => netloc,
    }
}

/// Split `scheme://rest`, counting only a `://` that comes before the path,
/// query or fragment.
fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let sep = raw.find("://")?;
    if raw[..sep].contains(['/', '?', '#']) {
        return None;
    }
    Some((&raw[..sep], &raw[sep + 3..]))
}

/// True for `localhost` and `*.local`, ignoring any port.
pub fn is_local_host(host: &str) -> bool {
    let name = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    name == "localhost" || name.ends_with(".local")
}

/// Join `components` onto the path of `base` and merge `query` into its query string.
///
/// Path components follow POSIX join rules: an absolute component discards
/// everything before it. A query key that already exists on `base` has all
/// its values replaced; new keys are appended in order.
pub fn resolve(base: &Url, components: &[&str], query: &[(&str, &str)]) -> Url {
    let mut path = base.path().to_string();
    for component in components {
        if component.starts_with('/') {
            path = component.to_string();
        } else if path.is_empty() || path.ends_with('/') {
            path.push_str(component);
        } else {
            path.push('/');
            path.push_str(component);
        }
    }

    let mut params: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in base.query_pairs() {
        match params.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into_owned()),
            None => params.push((key.into_owned(), vec![value.into_owned()])),
        }
    }
    for (key, value) in query {
        match params.iter_mut().find(|(k, _)| k.as_str() == *key) {
            Some((_, values)) => *values = vec![value.to_string()],
            None => params.push((key.to_string(), vec![value.to_string()])),
        }
    }

    let mut url = base.clone();
    url.set_path(&path);
    if params.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, values) in &params {
            for value in values {
                pairs.append_pair(key, value);
            }
        }
    }
    url
}

/// Split a `Content-Type` header into its lowercase mime type and parameters.
pub fn parse_content_type(value: &str) -> (String, HashMap<String, String>) {
    let mut parts = value.split(';');
    let mime = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let params = parts
        .filter_map(|part| {
            let (key, val) = part.split_once('=')?;
            let val = val.trim().trim_matches('"');
            Some((key.trim().to_ascii_lowercase(), val.to_string()))
        })
        .collect();
    (mime, params)
}
