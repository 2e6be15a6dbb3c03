// src/core/urls.rs

//! Endpoint parsing and the http <-> websocket scheme conversions used when a
//! session needs both a request endpoint and a streaming endpoint.

use crate::core::SyncError;
use url::Url;

/// A validated endpoint in both of its forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub http: Url,
    pub ws: Url,
}

impl Endpoint {
    /// Parses a user-supplied endpoint. Only `http`, `https`, `ws` and `wss`
    /// are accepted; anything else is a configuration error.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SyncError::Config("endpoint cannot be empty".to_string()));
        }
        let url = Url::parse(raw)
            .map_err(|e| SyncError::Config(format!("malformed endpoint '{raw}': {e}")))?;
        if url.host_str().is_none() {
            return Err(SyncError::Config(format!("endpoint '{raw}' has no host")));
        }
        let http = get_http_url(url.as_str()).map_err(into_config)?;
        let ws = get_ws_url(url.as_str()).map_err(into_config)?;
        Ok(Self {
            http: Url::parse(&http)?,
            ws: Url::parse(&ws)?,
        })
    }
}

fn into_config(e: SyncError) -> SyncError {
    match e {
        SyncError::InvalidUrl(msg) => SyncError::Config(msg),
        other => other,
    }
}

/// Converts an `http(s)` URL into its `ws(s)` counterpart.
pub fn http_to_ws(url: &str) -> Result<String, SyncError> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "https" => with_scheme(url, &parsed, "wss"),
        "http" => with_scheme(url, &parsed, "ws"),
        _ => Err(SyncError::InvalidUrl(format!(
            "'{url}' is not an http or https URL"
        ))),
    }
}

/// Returns the websocket form of `url`, converting from http(s) if needed.
pub fn get_ws_url(url: &str) -> Result<String, SyncError> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(url.to_string()),
        "http" | "https" => http_to_ws(url),
        other => Err(SyncError::InvalidUrl(format!(
            "unsupported scheme '{other}' in '{url}'"
        ))),
    }
}

/// Returns the http form of `url`, converting from ws(s) if needed.
pub fn get_http_url(url: &str) -> Result<String, SyncError> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        "wss" => with_scheme(url, &parsed, "https"),
        "ws" => with_scheme(url, &parsed, "http"),
        other => Err(SyncError::InvalidUrl(format!(
            "unsupported scheme '{other}' in '{url}'"
        ))),
    }
}

/// Swaps the scheme of `raw`, whose parsed form is `parsed`.
///
/// Input written as `scheme://rest` (in any letter case) keeps `rest`
/// verbatim. Anything else the parser accepted, such as `wss:host`, is
/// rebuilt from its normalized form.
fn with_scheme(raw: &str, parsed: &Url, scheme: &str) -> Result<String, SyncError> {
    let prefix_len = parsed.scheme().len() + "://".len();
    if let Some((prefix, rest)) = raw.split_at_checked(prefix_len) {
        let expected = format!("{}://", parsed.scheme());
        if prefix.eq_ignore_ascii_case(&expected) {
            return Ok(format!("{scheme}://{rest}"));
        }
    }
    let mut rebuilt = parsed.clone();
    rebuilt.set_scheme(scheme).map_err(|_| {
        SyncError::InvalidUrl(format!("cannot switch '{raw}' to the {scheme} scheme"))
    })?;
    Ok(rebuilt.into())
}
