//! Shared HTTP plumbing for store clients.

use reqwest::{Client, Response};
use std::time::Duration;

use crate::credential::StoreKind;
use crate::error::{Result, RotationError};

const USER_AGENT: &str = concat!("envseal/", env!("CARGO_PKG_VERSION"));

/// Longest error-body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 200;

pub(crate) fn client(store: StoreKind, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RotationError::config(format!("{store} HTTP client: {e}")))
}

/// Map a transport error into the taxonomy.
pub(crate) fn transport(store: StoreKind, e: reqwest::Error) -> RotationError {
    let message = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else {
        e.without_url().to_string()
    };
    RotationError::Network { store, message }
}

/// Pass successful responses through; turn everything else into an error.
///
/// 401/403 become [`RotationError::Auth`]; other statuses keep their code so
/// retry classification can see 429 and 5xx.
pub(crate) async fn check(store: StoreKind, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = excerpt(&body, status.canonical_reason().unwrap_or("error"));
    Err(match status.as_u16() {
        401 | 403 => RotationError::Auth {
            store,
            message: format!("{status}: {message}"),
        },
        code => RotationError::ExternalApi {
            store,
            status: Some(code),
            message,
        },
    })
}

/// Decode a JSON body, mapping failures to an API error.
pub(crate) async fn json<T: serde::de::DeserializeOwned>(
    store: StoreKind,
    response: Response,
) -> Result<T> {
    response.json().await.map_err(|e| RotationError::ExternalApi {
        store,
        status: None,
        message: format!("unexpected response body: {}", e.without_url()),
    })
}

fn excerpt(body: &str, fallback: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return fallback.to_string();
    }
    let mut text: String = body.chars().take(MAX_ERROR_BODY).collect();
    if body.chars().count() > MAX_ERROR_BODY {
        text.push('…');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("  ", "Not Found"), "Not Found");
        assert_eq!(excerpt("{\"error\":\"x\"}", "x"), "{\"error\":\"x\"}");
        let long = "a".repeat(500);
        assert_eq!(excerpt(&long, "").chars().count(), MAX_ERROR_BODY + 1);
    }
}
