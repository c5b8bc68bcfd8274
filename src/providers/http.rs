//! Shared HTTP plumbing for the bundled providers.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::{HuginnError, Result};

/// Client-level timeout; the registry applies its own, usually shorter, one.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn transport_error(e: reqwest::Error) -> HuginnError {
    HuginnError::Http(e.to_string())
}

/// Pass a success response through; map anything else onto [`HuginnError`].
///
/// 401/403 → `AuthenticationFailed`, 404 → `ModelNotFound(subject)`,
/// 429 → `RateLimited` with the `Retry-After` seconds if present,
/// everything else → `Api` with the body as message.
pub(crate) async fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(HuginnError::AuthenticationFailed),
        404 => Err(HuginnError::ModelNotFound(subject.to_owned())),
        429 => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(HuginnError::RateLimited { retry_after })
        }
        code => {
            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                status.to_string()
            } else {
                body.chars().take(500).collect()
            };
            Err(HuginnError::Api {
                status: code,
                message,
            })
        }
    }
}
