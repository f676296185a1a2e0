//! Common helper functions for Vault responses.

use crate::vault::VaultError;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Process an HTTP response and deserialize it to the specified type.
/// Non-2xx responses are turned into the most specific `VaultError` available.
pub async fn process_response<T: DeserializeOwned>(response: Response) -> Result<T, VaultError> {
    let status = response.status();

    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            return Err(VaultError::Parsing("No content received".to_string()));
        }

        let body = response.text().await?;
        return parse_body(&body);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status.as_u16(), &body))
}

/// Deserializes a successful response body.
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, VaultError> {
    Ok(serde_json::from_str(body)?)
}

/// Builds an error from a failed Vault response body.
///
/// Vault reports failures as `{"errors": ["..."]}`; the first message is used
/// verbatim. Anything else falls back to the raw status and body.
pub fn error_from_body(status: u16, body: &str) -> VaultError {
    if let Ok(val) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = val
            .get("errors")
            .and_then(|v| v.as_array())
            .and_then(|errors| errors.first())
            .and_then(|first| first.as_str())
        {
            return VaultError::Api(msg.to_string());
        }
    }

    VaultError::HttpStatus(status, body.to_string())
}
