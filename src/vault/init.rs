//! Vault initialization.
//!
//! Wraps `PUT /v1/sys/init`, which generates the root key, splits it into
//! unseal (or recovery) shares and issues the initial root token.

use crate::vault::{VaultClient, VaultError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error};

const INIT_PATH: &str = "/v1/sys/init";

/// Request body for Vault initialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InitRequest {
    pub secret_shares: i64,
    pub secret_threshold: i64,
    pub recovery_shares: i64,
    pub recovery_threshold: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pgp_keys: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub root_token_pgp_key: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recovery_pgp_keys: Vec<String>,
}

impl InitRequest {
    pub fn new(secret_shares: i64, secret_threshold: i64) -> Self {
        Self {
            secret_shares,
            secret_threshold,
            ..Default::default()
        }
    }

    /// Recovery shares and threshold left at zero take the secret values.
    pub fn with_recovery_defaults(mut self) -> Self {
        if self.recovery_shares == 0 {
            self.recovery_shares = self.secret_shares;
        }
        if self.recovery_threshold == 0 {
            self.recovery_threshold = self.secret_threshold;
        }
        self
    }
}

/// Response returned from Vault initialization.
///
/// This is also the shape of the JSON document accepted by resource import.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitResponse {
    /// Unseal keys generated during initialization, hex encoded.
    #[serde(default)]
    pub keys: Vec<String>,

    /// Unseal keys in Base64 format (PGP-encrypted when PGP keys were given).
    #[serde(default)]
    pub keys_base64: Vec<String>,

    /// Recovery keys, used in auto-unseal mode.
    #[serde(default)]
    pub recovery_keys: Vec<String>,

    /// Recovery keys in Base64 format.
    #[serde(default)]
    pub recovery_keys_base64: Vec<String>,

    /// Root token for the initialized Vault.
    pub root_token: String,
}

impl fmt::Debug for InitResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitResponse")
            .field("keys", &self.keys.len())
            .field("keys_base64", &self.keys_base64.len())
            .field("recovery_keys", &self.recovery_keys.len())
            .field("recovery_keys_base64", &self.recovery_keys_base64.len())
            .field("root_token", &"<redacted>")
            .finish()
    }
}

/// Initializes a Vault server.
///
/// The request is sent once; the init endpoint is not safe to retry after
/// shares have been generated.
pub async fn init_vault(
    client: &VaultClient,
    request: &InitRequest,
) -> Result<InitResponse, VaultError> {
    debug!(
        secret_shares = request.secret_shares,
        secret_threshold = request.secret_threshold,
        recovery_shares = request.recovery_shares,
        recovery_threshold = request.recovery_threshold,
        pgp_keys = request.pgp_keys.len(),
        "Initializing Vault at {}",
        client.address()
    );

    let response: InitResponse = client.put(INIT_PATH, request).await.map_err(|e| {
        error!("Failed to initialize Vault: {}", e);
        match e {
            VaultError::Api(msg) if msg.contains("already initialized") => {
                VaultError::AlreadyInitialized
            }
            other => other,
        }
    })?;

    debug!("response: {:?}", response);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::test_utils::{setup_vault_container, vault_addr};
    use crate::vault::ClientOptions;

    #[test]
    fn test_recovery_defaults_apply_when_zero() {
        let req = InitRequest::new(5, 3).with_recovery_defaults();
        assert_eq!(req.recovery_shares, 5);
        assert_eq!(req.recovery_threshold, 3);
    }

    #[test]
    fn test_recovery_values_override_defaults() {
        let req = InitRequest {
            recovery_shares: 2,
            recovery_threshold: 1,
            ..InitRequest::new(5, 3)
        }
        .with_recovery_defaults();
        assert_eq!(req.recovery_shares, 2);
        assert_eq!(req.recovery_threshold, 1);
    }

    #[test]
    fn test_request_omits_empty_pgp_fields() {
        let body = serde_json::to_value(InitRequest::new(1, 1).with_recovery_defaults()).unwrap();
        let obj = body.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        assert!(!obj.contains_key("pgp_keys"));
        assert!(!obj.contains_key("root_token_pgp_key"));
    }

    #[test]
    fn test_response_tolerates_missing_recovery_keys() {
        let res: InitResponse =
            serde_json::from_str(r#"{"keys":["ab"],"keys_base64":["qw=="],"root_token":"s.x"}"#)
                .unwrap();
        assert_eq!(res.keys, vec!["ab"]);
        assert!(res.recovery_keys.is_empty());
        assert!(res.recovery_keys_base64.is_empty());
    }

    #[test]
    fn test_response_debug_redacts_secrets() {
        let res = InitResponse {
            keys: vec!["deadbeef".into()],
            root_token: "s.secret".into(),
            ..Default::default()
        };
        let out = format!("{:?}", res);
        assert!(!out.contains("deadbeef"));
        assert!(!out.contains("s.secret"));
    }

    #[tokio::test]
    #[ignore]
    async fn test_init_vault_with_real_vault() -> Result<(), Box<dyn std::error::Error>> {
        let container = setup_vault_container().await;
        let client = VaultClient::new(&vault_addr(&container).await?, &ClientOptions::default())?;

        let res = init_vault(&client, &InitRequest::new(3, 2).with_recovery_defaults()).await?;
        assert_eq!(res.keys.len(), 3);
        assert_eq!(res.keys_base64.len(), 3);
        assert!(!res.root_token.is_empty());

        let again = init_vault(&client, &InitRequest::new(3, 2).with_recovery_defaults()).await;
        assert!(matches!(again, Err(VaultError::AlreadyInitialized)));
        Ok(())
    }
}
