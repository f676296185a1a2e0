//! The `vaultoperator_init` resource.
//!
//! Create runs Vault's one-time initialization and keeps the returned secrets
//! in state. Vault never hands the unseal keys out again and cannot be
//! de-initialized, so Read, Update and Delete only touch local state.
//!
//! Import adopts the output of an out-of-band `vault operator init`: the id is
//! a `file://` URL of a JSON document shaped like Vault's init response.

use crate::error::{ImportError, ProviderError};
use crate::k8s::portforward;
use crate::k8s::signal::cancel_on_signal;
use crate::provider::{ApiClient, Block, ResourceData, Resource, Schema, ValueType};
use crate::vault::{init_vault, InitRequest, InitResponse};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const ARG_SECRET_SHARES: &str = "secret_shares";
pub const ARG_SECRET_THRESHOLD: &str = "secret_threshold";
pub const ARG_RECOVERY_SHARES: &str = "recovery_shares";
pub const ARG_RECOVERY_THRESHOLD: &str = "recovery_threshold";
pub const ARG_PGP_KEYS: &str = "pgp_keys";
pub const ARG_ROOT_TOKEN_PGP_KEY: &str = "root_token_pgp_key";
pub const ARG_RECOVERY_PGP_KEYS: &str = "recovery_pgp_keys";
pub const ARG_ROOT_TOKEN: &str = "root_token";
pub const ARG_KEYS: &str = "keys";
pub const ARG_KEYS_BASE64: &str = "keys_base64";
pub const ARG_RECOVERY_KEYS: &str = "recovery_keys";
pub const ARG_RECOVERY_KEYS_BASE64: &str = "recovery_keys_base64";

pub struct InitResource;

#[async_trait]
impl Resource for InitResource {
    fn schema(&self) -> Block {
        let secret_set = |description: &str| {
            Schema::strings(ValueType::Set)
                .computed()
                .sensitive()
                .description(description)
        };

        Block::new("Resource for vault operator init")
            .attribute(
                ARG_SECRET_SHARES,
                Schema::new(ValueType::Int)
                    .required()
                    .description("Specifies the number of shares to split the master key into."),
            )
            .attribute(
                ARG_SECRET_THRESHOLD,
                Schema::new(ValueType::Int).required().description(
                    "Specifies the number of shares required to reconstruct the master key.",
                ),
            )
            .attribute(
                ARG_RECOVERY_SHARES,
                Schema::new(ValueType::Int)
                    .optional()
                    .description("Specifies the number of shares to split the recovery key into."),
            )
            .attribute(
                ARG_RECOVERY_THRESHOLD,
                Schema::new(ValueType::Int).optional().description(
                    "Specifies the number of shares required to reconstruct the recovery key.",
                ),
            )
            .attribute(
                ARG_PGP_KEYS,
                Schema::strings(ValueType::List).optional().description(
                    "Base64 PGP public keys used to encrypt the unseal keys, one per share.",
                ),
            )
            .attribute(
                ARG_ROOT_TOKEN_PGP_KEY,
                Schema::new(ValueType::String)
                    .optional()
                    .description("Base64 PGP public key used to encrypt the root token."),
            )
            .attribute(
                ARG_RECOVERY_PGP_KEYS,
                Schema::strings(ValueType::List)
                    .optional()
                    .description("Base64 PGP public keys used to encrypt the recovery keys."),
            )
            .attribute(
                ARG_ROOT_TOKEN,
                Schema::new(ValueType::String)
                    .computed()
                    .sensitive()
                    .description("The Vault Root Token."),
            )
            .attribute(ARG_KEYS, secret_set("The unseal keys."))
            .attribute(ARG_KEYS_BASE64, secret_set("The unseal keys, base64 encoded."))
            .attribute(ARG_RECOVERY_KEYS, secret_set("The recovery keys"))
            .attribute(
                ARG_RECOVERY_KEYS_BASE64,
                secret_set("The recovery keys, base64 encoded."),
            )
    }

    async fn create(&self, d: &mut ResourceData, client: &ApiClient) -> Result<(), ProviderError> {
        let request = init_request(d);

        // Held until Create returns; dropping it tears the tunnel down.
        let _forward = match &client.kube {
            Some(kube) => {
                let token = CancellationToken::new();
                cancel_on_signal(token.clone());
                let forward = portforward::establish(kube, token.clone())
                    .await
                    .map_err(|e| {
                        error!("failed to establish port-forward: {}", e);
                        token.cancel();
                        e
                    })?;
                Some(scopeguard::guard(forward, |forward| {
                    debug!("Closing port-forward on {}", forward.local_addr());
                    forward.close();
                }))
            }
            None => None,
        };

        let response = init_vault(&client.vault, &request).await?;
        info!("Vault at {} initialized", client.address());

        update_state(d, client.address(), &response).map_err(|e| {
            error!("failed to update state: {}", e);
            e
        })
    }

    async fn read(&self, _d: &mut ResourceData, _client: &ApiClient) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn update(
        &self,
        _d: &mut ResourceData,
        _client: &ApiClient,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn delete(
        &self,
        _d: &mut ResourceData,
        _client: &ApiClient,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn import(
        &self,
        mut d: ResourceData,
        client: &ApiClient,
    ) -> Result<Vec<ResourceData>, ProviderError> {
        let id = d.id().unwrap_or_default().to_string();
        let response = read_init_file(&id).map_err(|e| {
            error!("import of {:?} failed: {}", id, e);
            e
        })?;

        update_state(&mut d, client.address(), &response)?;
        Ok(vec![d])
    }
}

/// Builds the init request from resource arguments, applying recovery defaults.
pub fn init_request(d: &ResourceData) -> InitRequest {
    InitRequest {
        secret_shares: d.get_int(ARG_SECRET_SHARES),
        secret_threshold: d.get_int(ARG_SECRET_THRESHOLD),
        recovery_shares: d.get_int(ARG_RECOVERY_SHARES),
        recovery_threshold: d.get_int(ARG_RECOVERY_THRESHOLD),
        pgp_keys: d.get_string_list(ARG_PGP_KEYS),
        root_token_pgp_key: d.get_string(ARG_ROOT_TOKEN_PGP_KEY),
        recovery_pgp_keys: d.get_string_list(ARG_RECOVERY_PGP_KEYS),
    }
    .with_recovery_defaults()
}

/// Resolves a `file://` import id to a local path.
///
/// The URL host, if any, is treated as the first path segment so relative
/// paths such as `file://init.json` keep working. Percent-escapes are decoded.
pub fn import_path(id: &str) -> Result<PathBuf, ImportError> {
    let invalid = |reason: String| ImportError::InvalidId {
        id: id.to_string(),
        reason,
    };

    let url = Url::parse(id).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "file" {
        return Err(ImportError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url.host_str().unwrap_or_default();
    let path = format!("{}{}", host, url.path());
    let decoded = percent_decode_str(&path)
        .decode_utf8()
        .map_err(|e| invalid(e.to_string()))?;
    Ok(PathBuf::from(decoded.as_ref()))
}

fn read_init_file(id: &str) -> Result<InitResponse, ImportError> {
    let path = import_path(id)?;
    debug!("Reading init response from {}", path.display());
    let contents = std::fs::read(&path).map_err(|source| ImportError::Read {
        path: path.clone(),
        source,
    })?;
    Ok(serde_json::from_slice(&contents)?)
}

fn update_state(d: &mut ResourceData, id: &str, res: &InitResponse) -> Result<(), ProviderError> {
    d.set_id(id);
    d.set(ARG_ROOT_TOKEN, res.root_token.clone())?;
    d.set(ARG_KEYS, res.keys.clone())?;
    d.set(ARG_KEYS_BASE64, res.keys_base64.clone())?;
    d.set(ARG_RECOVERY_KEYS, res.recovery_keys.clone())?;
    d.set(ARG_RECOVERY_KEYS_BASE64, res.recovery_keys_base64.clone())?;
    Ok(())
}
