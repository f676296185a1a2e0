//! Helpers for checking Vault initialization status

use crate::vault::{VaultClient, VaultError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct InitStatus {
    pub initialized: bool,
}

/// Queries `GET /v1/sys/init` and reports whether Vault is initialized.
pub async fn init_status(client: &VaultClient) -> Result<bool, VaultError> {
    debug!("Requesting init status from {}", client.address());

    let status: InitStatus = client.get("/v1/sys/init").await.map_err(|e| {
        info!("Failed to read init status from {}: {}", client.address(), e);
        e
    })?;

    debug!("Vault initialized={}", status.initialized);
    Ok(status.initialized)
}
