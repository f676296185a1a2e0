//! The `vaultoperator_init` data source: whether Vault is initialized.

use crate::error::ProviderError;
use crate::provider::{ApiClient, Block, DataSource, ResourceData, Schema, ValueType};
use crate::vault::init_status;
use async_trait::async_trait;
use tracing::error;

pub const ARG_INITIALIZED: &str = "initialized";

pub struct InitDataSource;

#[async_trait]
impl DataSource for InitDataSource {
    fn schema(&self) -> Block {
        Block::new("Resource for vault operator init").attribute(
            ARG_INITIALIZED,
            Schema::new(ValueType::Bool)
                .computed()
                .description("The current initialization state of Vault."),
        )
    }

    async fn read(&self, d: &mut ResourceData, client: &ApiClient) -> Result<(), ProviderError> {
        d.set_id(client.address());

        let initialized = init_status(&client.vault).await.map_err(|e| {
            error!("failed to read init status from Vault: {}", e);
            e
        })?;

        d.set(ARG_INITIALIZED, initialized)
    }
}
