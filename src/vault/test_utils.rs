use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tracing::info;

/// Starts an uninitialized Vault server (file storage, TLS disabled).
pub async fn setup_vault_container() -> ContainerAsync<GenericImage> {
    let vault_local_config = r#"
    {"storage": {"file": {"path": "/vault/file"}},
     "listener": [{"tcp": { "address": "0.0.0.0:8200", "tls_disable": true}}],
     "disable_mlock": true}
    "#;

    let container = GenericImage::new("hashicorp/vault", "1.18.4")
        .with_exposed_port(8200.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Vault server started!"))
        .with_env_var("VAULT_LOCAL_CONFIG", vault_local_config)
        .with_cmd(vec!["server"])
        .start()
        .await
        .expect("Failed to start container");
    info!("Vault container started");
    container
}

/// The host-reachable address of a container started by `setup_vault_container`.
pub async fn vault_addr(
    container: &ContainerAsync<GenericImage>,
) -> Result<String, Box<dyn std::error::Error>> {
    let port = container.get_host_port_ipv4(8200.tcp()).await?;
    Ok(format!("http://127.0.0.1:{}", port))
}
