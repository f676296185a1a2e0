//! The `vaultoperator` provider.
//!
//! [`Provider::new`] composes the provider schema, the `vaultoperator_init`
//! resource and the `vaultoperator_init` data source. The host configures the
//! provider once per run to obtain an [`ApiClient`] and then dispatches
//! lifecycle calls against it. Every failure reaches the host as
//! [`Diagnostics`], carrying the underlying error message unchanged.

pub mod config;
pub mod data;
pub mod data_source;
pub mod diag;
pub mod resource_init;
pub mod schema;

pub use config::{AddressSource, ApiClient, ProviderConfig, ReadEnv, SystemEnv};
pub use data::ResourceData;
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use schema::{Block, Elem, Schema, ValueType};

use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

pub const PROVIDER: &str = "vaultoperator";
pub const RES_INIT: &str = "vaultoperator_init";

pub const ARG_VAULT_URL: &str = "vault_url";
pub const ARG_VAULT_ADDR: &str = "vault_addr";
pub const ARG_VAULT_SKIP_VERIFY: &str = "vault_skip_verify";
pub const ARG_REQUEST_HEADERS: &str = "request_headers";
pub const ARG_KUBE_CONFIG: &str = "kube_config";
pub const ARG_KUBE_CONFIG_PATH: &str = "path";
pub const ARG_NAMESPACE: &str = "namespace";
pub const ARG_SERVICE_NAME: &str = "service";
pub const ARG_LOCAL_PORT: &str = "local_port";
pub const ARG_REMOTE_PORT: &str = "remote_port";
pub const ARG_EXEC: &str = "exec";

/// Lifecycle of a managed resource.
#[async_trait]
pub trait Resource: Send + Sync {
    fn schema(&self) -> Block;

    async fn create(&self, d: &mut ResourceData, client: &ApiClient) -> Result<(), ProviderError>;

    async fn read(&self, d: &mut ResourceData, client: &ApiClient) -> Result<(), ProviderError>;

    async fn update(&self, d: &mut ResourceData, client: &ApiClient) -> Result<(), ProviderError>;

    async fn delete(&self, d: &mut ResourceData, client: &ApiClient) -> Result<(), ProviderError>;

    /// Builds state for an existing object from the id alone.
    async fn import(
        &self,
        d: ResourceData,
        client: &ApiClient,
    ) -> Result<Vec<ResourceData>, ProviderError>;
}

/// A read-only data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn schema(&self) -> Block;

    async fn read(&self, d: &mut ResourceData, client: &ApiClient) -> Result<(), ProviderError>;
}

struct Registered<T: ?Sized> {
    schema: Arc<Block>,
    imp: Box<T>,
}

/// Which state-only lifecycle step to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOp {
    Read,
    Update,
    Delete,
}

pub struct Provider {
    version: String,
    schema: Arc<Block>,
    resources: BTreeMap<&'static str, Registered<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Registered<dyn DataSource>>,
}

impl Provider {
    pub fn new(version: impl Into<String>) -> Self {
        let mut resources: BTreeMap<&'static str, Registered<dyn Resource>> = BTreeMap::new();
        let init = resource_init::InitResource;
        resources.insert(
            RES_INIT,
            Registered {
                schema: Arc::new(init.schema()),
                imp: Box::new(init),
            },
        );

        let mut data_sources: BTreeMap<&'static str, Registered<dyn DataSource>> = BTreeMap::new();
        let init_data = data_source::InitDataSource;
        data_sources.insert(
            RES_INIT,
            Registered {
                schema: Arc::new(init_data.schema()),
                imp: Box::new(init_data),
            },
        );

        Self {
            version: version.into(),
            schema: Arc::new(provider_schema()),
            resources,
            data_sources,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn schema(&self) -> &Block {
        &self.schema
    }

    pub fn resource_schema(&self, name: &str) -> Option<Arc<Block>> {
        self.resources.get(name).map(|r| r.schema.clone())
    }

    pub fn data_source_schema(&self, name: &str) -> Option<Arc<Block>> {
        self.data_sources.get(name).map(|r| r.schema.clone())
    }

    /// Checks the provider, resource and data source schemas for inconsistent
    /// declarations.
    pub fn internal_validate(&self) -> Result<(), String> {
        self.schema
            .validate()
            .map_err(|e| format!("provider: {}", e))?;
        for (name, res) in &self.resources {
            res.schema.validate().map_err(|e| format!("resource {}: {}", name, e))?;
        }
        for (name, ds) in &self.data_sources {
            ds.schema.validate().map_err(|e| format!("data source {}: {}", name, e))?;
        }
        Ok(())
    }

    /// All schemas as one JSON document.
    pub fn schema_json(&self) -> Value {
        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|(name, r)| (name.to_string(), json!(*r.schema)))
            .collect();
        let data_sources: Map<String, Value> = self
            .data_sources
            .iter()
            .map(|(name, d)| (name.to_string(), json!(*d.schema)))
            .collect();
        json!({
            "version": self.version,
            "provider": *self.schema,
            "resource_schemas": resources,
            "data_source_schemas": data_sources,
        })
    }

    /// Configures the provider from the process environment.
    pub async fn configure(
        &self,
        config: &Map<String, Value>,
    ) -> Result<(ApiClient, Diagnostics), Diagnostics> {
        self.configure_with_env(config, &SystemEnv).await
    }

    /// Configures the provider; on success returns the client together with
    /// any warnings.
    pub async fn configure_with_env<E: ReadEnv>(
        &self,
        config: &Map<String, Value>,
        env: &E,
    ) -> Result<(ApiClient, Diagnostics), Diagnostics> {
        let mut diags = Diagnostics::new();
        let result = async {
            let d = ResourceData::from_config(self.schema.clone(), config)?;
            let resolved = ProviderConfig::resolve(&d, env, &mut diags)?;
            ApiClient::connect(resolved).await
        }
        .await;

        match result {
            Ok(client) => Ok((client, diags)),
            Err(e) => {
                error!("provider configuration failed: {}", e);
                diags.extend(e.into());
                Err(diags)
            }
        }
    }

    fn registered_resource(&self, name: &str) -> Result<&Registered<dyn Resource>, Diagnostics> {
        self.resources
            .get(name)
            .ok_or_else(|| unknown("resource type", name))
    }

    /// Runs Create for a resource of type `name` with the given configuration.
    pub async fn create(
        &self,
        name: &str,
        config: &Map<String, Value>,
        client: &ApiClient,
    ) -> Result<ResourceData, Diagnostics> {
        let res = self.registered_resource(name)?;
        let mut d = ResourceData::from_config(res.schema.clone(), config)?;
        debug!("create {}", name);
        res.imp.create(&mut d, client).await?;
        Ok(d)
    }

    /// Runs Read, Update or Delete against previously stored state.
    pub async fn apply_state(
        &self,
        name: &str,
        op: StateOp,
        state: Value,
        client: &ApiClient,
    ) -> Result<ResourceData, Diagnostics> {
        let res = self.registered_resource(name)?;
        let mut d = ResourceData::from_state(res.schema.clone(), state)?;
        debug!("{:?} {}", op, name);
        match op {
            StateOp::Read => res.imp.read(&mut d, client).await?,
            StateOp::Update => res.imp.update(&mut d, client).await?,
            StateOp::Delete => res.imp.delete(&mut d, client).await?,
        }
        Ok(d)
    }

    /// Runs the importer of resource type `name` for `id`.
    pub async fn import(
        &self,
        name: &str,
        id: &str,
        client: &ApiClient,
    ) -> Result<Vec<ResourceData>, Diagnostics> {
        let res = self.registered_resource(name)?;
        let d = ResourceData::with_id(res.schema.clone(), id);
        debug!("import {} {}", name, id);
        Ok(res.imp.import(d, client).await?)
    }

    /// Reads data source `name`.
    pub async fn read_data_source(
        &self,
        name: &str,
        config: &Map<String, Value>,
        client: &ApiClient,
    ) -> Result<ResourceData, Diagnostics> {
        let ds = self
            .data_sources
            .get(name)
            .ok_or_else(|| unknown("data source", name))?;
        let mut d = ResourceData::from_config(ds.schema.clone(), config)?;
        ds.imp.read(&mut d, client).await?;
        Ok(d)
    }
}

fn unknown(kind: &str, name: &str) -> Diagnostics {
    let mut diags = Diagnostics::new();
    diags.error(format!("unknown {} {:?}", kind, name));
    diags
}

/// Schema of the provider block.
pub fn provider_schema() -> Block {
    let exec = Block::new("")
        .attribute("api_version", Schema::new(ValueType::String).required())
        .attribute("command", Schema::new(ValueType::String).required())
        .attribute("env", Schema::strings(ValueType::Map).optional())
        .attribute("args", Schema::strings(ValueType::List).optional());

    let kube_config = Block::new("")
        .attribute(
            ARG_KUBE_CONFIG_PATH,
            Schema::new(ValueType::String)
                .optional()
                .description("Full path to a Kubernetes config")
                .default("~/.kube/config"),
        )
        .attribute(
            ARG_NAMESPACE,
            Schema::new(ValueType::String)
                .optional()
                .description("Kubernetes namespace where HC Vault is run"),
        )
        .attribute(
            ARG_SERVICE_NAME,
            Schema::new(ValueType::String)
                .optional()
                .description("Kubernetes service name of Vault"),
        )
        .attribute(
            ARG_LOCAL_PORT,
            Schema::new(ValueType::String)
                .optional()
                .description("Local forward port")
                .default("8200"),
        )
        .attribute(
            ARG_REMOTE_PORT,
            Schema::new(ValueType::String)
                .optional()
                .description("Remote service port to forward")
                .default("8200"),
        )
        .attribute(
            ARG_EXEC,
            Schema::new(ValueType::List)
                .optional()
                .max_items(1)
                .elem(Elem::Block(exec)),
        );

    Block::new("")
        .attribute(
            ARG_VAULT_URL,
            Schema::new(ValueType::String)
                .optional()
                .description("Vault instance URL")
                .deprecated(format!(
                    "{:?} is deprecated, please use {:?} instead",
                    ARG_VAULT_URL, ARG_VAULT_ADDR
                )),
        )
        .attribute(
            ARG_VAULT_ADDR,
            Schema::new(ValueType::String)
                .optional()
                .description("Vault instance URL"),
        )
        .attribute(
            ARG_VAULT_SKIP_VERIFY,
            Schema::new(ValueType::Bool)
                .optional()
                .description("Skip TLS verification of the Vault server certificate"),
        )
        .attribute(
            ARG_REQUEST_HEADERS,
            Schema::strings(ValueType::Map).optional(),
        )
        .attribute(
            ARG_KUBE_CONFIG,
            Schema::new(ValueType::List)
                .optional()
                .max_items(1)
                .elem(Elem::Block(kube_config)),
        )
}
