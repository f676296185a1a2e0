use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::provider::{ApiClient, Diagnostics, Provider, ResourceData, StateOp, RES_INIT};

#[derive(Parser)]
#[command(
    name = "terraform-provider-vaultoperator",
    about = "Runs the vaultoperator provider lifecycle against JSON configuration and state",
    version
)]
pub struct Cli {
    /// Provider block as a JSON object. An empty block is used when omitted.
    #[arg(long, global = true, env = "VAULTOPERATOR_PROVIDER_CONFIG")]
    pub provider_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the provider, resource and data source schemas.
    Schema,
    /// Initialize Vault through the vaultoperator_init resource.
    Create {
        /// Resource arguments as a JSON object.
        #[arg(long)]
        config: PathBuf,
    },
    /// Adopt a saved init response, e.g. file:///path/to/init.json.
    Import {
        #[arg(long)]
        id: String,
    },
    /// Read the vaultoperator_init data source.
    ReadData,
    /// Refresh stored resource state.
    Read {
        #[arg(long)]
        state: PathBuf,
    },
    /// Apply configuration changes to stored resource state.
    Update {
        #[arg(long)]
        state: PathBuf,
    },
    /// Remove the resource from state. Vault itself is left untouched.
    Delete {
        #[arg(long)]
        state: PathBuf,
    },
}

fn read_json(path: &Path) -> Result<Value> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow::anyhow!("{} must contain a JSON object", path.display())),
    }
}

fn print_state(states: &[ResourceData]) -> Result<()> {
    let out = match states {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    println!("{}", out);
    Ok(())
}

fn report(diags: &Diagnostics) {
    for diag in diags.iter() {
        eprintln!("{}", diag);
    }
}

async fn configure(provider: &Provider, path: Option<&Path>) -> Result<ApiClient> {
    let config = match path {
        Some(path) => read_object(path)?,
        None => Map::new(),
    };

    match provider.configure(&config).await {
        Ok((client, warnings)) => {
            report(&warnings);
            info!("Configured provider for Vault at {}", client.address());
            Ok(client)
        }
        Err(diags) => Err(diags.into()),
    }
}

pub async fn run_cli() -> Result<()> {
    run(Cli::parse()).await
}

/// Runs one parsed command. Only lifecycle commands configure the provider.
pub async fn run(cli: Cli) -> Result<()> {
    let provider = Provider::new(env!("CARGO_PKG_VERSION"));
    let provider_config = cli.provider_config.as_deref();

    let states = match cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&provider.schema_json())?);
            return Ok(());
        }
        Commands::Create { config } => {
            let config = read_object(&config)?;
            let client = configure(&provider, provider_config).await?;
            vec![provider.create(RES_INIT, &config, &client).await?]
        }
        Commands::Import { id } => {
            let client = configure(&provider, provider_config).await?;
            provider.import(RES_INIT, &id, &client).await?
        }
        Commands::ReadData => {
            let client = configure(&provider, provider_config).await?;
            vec![provider.read_data_source(RES_INIT, &Map::new(), &client).await?]
        }
        Commands::Read { state } => {
            apply_state(&provider, provider_config, StateOp::Read, &state).await?
        }
        Commands::Update { state } => {
            apply_state(&provider, provider_config, StateOp::Update, &state).await?
        }
        Commands::Delete { state } => {
            apply_state(&provider, provider_config, StateOp::Delete, &state).await?
        }
    };

    print_state(&states)
}

async fn apply_state(
    provider: &Provider,
    provider_config: Option<&Path>,
    op: StateOp,
    state: &Path,
) -> Result<Vec<ResourceData>> {
    let state = read_json(state)?;
    let client = configure(provider, provider_config).await?;
    Ok(vec![provider.apply_state(RES_INIT, op, state, &client).await?])
}
