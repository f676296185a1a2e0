// src/main.rs
use tracing_subscriber::EnvFilter;
use vaultoperator::cli;

#[tokio::main]
async fn main() {
    // stdout carries state, so logs go to stderr.
    let filter = EnvFilter::try_from_env("TF_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = cli::run_cli().await {
        match err.downcast_ref::<vaultoperator::Diagnostics>() {
            Some(diags) => eprintln!("{}", diags),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}
