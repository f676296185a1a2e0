//! Common test fixtures for provider integration tests.
//!
//! `MockVault` serves the `sys/init` endpoints from an in-process actix-web
//! server bound to an ephemeral port, so lifecycle tests run without Docker.
//! `VaultFixture` starts a real, uninitialized Vault with Testcontainers for the
//! ignored acceptance tests.
#![allow(dead_code)]

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Mutex;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use vaultoperator::provider::{ApiClient, Provider};

pub fn setup_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Converts a `json!` literal into a configuration block.
pub fn block(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[derive(Default)]
pub struct MockState {
    pub initialized: bool,
    pub init_calls: usize,
    pub last_request: Option<Value>,
}

type SharedState = web::Data<Mutex<MockState>>;

pub struct MockVault {
    addr: String,
    state: SharedState,
    handle: ServerHandle,
}

impl MockVault {
    /// Starts the mock on the current actix system.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let state: SharedState = web::Data::new(Mutex::new(MockState::default()));
        let data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/v1/sys/init", web::get().to(init_status))
                .route("/v1/sys/init", web::put().to(init))
                .route("/v1/sys/init", web::post().to(init))
        })
        .workers(1)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        actix_rt::spawn(server);

        MockVault {
            addr,
            state,
            handle,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn initialized(&self) -> bool {
        self.state.lock().unwrap().initialized
    }

    pub fn init_calls(&self) -> usize {
        self.state.lock().unwrap().init_calls
    }

    pub fn last_request(&self) -> Option<Value> {
        self.state.lock().unwrap().last_request.clone()
    }

    /// Configures `provider` against this mock.
    pub async fn client(&self, provider: &Provider) -> ApiClient {
        let config = block(json!({ "vault_addr": self.addr }));
        let (client, diags) = provider
            .configure_with_env(&config, &HashMap::<String, String>::new())
            .await
            .unwrap();
        assert!(diags.is_empty(), "unexpected diagnostics: {}", diags);
        client
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

async fn init_status(state: SharedState) -> impl Responder {
    let initialized = state.lock().unwrap().initialized;
    HttpResponse::Ok().json(json!({ "initialized": initialized }))
}

async fn init(state: SharedState, body: web::Json<Value>) -> impl Responder {
    let mut state = state.lock().unwrap();
    state.init_calls += 1;
    state.last_request = Some(body.0.clone());

    if state.initialized {
        return HttpResponse::BadRequest().json(json!({
            "errors": ["Vault is already initialized"]
        }));
    }

    let shares = body.0["secret_shares"].as_u64().unwrap_or_default();
    let threshold = body.0["secret_threshold"].as_u64().unwrap_or_default();
    if shares == 0 || threshold == 0 || threshold > shares {
        return HttpResponse::BadRequest().json(json!({
            "errors": ["invalid seal configuration: threshold cannot be larger than shares"]
        }));
    }

    state.initialized = true;

    let raw: Vec<Vec<u8>> = (1..=shares).map(|i| vec![i as u8; 32]).collect();
    let keys: Vec<String> = raw
        .iter()
        .map(|k| k.iter().map(|b| format!("{:02x}", b)).collect())
        .collect();
    let keys_base64: Vec<String> = raw.iter().map(|k| STANDARD.encode(k)).collect();

    HttpResponse::Ok().json(json!({
        "keys": keys,
        "keys_base64": keys_base64,
        "root_token": format!("s.mock{}", shares),
    }))
}

/// An uninitialized Vault server (file storage, TLS disabled).
pub struct VaultFixture {
    container: ContainerAsync<GenericImage>,
    port: u16,
}

impl VaultFixture {
    pub async fn new() -> Self {
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
            .unwrap();

        let port = container.get_host_port_ipv4(8200.tcp()).await.unwrap();

        VaultFixture { container, port }
    }

    pub fn addr(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}
