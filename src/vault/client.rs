//! Client implementation for Vault API interactions.
//!
//! This module provides a client for making HTTP requests to the Vault API
//! with the provider's custom headers and TLS settings applied.

use crate::vault::common::process_response;
use crate::vault::VaultError;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method, Url,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Options applied to every request the client makes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientOptions {
    /// Skip TLS certificate verification.
    pub skip_verify: bool,
    /// Custom headers to add to requests.
    pub request_headers: BTreeMap<String, String>,
}

/// Client for interacting with the Vault HTTP API.
#[derive(Debug, Clone)]
pub struct VaultClient {
    /// The address exactly as configured.
    addr: String,
    /// `addr` without a trailing `/`, used to build request URLs.
    base: String,
    client: Client,
}

impl VaultClient {
    /// Creates a new VaultClient bound to `addr`.
    ///
    /// The address must be an absolute `http` or `https` URL.
    pub fn new(addr: &str, options: &ClientOptions) -> Result<Self, VaultError> {
        let url = Url::parse(addr)
            .map_err(|e| VaultError::InvalidAddress(addr.to_string(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VaultError::InvalidAddress(
                addr.to_string(),
                format!("unsupported scheme {:?}", url.scheme()),
            ));
        }

        let client = Client::builder()
            .danger_accept_invalid_certs(options.skip_verify)
            .default_headers(header_map(&options.request_headers))
            .build()?;

        Ok(Self {
            addr: addr.to_string(),
            base: addr.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The address this client is bound to, as configured.
    pub fn address(&self) -> &str {
        &self.addr
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Makes a GET request to the Vault API.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, VaultError> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    /// Makes a PUT request to the Vault API with a JSON body.
    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, VaultError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, VaultError> {
        let url = self.endpoint(path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(json_body) = body {
            request = request.json(json_body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::Network(format!("Request to {} failed: {}", url, e)))?;

        process_response(response).await
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(header_name), Ok(header_value)) => {
                map.insert(header_name, header_value);
            }
            _ => warn!("Ignoring invalid request header {:?}", name),
        }
    }
    map
}
