use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::{Proxy, StatusCode};
use thiserror::Error;

/// Default timeout for HTTP requests in seconds
pub const DEFAULT_TIMEOUT: u64 = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("response exceeds {0} bytes")]
    TooLarge(u64),

    #[error("fetch cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag shared between a caller and a compilation
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Body and (lowercased) headers of a successful fetch
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub body: String,
    pub headers: HashMap<String, String>,
}

/// Outbound HTTP collaborator
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, cancel: &CancelFlag) -> Result<FetchResponse, FetchError>;
}

/// Options for the blocking HTTP fetcher
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub user_agent: String,
    /// Upstream proxy, e.g. `http://127.0.0.1:7890`
    pub proxy: Option<String>,
    pub max_download_size: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            user_agent: "subcompiler".to_string(),
            proxy: None,
            max_download_size: 32 * 1024 * 1024,
        }
    }
}

/// `reqwest` based fetcher with a bounded timeout
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_download_size: u64,
}

impl HttpFetcher {
    pub fn new(options: &FetchOptions) -> Result<Self, FetchError> {
        let mut client_builder = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone());

        if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.is_empty()) {
            match Proxy::all(proxy) {
                Ok(proxy) => client_builder = client_builder.proxy(proxy),
                Err(e) => return Err(FetchError::Network(format!("Failed to set proxy: {}", e))),
            }
        }

        let client = client_builder
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpFetcher {
            client,
            max_download_size: options.max_download_size,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, cancel: &CancelFlag) -> Result<FetchResponse, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        debug!("Fetching {}", url);

        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let mut bytes = Vec::new();
        response
            .take(self.max_download_size + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| FetchError::Network(format!("Failed to read response body: {}", e)))?;
        if bytes.len() as u64 > self.max_download_size {
            return Err(FetchError::TooLarge(self.max_download_size));
        }

        // Cancellation may have been requested while the request was in flight
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        Ok(FetchResponse {
            body: String::from_utf8_lossy(&bytes).into_owned(),
            headers,
        })
    }
}
