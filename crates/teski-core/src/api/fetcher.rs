//! The network side of the fetch contract.
//!
//! The offline cache controller only talks to the network through the
//! `Fetcher` trait. `ReqwestFetcher` is the production implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::debug;

use super::error::{truncate_body, FetchError};
use crate::models::{HttpRequest, HttpResponse, ResponseType};

/// HTTP request timeout in seconds.
/// Hung requests otherwise stay pending forever; 30s matches the API client.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Response headers captured into `HttpResponse`; everything else is dropped.
const KEPT_HEADERS: &[&str] = &["content-type", "cache-control", "etag", "last-modified"];

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Fetcher backed by a shared reqwest client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    /// Page origin; responses whose final URL shares it are `basic`.
    origin: String,
}

impl ReqwestFetcher {
    pub fn new(origin: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let origin = reqwest::Url::parse(origin)?.origin().ascii_serialization();

        Ok(Self { client, origin })
    }

    fn classify(&self, final_url: &reqwest::Url) -> ResponseType {
        if final_url.origin().ascii_serialization() == self.origin {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                FetchError::Offline(e.to_string())
            } else {
                FetchError::Network(e)
            }
        })?;

        let status = response.status().as_u16();
        let response_type = self.classify(response.url());

        let mut headers = BTreeMap::new();
        for name in KEPT_HEADERS {
            if let Some(value) = response.headers().get(*name) {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.to_string(), value.to_string());
                }
            }
        }

        let body = response.bytes().await?.to_vec();

        if status != 200 {
            debug!(
                url = %request.url,
                status = status,
                body = %truncate_body(&String::from_utf8_lossy(&body)),
                "Non-200 response"
            );
        }

        Ok(HttpResponse {
            status,
            response_type,
            headers,
            body,
        })
    }
}
