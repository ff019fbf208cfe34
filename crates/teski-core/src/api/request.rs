//! Builds requests against the Teski backend.
//!
//! The bearer token is read from the `AuthTokenStore` on every request rather
//! than cached in the builder, so a logout elsewhere takes effect immediately.

use reqwest::Url;
use serde::Serialize;

use super::error::FetchError;
use crate::auth::AuthTokenStore;
use crate::models::HttpRequest;

#[derive(Clone)]
pub struct ApiRequestBuilder {
    base_url: Url,
    tokens: AuthTokenStore,
}

impl ApiRequestBuilder {
    pub fn new(base_url: &str, tokens: AuthTokenStore) -> Result<Self, FetchError> {
        let base_url =
            Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        Ok(Self { base_url, tokens })
    }

    fn url(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path, e)))
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        match self.tokens.token() {
            Some(token) => request.with_header("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }

    pub fn get(&self, path: &str) -> Result<HttpRequest, FetchError> {
        let request = HttpRequest::get(self.url(path)?).with_header("Accept", "application/json");
        Ok(self.authorize(request))
    }

    pub fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<HttpRequest, FetchError> {
        let body = serde_json::to_vec(body).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let request = HttpRequest::new("POST", self.url(path)?)
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json")
            .with_body(body);
        Ok(self.authorize(request))
    }
}
