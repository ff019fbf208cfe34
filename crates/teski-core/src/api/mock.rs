//! Scripted fetcher used by tests and offline dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::FetchError;
use super::fetcher::Fetcher;
use crate::models::{HttpRequest, HttpResponse};

/// Responds from a URL table. Unknown URLs get a 404; when switched offline
/// every call fails with `FetchError::Offline`. Every attempt is recorded,
/// including the ones that fail.
#[derive(Debug)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, HttpResponse>>,
    online: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set (or replace) the response served for an absolute URL.
    pub fn respond(&self, url: &str, response: HttpResponse) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.insert(url.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// URLs of every fetch attempted so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let url = request.url.to_string();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.clone());

        if !self.online.load(Ordering::SeqCst) {
            return Err(FetchError::Offline(format!("{} unreachable", url)));
        }

        let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(routes
            .get(&url)
            .cloned()
            .unwrap_or_else(|| HttpResponse::basic(404, "not found")))
    }
}
