//! Request and response types exchanged between the host, the offline
//! cache controller, and the network.
//!
//! These are deliberately decoupled from reqwest so the controller can be
//! driven by scripted fetchers in tests.

use std::collections::BTreeMap;

use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Classification of a response's origin, mirroring the fetch `Response.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Basic,
    Default,
    Cors,
    Opaque,
    OpaqueRedirect,
    Error,
}

impl ResponseType {
    /// Same-origin, non-opaque responses.
    pub fn is_same_origin(&self) -> bool {
        matches!(self, ResponseType::Basic | ResponseType::Default)
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: Url,
    /// Header names are stored lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Serialized origin (`scheme://host[:port]`) of the request URL.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Normalized cache key: method plus the URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub response_type: ResponseType,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, response_type: ResponseType, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            response_type,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// A same-origin response, the common case for static assets.
    pub fn basic(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, ResponseType::Basic, body)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Only complete same-origin responses may be written to a cache bucket.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type.is_same_origin()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
