//! Decides which requests must never touch the offline cache.
//!
//! Dynamic and authenticated traffic always goes straight to the network;
//! serving it stale would be wrong, and sharing it through a cache would leak
//! it. Only same-origin, unauthenticated GETs of static paths are cacheable.

use std::fmt;

use crate::models::HttpRequest;

/// API routes matched at the start of the path.
pub const API_PATH_PREFIXES: &[&str] = &[
    "/api/",
    "/ex",
    "/tasks",
    "/integrations/",
    "/study",
    "/push",
];

/// API routes matched anywhere in the path.
pub const API_PATH_SUBSTRINGS: &[&str] = &[
    "/onboarding/",
    "/analytics/",
    "/auth",
    "/persona",
    "/feedback",
    "/exercises",
    "/estimates",
    "/reminders",
    "/leaderboards",
    "/memory",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BypassReason {
    NonGet(String),
    CrossOrigin,
    BackendHost,
    ApiPath,
    Authorized,
}

impl fmt::Display for BypassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BypassReason::NonGet(method) => write!(f, "{} request", method),
            BypassReason::CrossOrigin => write!(f, "cross-origin"),
            BypassReason::BackendHost => write!(f, "backend host"),
            BypassReason::ApiPath => write!(f, "api path"),
            BypassReason::Authorized => write!(f, "authorization header"),
        }
    }
}

pub fn is_api_path(path: &str) -> bool {
    API_PATH_PREFIXES.iter().any(|p| path.starts_with(p))
        || API_PATH_SUBSTRINGS.iter().any(|s| path.contains(s))
}

#[derive(Debug, Clone)]
pub struct BypassPolicy {
    /// Serialized page origin, e.g. `https://app.teski.fi`.
    origin: String,
    backend_host_tokens: Vec<String>,
}

impl BypassPolicy {
    pub fn new(origin: String, backend_host_tokens: Vec<String>) -> Self {
        Self {
            origin,
            backend_host_tokens,
        }
    }

    fn is_backend_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.backend_host_tokens
            .iter()
            .any(|token| !token.is_empty() && host.contains(&token.to_ascii_lowercase()))
    }

    /// Why `request` must skip the cache, or `None` if it may be cached.
    pub fn bypass_reason(&self, request: &HttpRequest) -> Option<BypassReason> {
        if request.method != "GET" {
            return Some(BypassReason::NonGet(request.method.clone()));
        }
        if request.origin() != self.origin {
            return Some(BypassReason::CrossOrigin);
        }
        if request
            .url
            .host_str()
            .map(|host| self.is_backend_host(host))
            .unwrap_or(false)
        {
            return Some(BypassReason::BackendHost);
        }
        if is_api_path(request.url.path()) {
            return Some(BypassReason::ApiPath);
        }
        if request.has_header("authorization") {
            return Some(BypassReason::Authorized);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use super::*;

    const ORIGIN: &str = "https://app.teski.test";

    fn policy() -> BypassPolicy {
        BypassPolicy::new(
            ORIGIN.to_string(),
            vec!["onrender.com".to_string(), "fly.dev".to_string()],
        )
    }

    fn get(url: &str) -> HttpRequest {
        HttpRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_static_assets_are_cacheable() {
        let policy = policy();
        for path in ["/", "/index.html", "/favicon.svg", "/assets/app-4f2a.js", "/manifest.webmanifest"] {
            assert_eq!(policy.bypass_reason(&get(&format!("{}{}", ORIGIN, path))), None, "{}", path);
        }
    }

    #[test]
    fn test_api_prefixes_bypass() {
        for path in ["/api/tasks", "/ex/today", "/tasks", "/tasks/12", "/integrations/moodle", "/study/plan", "/push/subscribe", "/exercises"] {
            assert!(is_api_path(path), "{}", path);
        }
    }

    #[test]
    fn test_api_substrings_bypass_anywhere() {
        for path in [
            "/v2/onboarding/step",
            "/v2/analytics/weekly",
            "/user/auth/refresh",
            "/me/persona",
            "/x/feedback",
            "/course/exercises/3",
            "/course/estimates",
            "/me/reminders",
            "/leaderboards",
            "/deck/memory/review",
            "/memory",
        ] {
            assert!(is_api_path(path), "{}", path);
        }
        assert!(!is_api_path("/assets/studying.png"));
        assert!(!is_api_path("/assets/task-icon.svg"));
    }

    #[test]
    fn test_non_get_bypasses() {
        let request = HttpRequest::new("post", Url::parse(&format!("{}/index.html", ORIGIN)).unwrap());
        assert_eq!(
            policy().bypass_reason(&request),
            Some(BypassReason::NonGet("POST".to_string()))
        );
    }

    #[test]
    fn test_cross_origin_bypasses() {
        assert_eq!(
            policy().bypass_reason(&get("https://cdn.example.test/font.woff2")),
            Some(BypassReason::CrossOrigin)
        );
        // Same host on another port is another origin.
        assert_eq!(
            policy().bypass_reason(&get("https://app.teski.test:8443/index.html")),
            Some(BypassReason::CrossOrigin)
        );
    }

    #[test]
    fn test_backend_host_bypasses_even_same_origin() {
        let policy = BypassPolicy::new(
            "https://teski-api.onrender.com".to_string(),
            vec!["onrender.com".to_string()],
        );
        assert_eq!(
            policy.bypass_reason(&get("https://teski-api.onrender.com/logo.svg")),
            Some(BypassReason::BackendHost)
        );
    }

    #[test]
    fn test_authorization_header_bypasses() {
        let request = get(&format!("{}/favicon.svg", ORIGIN)).with_header("Authorization", "Bearer t");
        assert_eq!(policy().bypass_reason(&request), Some(BypassReason::Authorized));
    }
}
