//! Network access for teski.
//!
//! This module provides the `Fetcher` trait the offline cache controller
//! sends requests through, a reqwest-backed implementation, a scripted
//! `MockFetcher`, and `ApiRequestBuilder` for authenticated backend calls.

pub mod error;
pub mod fetcher;
pub mod mock;
pub mod request;

pub use error::FetchError;
pub use fetcher::{Fetcher, ReqwestFetcher};
pub use mock::MockFetcher;
pub use request::ApiRequestBuilder;
