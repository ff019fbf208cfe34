//! Authentication state.
//!
//! The bearer token for backend calls is persisted in the injected
//! `KeyValueStore` rather than held in a module-level variable.

pub mod token;

pub use token::{AuthTokenStore, AUTH_TOKEN_KEY};
