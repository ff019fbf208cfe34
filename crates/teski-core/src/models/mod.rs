//! Data models shared by the teski subsystems.
//!
//! - `HttpRequest`, `HttpResponse`, `ResponseType`: the fetch contract used by
//!   the offline cache controller
//! - `PracticeRunHistory`, `PracticeRunsChanged`, `date_key`: the practice ledger's day buckets

pub mod http;
pub mod practice;

pub use http::{HttpRequest, HttpResponse, ResponseType};
pub use practice::{date_key, PracticeRunHistory, PracticeRunsChanged};
