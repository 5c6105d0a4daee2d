//! Offline cache proxy for the site's assets and pages.
//!
//! - [`CacheController`] owns the install/activate lifecycle and routes each
//!   GET through one of three strategies picked from its path
//! - [`CacheStorage`] backends hold versioned namespaces of responses
//! - `FetchTransport` is the network underneath, [`HttpTransport`] in prod

mod controller;
mod storage;
mod strategy;
mod traits;
mod transport;

pub use controller::{CacheController, CacheNames};
pub use storage::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use traits::Request;
pub use transport::HttpTransport;
