//! Host APIs for system interactions.
//!
//! Probes never touch the network, the keychain or the filesystem directly;
//! they go through these abstractions carried by the
//! [`ProbeContext`](crate::context::ProbeContext).

pub mod files;
pub mod http;
pub mod keychain;
pub mod redact;
pub mod sqlite;

pub use files::FileSystem;
pub use http::{HttpApi, HttpClient, HttpRequest, HttpResponse, Method};
pub use keychain::{KeychainApi, SystemKeychain};
pub use sqlite::SqliteClient;
