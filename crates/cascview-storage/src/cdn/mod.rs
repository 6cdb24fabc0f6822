//! CDN access
//!
//! Blobs are content addressed:
//!
//! ```text
//! http://<host>/<path>/data/<k0k1>/<k2k3>/<key>          archives and loose blobs
//! http://<host>/<path>/data/<k0k1>/<k2k3>/<key>.index    archive indices
//! http://<host>/<path>/config/<k0k1>/<k2k3>/<key>        build and CDN configs
//! ```
//!
//! Keys are lowercase hex. Hosts are tried in order until one answers.

mod cache;
mod client;
mod transport;

pub use cache::{CacheMeta, CdnCache};
pub use client::{CdnClient, ContentKind};
pub use transport::{CdnResponse, CdnTransport, HttpTransport};
