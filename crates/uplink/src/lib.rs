//! # Uplink
//!
//! A client-side coordination layer for network uploads. Every request is
//! identified by a fingerprint derived from its URL and parameters, and that
//! fingerprint keys both a payload cache and a registry of in-flight uploads.
//!
//! ## Features
//!
//! - Deterministic request fingerprints with excludable dynamic parameters
//! - Memory and file backed cache with lazy expiry
//! - Upload registry reachable by re-deriving a request's fingerprint
//! - Progress fan-out, cancellation broadcast and lifecycle handling
//! - reqwest transport with chunked progress reporting

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod upload;

pub use builder::TransportConfigBuilder;
pub use cache::{CacheConfig, CacheEntry, CacheStore, Expiry};
pub use config::{CancelScope, RegistryConfig, RestartPolicy, TransportConfig, UploadOptions};
pub use error::{CacheError, KeyError, TransportError, UplinkError};
pub use key::{Fingerprint, RequestIdentity, RequestParams, derive_key};

// Re-export upload types
pub use upload::{
    HttpTransport, LifecycleEvent, MultipartPayload, UploadBody, UploadHandle, UploadOutcome,
    UploadRegistry, UploadStatus, UploadTransport,
};
