use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = concat!("uplink/", env!("CARGO_PKG_VERSION"));

/// Configurable options for the HTTP upload transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for the entire HTTP request
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers sent with every upload
    pub headers: HeaderMap,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,

    /// Size of the body chunks handed to the connection; one progress update
    /// is emitted per chunk
    pub chunk_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: TransportConfig::get_default_headers(),
            use_system_proxy: true,
            chunk_size: 64 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn builder() -> crate::builder::TransportConfigBuilder {
        crate::builder::TransportConfigBuilder::new()
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        default_headers
    }
}

/// What `start` does when the fingerprint already has a live upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum RestartPolicy {
    /// Register the new upload over the old one. The old transport keeps
    /// running but is no longer reachable through the registry.
    #[default]
    Replace,
    /// Return the live handle and do not start a new transport
    ReuseExisting,
    /// Cancel the live upload's transport, then register the new one
    CancelAndReplace,
}

/// Which handles react to a cancellation broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum CancelScope {
    /// Every live handle is suspended by any cancel
    #[default]
    Global,
    /// Only the handle whose fingerprint was cancelled is suspended
    PerKey,
}

/// Configuration of the upload registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub restart_policy: RestartPolicy,
    pub cancel_scope: CancelScope,
    /// Capacity of the cancellation and lifecycle broadcast channels
    pub broadcast_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            restart_policy: RestartPolicy::default(),
            cancel_scope: CancelScope::default(),
            broadcast_capacity: 16,
        }
    }
}

impl RegistryConfig {
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_cancel_scope(mut self, scope: CancelScope) -> Self {
        self.cancel_scope = scope;
        self
    }
}

/// Per-upload request options
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub method: Method,
    pub headers: HeaderMap,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            method: Method::POST,
            headers: HeaderMap::new(),
        }
    }
}

impl UploadOptions {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}
