//! # Builder for TransportConfig
//!
//! Fluent construction of [`TransportConfig`] instances.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use uplink_engine::TransportConfig;
//!
//! let config = TransportConfig::builder()
//!     .with_timeout(Duration::from_secs(120))
//!     .with_connect_timeout(Duration::from_secs(15))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .with_chunk_size(16 * 1024)
//!     .build();
//!
//! assert_eq!(config.chunk_size, 16 * 1024);
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::TransportConfig;

/// Builder for creating TransportConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    /// Set the overall timeout for the entire HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout (time to establish initial connection)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set whether to follow redirects
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Merge a set of headers, replacing defaults with the same name
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set whether to use system proxy settings
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        self.config.use_system_proxy = use_system_proxy;
        self
    }

    /// Set the size of body chunks, which is also the progress granularity
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size.max(1);
        self
    }

    /// Build the final TransportConfig
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

impl Default for TransportConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = TransportConfigBuilder::new()
            .with_timeout(Duration::from_secs(5))
            .with_follow_redirects(false)
            .with_header("X-Token", "abc")
            .with_header("bad header", "ignored")
            .with_chunk_size(0)
            .build();

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.follow_redirects);
        assert_eq!(config.headers.get("x-token").unwrap(), "abc");
        assert!(config.headers.get("bad header").is_none());
        assert_eq!(config.chunk_size, 1);
        assert!(config.headers.contains_key(reqwest::header::ACCEPT));
    }
}
