//! Timeout configuration for click-link client operations.

use std::time::Duration;

/// Timeout configuration for HTTP operations against the store.
///
/// # Examples
///
/// ```rust
/// use click_link::ClickLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = ClickLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = ClickLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .receive_timeout(Duration::from_secs(300))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ClickLinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Timeout for a whole request, including receiving the response body.
    /// Long-running queries and bulk inserts are bounded by this value.
    /// Default: 30 seconds
    pub receive_timeout: Duration,
}

impl Default for ClickLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(30),
        }
    }
}

impl ClickLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> ClickLinkTimeoutsBuilder {
        ClickLinkTimeoutsBuilder::new()
    }

    /// Timeouts optimized for fast local development against localhost.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            receive_timeout: Duration::from_secs(5),
        }
    }

    /// Timeouts suitable for heavy analytical queries or bulk loads over
    /// high-latency networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            receive_timeout: Duration::from_secs(600),
        }
    }
}

/// Builder for [`ClickLinkTimeouts`].
#[derive(Debug, Clone)]
pub struct ClickLinkTimeoutsBuilder {
    timeouts: ClickLinkTimeouts,
}

impl ClickLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: ClickLinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS handshake).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the connection timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the whole-request timeout.
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.receive_timeout = timeout;
        self
    }

    /// Set the whole-request timeout in seconds.
    pub fn receive_timeout_secs(self, secs: u64) -> Self {
        self.receive_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> ClickLinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = ClickLinkTimeouts::default();
        assert_eq!(timeouts.connection_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.receive_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let timeouts = ClickLinkTimeouts::builder()
            .connection_timeout_secs(60)
            .receive_timeout_secs(120)
            .build();

        assert_eq!(timeouts.connection_timeout, Duration::from_secs(60));
        assert_eq!(timeouts.receive_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_presets() {
        assert!(ClickLinkTimeouts::fast().receive_timeout < ClickLinkTimeouts::default().receive_timeout);
        assert!(ClickLinkTimeouts::relaxed().receive_timeout > ClickLinkTimeouts::default().receive_timeout);
    }
}
