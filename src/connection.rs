//! Connection construction with the builder pattern.
//!
//! The store uses HTTP underneath, so a [`Connection`] holds no socket of
//! its own: it owns the pooled transport handle and hands out cursors that
//! share it. Inserts commit automatically when they succeed; there is no
//! transaction surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use reqwest::Url;

use crate::cursor::Cursor;
use crate::error::{ClickLinkError, Result};
use crate::timeouts::ClickLinkTimeouts;
use crate::transport::HttpTransport;

const DEFAULT_PORT: u16 = 8123;

/// A connection to a columnar store.
///
/// # Examples
///
/// ```rust,no_run
/// use click_link::Connection;
///
/// # async fn example() -> click_link::Result<()> {
/// let connection = Connection::builder()
///     .base_url("http://localhost:8123")
///     .username("default")
///     .build()?;
///
/// let mut cursor = connection.cursor();
/// cursor.select("SELECT count() FROM system.tables").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    transport: Arc<HttpTransport>,
}

impl Connection {
    /// Create a new builder for configuring a connection.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Check that the store is alive and answering.
    pub async fn ping(&self) -> Result<()> {
        self.transport.ping().await
    }

    /// Create a cursor sharing this connection's transport.
    pub fn cursor(&self) -> Cursor<HttpTransport> {
        Cursor::new(Arc::clone(&self.transport))
    }
}

/// Builder for [`Connection`] instances.
pub struct ConnectionBuilder {
    base_url: Option<String>,
    username: String,
    password: String,
    settings: BTreeMap<String, String>,
    timeouts: ClickLinkTimeouts,
    max_retries: u32,
    pool_max_idle: usize,
}

impl ConnectionBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            username: "default".to_string(),
            password: String::new(),
            settings: BTreeMap::new(),
            timeouts: ClickLinkTimeouts::default(),
            max_retries: 3,
            pool_max_idle: 10,
        }
    }

    /// Set the store endpoint. A bare `host` or `host:port` gets an
    /// `http://` scheme, and a missing port defaults to 8123.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the username (default: `default`).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the password (default: empty).
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Add a store setting passed with every request as a query parameter
    /// (e.g. `max_execution_time`).
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Set timeout configuration for all operations.
    pub fn timeouts(mut self, timeouts: ClickLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the retry bound for transient network failures (default: 3).
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the maximum number of idle pooled connections (default: 10).
    pub fn pool_max_idle(mut self, max_idle: usize) -> Self {
        self.pool_max_idle = max_idle;
        self
    }

    /// Build the connection.
    pub fn build(self) -> Result<Connection> {
        let raw = self
            .base_url
            .ok_or_else(|| ClickLinkError::Configuration("base_url is required".into()))?;
        let with_scheme = if raw.contains("://") {
            raw
        } else {
            format!("http://{raw}")
        };
        let mut url = Url::parse(&with_scheme)
            .map_err(|e| ClickLinkError::Configuration(format!("invalid base_url: {e}")))?;
        if url.scheme() == "http" && url.port().is_none() {
            url.set_port(Some(DEFAULT_PORT))
                .map_err(|_| ClickLinkError::Configuration("base_url cannot carry a port".into()))?;
        }
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("user", &self.username);
            pairs.append_pair("password", &self.password);
            for (key, value) in &self.settings {
                pairs.append_pair(key, value);
            }
        }
        debug!("[CONNECTION] configured endpoint {}", url.origin().ascii_serialization());

        // Idle connections outlive the server's keep-alive window slightly,
        // so a warm pool is reused across cursors.
        let client = reqwest::Client::builder()
            .timeout(self.timeouts.receive_timeout)
            .connect_timeout(self.timeouts.connection_timeout)
            .pool_max_idle_per_host(self.pool_max_idle)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .map_err(|e| ClickLinkError::Configuration(e.to_string()))?;

        Ok(Connection {
            transport: Arc::new(HttpTransport::new(url, client, self.max_retries)),
        })
    }
}
