//! Transport abstraction and the HTTP implementation.
//!
//! The store speaks a plain HTTP protocol: every operation is a POST whose
//! body is the command text, optionally followed by a newline and a raw
//! payload (bulk insert bodies). The [`Transport`] trait is the seam the
//! codec and reconciler layers are built against; tests script it.

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use reqwest::Url;

use crate::error::{ClickLinkError, Result};

/// Executes one command against the store and returns the raw response body.
pub trait Transport: Send + Sync {
    /// Send `command` (plus an optional raw payload) and wait for the
    /// response body.
    fn execute(
        &self,
        command: String,
        payload: Option<Vec<u8>>,
    ) -> impl Future<Output = Result<Bytes>> + Send;
}

/// HTTP transport over a pooled reqwest client.
pub struct HttpTransport {
    pub(crate) url: Url,
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpTransport {
    pub(crate) fn new(url: Url, client: reqwest::Client, max_retries: u32) -> Self {
        Self {
            url,
            client,
            max_retries,
        }
    }

    /// Liveness probe: GET the store root and expect its `Ok.` body.
    pub(crate) async fn ping(&self) -> Result<()> {
        let mut url = self.url.clone();
        url.set_query(None);
        let response = self.client.get(url).send().await?;
        let body = response.bytes().await?;
        if body.as_ref() == b"Ok.\n" {
            Ok(())
        } else {
            Err(ClickLinkError::Network(format!(
                "store at {} is not responding",
                self.url.origin().ascii_serialization()
            )))
        }
    }

    fn is_retriable(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        command: String,
        payload: Option<Vec<u8>>,
    ) -> impl Future<Output = Result<Bytes>> + Send {
        async move {
            let body = {
                let mut buf = BytesMut::with_capacity(
                    command.len() + payload.as_ref().map_or(0, |p| p.len() + 1),
                );
                buf.extend_from_slice(command.as_bytes());
                if let Some(payload) = &payload {
                    buf.extend_from_slice(b"\n");
                    buf.extend_from_slice(payload);
                }
                buf.freeze()
            };

            let mut retries = 0;
            loop {
                debug!(
                    "[HTTP] POST {} bytes (attempt {}/{})",
                    body.len(),
                    retries + 1,
                    self.max_retries + 1
                );
                let request = self.client.post(self.url.clone()).body(body.clone());
                match request.send().await {
                    Ok(response) => {
                        let status = response.status();
                        if status.is_success() {
                            return Ok(response.bytes().await?);
                        }
                        let message = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "unknown server error".to_string());
                        warn!("[HTTP] server error: status={status} message=\"{message}\"");
                        return Err(ClickLinkError::Server {
                            status_code: status.as_u16(),
                            message,
                        });
                    }
                    Err(e) if retries < self.max_retries && Self::is_retriable(&e) => {
                        warn!(
                            "[HTTP] retriable error (attempt {}/{}): {e}",
                            retries + 1,
                            self.max_retries + 1
                        );
                        retries += 1;
                        tokio::time::sleep(Duration::from_millis(100 * u64::from(retries))).await;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}
