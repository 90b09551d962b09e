use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::config::TransportConfig;
use crate::error::{status_message, TransportError};
use crate::handle::ReadHandle;

/// Raw byte chunks as they arrive from the wire.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct StreamClient {
    http: Client,
    config: TransportConfig,
}

impl StreamClient {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Posts `body` and returns the response body as a chunk stream.
    ///
    /// Non-success statuses are turned into [`TransportError::Status`] with the
    /// server's error message when one can be extracted.
    pub async fn open(&self, body: &Value, handle: &ReadHandle) -> Result<ChunkStream, TransportError> {
        let url = Url::parse(&self.config.endpoint)
            .map_err(|error| TransportError::InvalidEndpoint(format!("{}: {error}", self.config.endpoint)))?;

        let mut request = self
            .http
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(body);
        for (key, value) in &self.config.headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|error| {
                TransportError::InvalidHeader {
                    name: key.clone(),
                    reason: error.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|error| {
                TransportError::InvalidHeader {
                    name: key.clone(),
                    reason: error.to_string(),
                }
            })?;
            request = request.header(name, value);
        }

        let response = await_or_abort(request.send(), handle).await??;
        let status = response.status();
        if !status.is_success() {
            let body = await_or_abort(response.text(), handle)
                .await?
                .unwrap_or_default();
            return Err(TransportError::Status {
                status,
                message: status_message(status, &body),
            });
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from));
        Ok(Box::pin(chunks))
    }
}

/// Awaits `future` unless `handle` is aborted first.
///
/// The abort flag has no waker, so it is polled between short timeouts.
pub async fn await_or_abort<F>(future: F, handle: &ReadHandle) -> Result<F::Output, TransportError>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if handle.is_aborted() {
            return Err(TransportError::Aborted);
        }

        if let Ok(output) = tokio::time::timeout(ABORT_POLL_INTERVAL, &mut future).await {
            if handle.is_aborted() {
                return Err(TransportError::Aborted);
            }
            return Ok(output);
        }
    }
}
