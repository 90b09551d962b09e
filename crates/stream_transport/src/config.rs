use std::collections::BTreeMap;
use std::time::Duration;

/// Endpoint configuration for opening a chat stream.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Absolute URL the chat request is posted to.
    pub endpoint: String,
    /// Additional headers merged into every request.
    pub headers: BTreeMap<String, String>,
    /// Optional connect timeout. The read loop itself is never timed out.
    pub connect_timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }
}
