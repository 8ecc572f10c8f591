//! Delivery of encoded batches to the collector

use async_trait::async_trait;
use metrics_core::protocol::{GZIP_ENCODING, HASH_HEADER};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::encoder::EncodedBatch;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Collector unreachable; worth retrying
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Collector answered {0}")]
    Status(StatusCode),

    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Connect(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &EncodedBatch) -> Result<(), TransportError>;
}

/// POSTs batches to `http://{address}/updates/`
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(address: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: format!("http://{}/updates/", address),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &EncodedBatch) -> Result<(), TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, GZIP_ENCODING)
            .body(batch.body.clone());
        if let Some(hash) = &batch.hash {
            request = request.header(HASH_HEADER, hash.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransportError::Status(status));
        }
        debug!("Delivered {} bytes to {}", batch.body.len(), self.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_url() {
        let transport = HttpTransport::new("localhost:8080", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.url(), "http://localhost:8080/updates/");
    }

    #[test]
    fn test_only_connect_errors_are_transient() {
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(!TransportError::Status(StatusCode::BAD_REQUEST).is_transient());
        assert!(!TransportError::Request("bad".into()).is_transient());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        // nothing listens on the discard port
        let transport = HttpTransport::new("127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let batch = EncodedBatch {
            body: Vec::new(),
            hash: None,
            encrypted: false,
        };
        let err = transport.send(&batch).await.unwrap_err();
        assert!(err.is_transient(), "{:?}", err);
    }
}
