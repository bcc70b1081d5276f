//! Transport for the sync call.

use std::future::Future;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::error::SyncError;
use super::protocol::{decode_sync_response, encode_sync_request, SyncArgs, SyncReply};

/// Sends one `T.Sync` request and returns the server's reply.
///
/// Implementations must not retry on their own; the engine decides that.
pub trait SyncTransport: Send + Sync {
    fn sync(&self, args: &SyncArgs) -> impl Future<Output = Result<SyncReply, SyncError>> + Send;
}

/// JSON-RPC over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// Builds a transport for `endpoint`. A missing or malformed endpoint is a
    /// configuration error; nothing is sent.
    pub fn new(endpoint: Option<&str>, timeout: Duration) -> Result<Self, SyncError> {
        let endpoint = endpoint
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                SyncError::Configuration(
                    "no sync endpoint; set sync.endpoint in config or PUNCH_SYNC_URL".into(),
                )
            })?;

        reqwest::Url::parse(endpoint).map_err(|e| {
            SyncError::Configuration(format!("invalid sync endpoint '{}': {}", endpoint, e))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SyncTransport for HttpTransport {
    async fn sync(&self, args: &SyncArgs) -> Result<SyncReply, SyncError> {
        let body = encode_sync_request(args)?;

        tracing::debug!(endpoint = %self.endpoint, bytes = body.len(), "sending sync request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "server returned HTTP {}",
                status
            )));
        }

        let bytes = response.bytes().await?;
        decode_sync_response(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SyncArgs {
        SyncArgs::new("jorg", "secret", 0, &[], &[])
    }

    #[test]
    fn test_missing_endpoint_is_configuration_error() {
        let err = HttpTransport::new(None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));

        let err = HttpTransport::new(Some("   "), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn test_malformed_endpoint_is_configuration_error() {
        let err = HttpTransport::new(Some("not a url"), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn test_endpoint_is_trimmed() {
        let transport =
            HttpTransport::new(Some(" http://localhost:8080/rpc "), Duration::from_secs(1))
                .unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:8080/rpc");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/rpc", port);
        let transport = HttpTransport::new(Some(&url), Duration::from_secs(2)).unwrap();

        let err = transport.sync(&args()).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
        assert!(err.is_retryable());
    }
}
