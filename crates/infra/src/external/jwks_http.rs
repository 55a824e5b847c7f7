//! Fetches the identity provider's published signing keys over HTTPS.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use tracing::{debug, instrument};

use taskmgr_auth::{KeySource, KeySourceError};

/// [`KeySource`] backed by the IdP's JWKS discovery endpoint.
///
/// The client-level timeout bounds a single request; retries and caching
/// belong to the key cache.
#[derive(Debug, Clone)]
pub struct HttpJwksSource {
    client: reqwest::Client,
    url: String,
}

impl HttpJwksSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, KeySourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeySourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySource for HttpJwksSource {
    #[instrument(skip(self), fields(url = %self.url), err)]
    async fn fetch(&self) -> Result<JwkSet, KeySourceError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySourceError::Transport(format!("unexpected status {status}")));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| KeySourceError::Invalid(e.to_string()))?;

        debug!(keys = set.keys.len(), "fetched signing keys");
        Ok(set)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> KeySourceError {
    if err.is_timeout() {
        KeySourceError::Timeout
    } else {
        KeySourceError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/.well-known/jwks.json")
    }

    #[tokio::test]
    async fn parses_published_key_set() {
        let url = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"keys":[{"kty":"RSA","kid":"k1","use":"sig","alg":"RS256","n":"sXch","e":"AQAB"}]}"#,
        )
        .await;

        let set = HttpJwksSource::new(url, Duration::from_secs(5)).unwrap().fetch().await.unwrap();
        assert_eq!(set.keys.len(), 1);
        assert_eq!(set.keys[0].common.key_id.as_deref(), Some("k1"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let url = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
        let err = HttpJwksSource::new(url, Duration::from_secs(5)).unwrap().fetch().await.unwrap_err();
        assert!(matches!(err, KeySourceError::Transport(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_invalid() {
        let url = serve_once("HTTP/1.1 200 OK", "not json").await;
        let err = HttpJwksSource::new(url, Duration::from_secs(5)).unwrap().fetch().await.unwrap_err();
        assert!(matches!(err, KeySourceError::Invalid(_)));
    }
}
