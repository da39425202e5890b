//! Remote sync service
//!
//! Defines the pull/push contract of the central server and its HTTP
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{PullRequest, PullResponse, PushRequest, PushResponse};
use crate::error::{Result, SyncError};

/// Server side of the sync protocol
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Fetch documents changed since `request.since`
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse>;

    /// Submit local changes; the response lists rejected or superseded documents
    async fn push(&self, request: &PushRequest) -> Result<PushResponse>;
}

/// JSON-over-HTTP client for `POST {base}/sync/pull` and `POST {base}/sync/push`
#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RemoteSync for HttpRemote {
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        self.post("/sync/pull", request).await
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        self.post("/sync/push", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::Timestamp;

    #[test]
    fn test_base_url_normalized() {
        let remote = HttpRemote::new("http://sync.local/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(remote.base_url(), "http://sync.local/api");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) is not listening on loopback in test environments
        let remote = HttpRemote::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();

        let err = remote
            .pull(&PullRequest {
                user_id: "u1".to_string(),
                since: Timestamp::epoch(),
                limit: 10,
            })
            .await
            .unwrap_err();

        assert!(err.is_transport());
    }
}
