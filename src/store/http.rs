//! REST client for the remote request store.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET /requests`
//! - `POST /requests`
//! - `PATCH /requests/{id}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::repository::{RepositoryError, RepositoryResult, RequestPatch, RequestRepository};
use crate::workflow::Request;

/// Remote store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRequestRepository {
    client: Client,
    base_url: String,
}

impl HttpRequestRepository {
    /// Create a client for `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RepositoryResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check(response: &reqwest::Response) -> RepositoryResult<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RepositoryError::Status(status.as_u16()))
        }
    }
}

#[async_trait]
impl RequestRepository for HttpRequestRepository {
    async fn list(&self) -> RepositoryResult<Vec<Request>> {
        let response = self.client.get(self.url("/requests")).send().await?;
        Self::check(&response)?;
        Ok(response.json().await?)
    }

    async fn create(&self, request: &Request) -> RepositoryResult<Request> {
        let response = self.client.post(self.url("/requests")).json(request).send().await?;
        Self::check(&response)?;
        Ok(response.json().await?)
    }

    async fn patch(&self, id: &str, patch: &RequestPatch) -> RepositoryResult<()> {
        let path = format!("/requests/{}", urlencoding::encode(id));
        tracing::debug!(id, "Patching request");

        let response = self.client.patch(self.url(&path)).json(patch).send().await?;
        Self::check(&response)
    }
}
