//! Contract with the remote request store.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::workflow::{ActivityEntry, GeneratedDocument, ImpactAssessment, Request, Stage};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Failures talking to the remote store.
///
/// The store does not distinguish between these; any of them rolls a
/// mutation back.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[cfg(feature = "remote")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned status {0}")]
    Status(u16),

    #[error("Request not found in store: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator holding the authoritative request records.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Fetch every request.
    async fn list(&self) -> RepositoryResult<Vec<Request>>;

    /// Persist a new request.
    async fn create(&self, request: &Request) -> RepositoryResult<Request>;

    /// Apply a partial update to an existing request.
    async fn patch(&self, id: &str, patch: &RequestPatch) -> RepositoryResult<()>;
}

/// Partial update sent to the remote store. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// `Some(None)` clears the alert
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub ai_alert: Option<Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Vec<ActivityEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_assessment: Option<ImpactAssessment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<GeneratedDocument>>,
}

/// Distinguish an explicit `null` from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl RequestPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to a local copy of the request.
    pub fn apply_to(&self, request: &mut Request) {
        if let Some(stage) = self.stage {
            request.stage = stage;
        }
        if let Some(owner) = &self.owner {
            request.owner.clone_from(owner);
        }
        if let Some(alert) = &self.ai_alert {
            request.ai_alert.clone_from(alert);
        }
        if let Some(activity) = &self.activity {
            request.activity.clone_from(activity);
        }
        if let Some(assessment) = &self.impact_assessment {
            request.impact_assessment = Some(assessment.clone());
        }
        if let Some(documents) = &self.documents {
            request.documents.clone_from(documents);
        }
    }
}

/// Repository kept entirely in process memory.
///
/// Used for offline work and as the reference behavior in tests.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    requests: Mutex<Vec<Request>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing records.
    pub fn with_requests(requests: Vec<Request>) -> Self {
        Self { requests: Mutex::new(requests) }
    }

    /// Copy of the stored records.
    pub fn snapshot(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RequestRepository for InMemoryRepository {
    async fn list(&self) -> RepositoryResult<Vec<Request>> {
        Ok(self.snapshot())
    }

    async fn create(&self, request: &Request) -> RepositoryResult<Request> {
        self.requests.lock().push(request.clone());
        Ok(request.clone())
    }

    async fn patch(&self, id: &str, patch: &RequestPatch) -> RepositoryResult<()> {
        let mut requests = self.requests.lock();
        let request = requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        patch.apply_to(request);
        Ok(())
    }
}
