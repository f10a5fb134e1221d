//! Request store with optimistic mutations.
//!
//! The store owns the in-process request collection. Every mutation is
//! applied locally first, so readers see it immediately, and then confirmed
//! with the remote [`RequestRepository`]. If confirmation fails or times out
//! the collection is restored to exactly what it was before the mutation.
//!
//! Mutations are serialized by one store-wide lock held from snapshot to
//! commit or rollback. Nothing is exchanged with the remote store to detect
//! concurrent edits from other sessions, so the last write wins there.

#[cfg(feature = "remote")]
mod http;
mod mutation;
mod repository;

#[cfg(feature = "remote")]
pub use http::HttpRequestRepository;
pub use mutation::{
    AdjustImpactScore, ApproveDocument, AttachDocuments, CreateRequest, DismissAlert, Mutation,
    RemoteCall, RollbackGuard, Snapshot, StoreState, UpdateStage,
};
pub use repository::{
    InMemoryRepository, RepositoryError, RepositoryResult, RequestPatch, RequestRepository,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use crate::core::{retry_async, AttemptError, RetryConfig};
use crate::workflow::{
    Actor, DocumentKind, GeneratedDocument, ImpactAssessment, Role, Stage, SumPolicy,
    ValidationError,
};
use crate::workflow::Request;

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request not found: {0}")]
    NotFound(String),

    #[error("Request already exists: {0}")]
    Duplicate(String),

    #[error("Role {role} may not move a request from {from} to {to}")]
    Permission { role: Role, from: Stage, to: Stage },

    #[error("Role {role} cannot modify a request in {stage}")]
    ReadOnly { role: Role, stage: Stage },

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("Invalid impact assessment: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote store call failed: {0}")]
    Network(#[from] RepositoryError),

    #[error("Remote store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Whether the error was raised locally, before anything reached the network.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Authoritative in-process request collection.
pub struct RequestStore {
    state: RwLock<StoreState>,
    repository: Arc<dyn RequestRepository>,
    mutation_lock: tokio::sync::Mutex<()>,
    timeout: Duration,
    retry: RetryConfig,
    sum_policy: SumPolicy,
}

impl std::fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStore")
            .field("requests", &self.state.read().requests.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RequestStore {
    /// Create an empty store backed by `repository`.
    pub fn new(repository: Arc<dyn RequestRepository>) -> Self {
        let timeout = Duration::from_secs(15);
        Self {
            state: RwLock::new(StoreState::default()),
            repository,
            mutation_lock: tokio::sync::Mutex::new(()),
            timeout,
            retry: RetryConfig::network(2, timeout),
            sum_policy: SumPolicy::default(),
        }
    }

    /// Bound every remote call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.retry.attempt_timeout = Some(timeout);
        self
    }

    /// Retry policy for [`load`](Self::load).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// How impact assessments with an inconsistent sum are treated.
    pub fn with_sum_policy(mut self, policy: SumPolicy) -> Self {
        self.sum_policy = policy;
        self
    }

    /// Replace the collection with the remote store's contents.
    ///
    /// Returns the number of requests loaded.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let _serial = self.mutation_lock.lock().await;

        let outcome = retry_async(&self.retry, || self.repository.list()).await;
        let (attempts, elapsed) = (outcome.attempts, outcome.total_time);
        if outcome.was_retried {
            tracing::warn!(
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request store needed retries"
            );
        }
        let requests = outcome.into_result().map_err(|e| match e {
            AttemptError::Failed(e) => StoreError::Network(e),
            AttemptError::TimedOut(limit) => StoreError::Timeout(limit),
        })?;

        let count = requests.len();
        let mut state = self.state.write();
        state.requests = requests;
        if let Some(id) = state.selected.clone() {
            if state.find(&id).is_none() {
                state.selected = None;
            }
        }
        tracing::info!(count, attempts, elapsed_ms = elapsed.as_millis() as u64, "Loaded requests");
        Ok(count)
    }

    /// Copy of every request in store order.
    pub fn requests(&self) -> Vec<Request> {
        self.state.read().requests.clone()
    }

    /// Copy of one request.
    pub fn get(&self, id: &str) -> Option<Request> {
        self.state.read().find(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().requests.is_empty()
    }

    /// Point the selection at a request, or clear it.
    pub fn select(&self, id: Option<&str>) -> Result<(), StoreError> {
        let mut state = self.state.write();
        match id {
            Some(id) if state.find(id).is_none() => Err(StoreError::NotFound(id.to_string())),
            _ => {
                state.selected = id.map(str::to_string);
                Ok(())
            }
        }
    }

    /// The selected request, as it currently stands.
    pub fn selected(&self) -> Option<Request> {
        let state = self.state.read();
        state.selected.as_deref().and_then(|id| state.find(id)).cloned()
    }

    /// Add a new request.
    pub async fn create(&self, request: Request) -> Result<(), StoreError> {
        self.execute(CreateRequest { request }).await
    }

    /// Move a request to `new_stage` on behalf of `actor`.
    ///
    /// Refused locally, without any change, unless the transition table
    /// allows it for the actor's role and its requirement is met.
    pub async fn update_stage(
        &self,
        id: &str,
        new_stage: Stage,
        note: Option<&str>,
        actor: &Actor,
    ) -> Result<(), StoreError> {
        self.execute(UpdateStage {
            id: id.to_string(),
            to: new_stage,
            note: note.map(str::to_string),
            actor: actor.clone(),
        })
        .await
    }

    /// Clear the intake alert. Does nothing when there is no alert.
    pub async fn dismiss_alert(&self, id: &str) -> Result<(), StoreError> {
        self.execute(DismissAlert { id: id.to_string() }).await
    }

    /// Replace the impact assessment after validating it.
    pub async fn adjust_impact_score(
        &self,
        id: &str,
        assessment: ImpactAssessment,
        actor: &Actor,
    ) -> Result<(), StoreError> {
        self.execute(AdjustImpactScore {
            id: id.to_string(),
            assessment,
            actor: actor.clone(),
            policy: self.sum_policy,
        })
        .await
    }

    /// Replace the generated document set.
    pub async fn attach_documents(
        &self,
        id: &str,
        documents: Vec<GeneratedDocument>,
        actor: &Actor,
    ) -> Result<(), StoreError> {
        self.execute(AttachDocuments { id: id.to_string(), documents, actor: actor.clone() }).await
    }

    /// Approve one generated document.
    pub async fn approve_document(
        &self,
        id: &str,
        kind: DocumentKind,
        actor: &Actor,
    ) -> Result<(), StoreError> {
        self.execute(ApproveDocument { id: id.to_string(), kind, actor: actor.clone() }).await
    }

    /// Run a mutation: apply locally, confirm remotely, roll back on failure.
    pub async fn execute<M: Mutation>(&self, mutation: M) -> Result<(), StoreError> {
        let _serial = self.mutation_lock.lock().await;
        let name = mutation.name();

        let guard = RollbackGuard::arm(&self.state, name);
        let applied = mutation.apply(&mut self.state.write(), Utc::now());

        let call = match applied {
            Ok(Some(call)) => call,
            Ok(None) => {
                guard.commit();
                tracing::debug!(mutation = name, "Nothing to change");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(mutation = name, error = %e, "Mutation refused");
                return Err(e);
            }
        };

        let confirmed = match tokio::time::timeout(self.timeout, self.dispatch(&call)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StoreError::Network(e)),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };

        match confirmed {
            Ok(()) => {
                guard.commit();
                tracing::debug!(mutation = name, "Mutation confirmed");
                Ok(())
            }
            Err(e) => {
                drop(guard);
                tracing::warn!(
                    mutation = name,
                    error = %e,
                    "Remote store rejected mutation, rolled back"
                );
                Err(e)
            }
        }
    }

    async fn dispatch(&self, call: &RemoteCall) -> RepositoryResult<()> {
        match call {
            RemoteCall::Create(request) => self.repository.create(request).await.map(|_| ()),
            RemoteCall::Patch { id, patch } => self.repository.patch(id, patch).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Priority;

    fn store() -> (RequestStore, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        (RequestStore::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn test_create_reaches_repository() {
        let (store, repo) = store();
        let request = Request::new("Saved filters", "li", Priority::Medium, Utc::now());

        store.create(request.clone()).await.unwrap();

        assert_eq!(store.get(&request.id), Some(request.clone()));
        assert_eq!(repo.snapshot(), vec![request]);
    }

    #[tokio::test]
    async fn test_duplicate_create_refused() {
        let (store, _) = store();
        let request = Request::new("Saved filters", "li", Priority::Medium, Utc::now());

        store.create(request.clone()).await.unwrap();
        let err = store.create(request).await.unwrap_err();

        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(err.is_local());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_selection() {
        let (store, _) = store();
        let request = Request::new("Saved filters", "li", Priority::Medium, Utc::now());
        store.create(request.clone()).await.unwrap();

        assert!(store.select(Some("nope")).is_err());
        store.select(Some(request.id.as_str())).unwrap();
        assert_eq!(store.selected().map(|r| r.id), Some(request.id));

        store.select(None).unwrap();
        assert!(store.selected().is_none());
    }

    #[tokio::test]
    async fn test_load_replaces_collection() {
        let existing = Request::new("Saved filters", "li", Priority::Medium, Utc::now());
        let repo = Arc::new(InMemoryRepository::with_requests(vec![existing.clone()]));
        let store = RequestStore::new(repo);

        assert_eq!(store.load().await.unwrap(), 1);
        assert_eq!(store.requests(), vec![existing]);
    }

    /// Fails the first `list` call, then defers to the inner repository.
    struct UnsteadyRepository {
        inner: InMemoryRepository,
        lists: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RequestRepository for UnsteadyRepository {
        async fn list(&self) -> RepositoryResult<Vec<Request>> {
            if self.lists.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(RepositoryError::Status(503));
            }
            self.inner.list().await
        }

        async fn create(&self, request: &Request) -> RepositoryResult<Request> {
            self.inner.create(request).await
        }

        async fn patch(&self, id: &str, patch: &RequestPatch) -> RepositoryResult<()> {
            self.inner.patch(id, patch).await
        }
    }

    #[tokio::test]
    async fn test_load_retries_transient_failure() {
        let existing = Request::new("Saved filters", "li", Priority::Medium, Utc::now());
        let repo = Arc::new(UnsteadyRepository {
            inner: InMemoryRepository::with_requests(vec![existing.clone()]),
            lists: Default::default(),
        });
        let retry = RetryConfig {
            initial_delay: Duration::from_millis(1),
            jitter: false,
            ..RetryConfig::network(1, Duration::from_secs(1))
        };
        let store = RequestStore::new(repo.clone()).with_retry(retry);

        assert_eq!(store.load().await.unwrap(), 1);
        assert_eq!(repo.lists.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(store.requests(), vec![existing]);
    }
}
