//! Application state.
//!
//! `App` is built once from configuration and owns the store and the
//! generation collaborators. Front ends hold an `App` and call into it; there
//! is no global state.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::ai::{
    AIError, DecodeOptions, DocumentGenerator, GenerationProgress, GenerationProvider,
    ImpactScorer, RequestRouter,
};
use crate::core::{Config, RetryConfig};
use crate::intake::{self, Intake};
use crate::store::{InMemoryRepository, RequestRepository, RequestStore};
use crate::workflow::{
    badge_variant, effective_sla, is_quick_win, sort_by_impact_score, Actor, BadgeVariant,
    Request, RequestDraft, SlaData,
};

/// Main application state.
pub struct App {
    /// Application configuration
    pub config: Config,

    /// Who is acting in this session
    pub actor: Actor,

    store: RequestStore,
    provider: Option<Arc<dyn GenerationProvider>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("actor", &self.actor)
            .field("store", &self.store)
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

/// One row of the request dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestView {
    pub request: Request,
    pub badge: BadgeVariant,
    pub quick_win: bool,
    pub sla: SlaData,
}

impl App {
    /// Create the application from configuration.
    ///
    /// Uses the HTTP store and the Claude provider when they are available.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let repository = Self::repository(&config)?;
        let provider = Self::provider(&config);
        Ok(Self::with_parts(config, repository, provider))
    }

    /// Create the application from explicit collaborators.
    pub fn with_parts(
        config: Config,
        repository: Arc<dyn RequestRepository>,
        provider: Option<Arc<dyn GenerationProvider>>,
    ) -> Self {
        let timeout = config.store.timeout();
        let store = RequestStore::new(repository)
            .with_timeout(timeout)
            .with_retry(RetryConfig::network(config.store.retry_attempts, timeout))
            .with_sum_policy(config.sum_policy());
        let actor = Actor::new(config.general.actor.clone(), config.general.role);

        Self { config, actor, store, provider }
    }

    #[cfg(feature = "remote")]
    fn repository(config: &Config) -> anyhow::Result<Arc<dyn RequestRepository>> {
        let repository = crate::store::HttpRequestRepository::new(
            config.store.base_url.clone(),
            config.store.timeout(),
        )
        .context("Failed to create store client")?;
        Ok(Arc::new(repository))
    }

    #[cfg(not(feature = "remote"))]
    fn repository(_config: &Config) -> anyhow::Result<Arc<dyn RequestRepository>> {
        tracing::debug!("Built without remote support, using in-memory store");
        Ok(Arc::new(InMemoryRepository::new()))
    }

    #[cfg(feature = "remote")]
    fn provider(config: &Config) -> Option<Arc<dyn GenerationProvider>> {
        if !config.ai.enabled {
            return None;
        }
        if config.ai.provider != "claude" {
            tracing::warn!(provider = %config.ai.provider, "Unknown generation provider");
            return None;
        }
        match crate::ai::ClaudeProvider::from_config(&config.ai) {
            Ok(provider) => Some(Arc::new(provider)),
            Err(e) => {
                tracing::debug!(error = %e, "Generation provider unavailable");
                None
            }
        }
    }

    #[cfg(not(feature = "remote"))]
    fn provider(_config: &Config) -> Option<Arc<dyn GenerationProvider>> {
        None
    }

    /// An application with an in-memory store and no provider.
    pub fn offline(config: Config) -> Self {
        Self::with_parts(config, Arc::new(InMemoryRepository::new()), None)
    }

    /// Act as someone else.
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    /// Whether a generation provider is configured.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn require_provider(&self) -> Result<Arc<dyn GenerationProvider>, AIError> {
        self.provider.clone().ok_or_else(|| {
            AIError::ProviderNotAvailable("no generation provider configured".into())
        })
    }

    /// Load requests from the remote store.
    pub async fn refresh(&self) -> anyhow::Result<usize> {
        self.store.load().await.context("Failed to load requests")
    }

    /// Submit a new request.
    ///
    /// Without a provider the request is created unassessed and routed to the
    /// default owner.
    pub async fn submit(&self, draft: RequestDraft, now: DateTime<Utc>) -> anyhow::Result<Request> {
        let default_owner = self.config.intake.default_owner.as_str();

        let request = match &self.provider {
            Some(provider) => {
                let timeout = self.config.ai.timeout();
                let scorer = ImpactScorer::new(Arc::clone(provider))
                    .with_policy(self.config.sum_policy())
                    .with_timeout(timeout);
                let router = RequestRouter::new(Arc::clone(provider)).with_timeout(timeout);
                let intake = Intake { scorer: &scorer, router: &router, default_owner };
                intake::submit_request(&self.store, &intake, draft, now).await?
            }
            None => {
                let scored = Err(AIError::ProviderNotAvailable("offline".into()));
                let routed = Err(AIError::ProviderNotAvailable("offline".into()));
                let request = intake::assemble(draft, scored, routed, default_owner, now);
                self.store.create(request.clone()).await?;
                request
            }
        };
        Ok(request)
    }

    /// Generate and attach the scoping documents for a request.
    pub async fn generate_documents(
        &self,
        id: &str,
        now: DateTime<Utc>,
        on_progress: impl FnMut(GenerationProgress) + Send,
    ) -> anyhow::Result<()> {
        let request = self.store.get(id).with_context(|| format!("Request not found: {id}"))?;
        let options = DecodeOptions::from_config(&self.config.ai);
        let generator = DocumentGenerator::new(self.require_provider()?, options);

        let documents = generator.generate_all(&request, now, on_progress).await?;
        self.store.attach_documents(id, documents, &self.actor).await?;
        Ok(())
    }

    /// Requests sorted by impact, with their derived badges and SLA.
    pub fn dashboard(&self, now: DateTime<Utc>) -> Vec<RequestView> {
        sort_by_impact_score(&self.store.requests())
            .into_iter()
            .map(|request| RequestView {
                badge: badge_variant(&request),
                quick_win: is_quick_win(&request),
                sla: effective_sla(&request, now),
                request,
            })
            .collect()
    }
}
