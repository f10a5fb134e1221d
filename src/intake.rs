//! Request submission.
//!
//! Scoring and routing are independent calls to the generation provider, so
//! they run concurrently. Neither can fail a submission: a missing score
//! leaves the request unassessed and a missing route falls back to the
//! default owner.

use chrono::{DateTime, Utc};

use crate::ai::{AIError, ImpactScorer, RequestRouter, RoutingDecision};
use crate::store::{RequestStore, StoreError};
use crate::workflow::{ImpactAssessment, Request, RequestDraft};

/// Generation collaborators used at intake.
pub struct Intake<'a> {
    pub scorer: &'a ImpactScorer,
    pub router: &'a RequestRouter,
    pub default_owner: &'a str,
}

/// Score, route, assemble and create a request. Returns the stored record.
pub async fn submit_request(
    store: &RequestStore,
    intake: &Intake<'_>,
    draft: RequestDraft,
    now: DateTime<Utc>,
) -> Result<Request, StoreError> {
    let (scored, routed) =
        tokio::join!(intake.scorer.score(&draft, now), intake.router.route(&draft));

    let request = assemble(draft, scored, routed, intake.default_owner, now);
    store.create(request.clone()).await?;

    tracing::info!(id = %request.id, owner = %request.owner, "Request submitted");
    Ok(request)
}

/// Combine the draft with whatever scoring and routing produced.
pub fn assemble(
    draft: RequestDraft,
    scored: Result<ImpactAssessment, AIError>,
    routed: Result<RoutingDecision, AIError>,
    default_owner: &str,
    now: DateTime<Utc>,
) -> Request {
    let decision = routed.unwrap_or_else(|e| {
        tracing::warn!(error = %e, owner = default_owner, "Routing failed, using default owner");
        RoutingDecision::fallback(default_owner)
    });

    let mut request = draft.into_request(now).with_complexity(decision.complexity);
    request.owner = decision.owner;
    request.ai_alert = decision.alert;

    match scored {
        Ok(assessment) => request.impact_assessment = Some(assessment),
        Err(e) => tracing::warn!(error = %e, "Impact scoring failed, submitting unassessed"),
    }
    request
}
