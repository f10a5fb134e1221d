//! Store mutations as commands.
//!
//! A [`Mutation`] edits local state and says which remote call confirms it.
//! Its compensation is the [`Snapshot`] the store takes just before applying
//! it, restored by [`RollbackGuard`] unless the remote call succeeds.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::repository::RequestPatch;
use super::StoreError;
use crate::workflow::{
    all_approved, transition, validate_with, Actor, DocumentKind, GeneratedDocument,
    ImpactAssessment, OwnerEffect, Request, Requirement, Stage, SumPolicy,
};

/// In-process store contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub requests: Vec<Request>,
    pub selected: Option<String>,
}

impl StoreState {
    pub fn find(&self, id: &str) -> Option<&Request> {
        self.requests.iter().find(|r| r.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Request, StoreError> {
        self.requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

/// Remote call that confirms a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create(Request),
    Patch { id: String, patch: RequestPatch },
}

/// A local-first change to the store.
pub trait Mutation: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Change `state` and return the remote call to make.
    ///
    /// `Ok(None)` means there was nothing to change. An error must be
    /// returned before `state` is touched.
    fn apply(
        &self,
        state: &mut StoreState,
        now: DateTime<Utc>,
    ) -> Result<Option<RemoteCall>, StoreError>;
}

/// Copy of the request collection taken before a mutation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    requests: Vec<Request>,
}

impl Snapshot {
    pub fn capture(state: &StoreState) -> Self {
        Self { requests: state.requests.clone() }
    }

    /// Put the collection back. A selection pointing at a request that no
    /// longer exists is cleared.
    pub fn restore(self, state: &mut StoreState) {
        state.requests = self.requests;
        if let Some(id) = &state.selected {
            if state.find(id).is_none() {
                state.selected = None;
            }
        }
    }
}

/// Restores a snapshot on drop unless committed.
///
/// Covers the failure path, the timeout path, and a caller dropping the
/// mutation future mid-flight.
pub struct RollbackGuard<'a> {
    state: &'a RwLock<StoreState>,
    snapshot: Option<Snapshot>,
    mutation: &'static str,
}

impl<'a> RollbackGuard<'a> {
    pub fn arm(state: &'a RwLock<StoreState>, mutation: &'static str) -> Self {
        let snapshot = Snapshot::capture(&state.read());
        Self { state, snapshot: Some(snapshot), mutation }
    }

    /// Keep the applied change.
    pub fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            tracing::debug!(mutation = self.mutation, "Restoring pre-mutation snapshot");
            snapshot.restore(&mut self.state.write());
        }
    }
}

/// Add a new request.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub request: Request,
}

impl Mutation for CreateRequest {
    fn name(&self) -> &'static str {
        "create"
    }

    fn apply(
        &self,
        state: &mut StoreState,
        _now: DateTime<Utc>,
    ) -> Result<Option<RemoteCall>, StoreError> {
        if state.find(&self.request.id).is_some() {
            return Err(StoreError::Duplicate(self.request.id.clone()));
        }
        state.requests.push(self.request.clone());
        Ok(Some(RemoteCall::Create(self.request.clone())))
    }
}

/// Move a request to another stage.
#[derive(Debug, Clone)]
pub struct UpdateStage {
    pub id: String,
    pub to: Stage,
    pub note: Option<String>,
    pub actor: Actor,
}

impl Mutation for UpdateStage {
    fn name(&self) -> &'static str {
        "update_stage"
    }

    fn apply(
        &self,
        state: &mut StoreState,
        now: DateTime<Utc>,
    ) -> Result<Option<RemoteCall>, StoreError> {
        let request = state.find_mut(&self.id)?;
        let from = request.stage;

        let edge = transition(from, self.to).filter(|t| t.role == self.actor.role).ok_or(
            StoreError::Permission { role: self.actor.role, from, to: self.to },
        )?;

        let note = self.note.as_deref().map(str::trim).filter(|n| !n.is_empty());
        match edge.requirement {
            Requirement::None => {}
            Requirement::DocumentsApproved => {
                if !all_approved(&request.documents) {
                    return Err(StoreError::Precondition(
                        "all generated documents must be approved".to_string(),
                    ));
                }
            }
            Requirement::Note => {
                if note.is_none() {
                    return Err(StoreError::Precondition(format!(
                        "moving from {from} to {} requires a note",
                        self.to
                    )));
                }
            }
        }

        request.stage = self.to;
        let owner_changed = edge.owner_effect == OwnerEffect::AssignActor
            && request.owner != self.actor.name;
        if edge.owner_effect == OwnerEffect::AssignActor {
            request.owner.clone_from(&self.actor.name);
        }
        request.ai_alert = None;

        let action = match note {
            Some(note) => format!("{}: {note}", edge.label),
            None => edge.label.to_string(),
        };
        request.log(now, action, &self.actor.name);

        let patch = RequestPatch {
            stage: Some(self.to),
            owner: owner_changed.then(|| request.owner.clone()),
            ai_alert: Some(None),
            activity: Some(request.activity.clone()),
            ..Default::default()
        };
        Ok(Some(RemoteCall::Patch { id: self.id.clone(), patch }))
    }
}

/// Clear the intake alert.
#[derive(Debug, Clone)]
pub struct DismissAlert {
    pub id: String,
}

impl Mutation for DismissAlert {
    fn name(&self) -> &'static str {
        "dismiss_alert"
    }

    fn apply(
        &self,
        state: &mut StoreState,
        _now: DateTime<Utc>,
    ) -> Result<Option<RemoteCall>, StoreError> {
        let request = state.find_mut(&self.id)?;
        if request.ai_alert.take().is_none() {
            return Ok(None);
        }

        let patch = RequestPatch { ai_alert: Some(None), ..Default::default() };
        Ok(Some(RemoteCall::Patch { id: self.id.clone(), patch }))
    }
}

/// Replace the impact assessment.
#[derive(Debug, Clone)]
pub struct AdjustImpactScore {
    pub id: String,
    pub assessment: ImpactAssessment,
    pub actor: Actor,
    pub policy: SumPolicy,
}

impl Mutation for AdjustImpactScore {
    fn name(&self) -> &'static str {
        "adjust_impact_score"
    }

    fn apply(
        &self,
        state: &mut StoreState,
        now: DateTime<Utc>,
    ) -> Result<Option<RemoteCall>, StoreError> {
        validate_with(&self.assessment, self.policy)?;
        let request = state.find_mut(&self.id)?;

        request.impact_assessment = Some(self.assessment.clone());
        request.log(
            now,
            format!(
                "Impact score adjusted to {} (Tier {})",
                self.assessment.total_score, self.assessment.tier
            ),
            &self.actor.name,
        );

        let patch = RequestPatch {
            impact_assessment: Some(self.assessment.clone()),
            activity: Some(request.activity.clone()),
            ..Default::default()
        };
        Ok(Some(RemoteCall::Patch { id: self.id.clone(), patch }))
    }
}

/// Store a freshly generated document set.
#[derive(Debug, Clone)]
pub struct AttachDocuments {
    pub id: String,
    pub documents: Vec<GeneratedDocument>,
    pub actor: Actor,
}

impl Mutation for AttachDocuments {
    fn name(&self) -> &'static str {
        "attach_documents"
    }

    fn apply(
        &self,
        state: &mut StoreState,
        now: DateTime<Utc>,
    ) -> Result<Option<RemoteCall>, StoreError> {
        let request = state.find_mut(&self.id)?;

        request.documents.clone_from(&self.documents);
        request.log(
            now,
            format!("Generated {} scoping documents", self.documents.len()),
            &self.actor.name,
        );

        let patch = RequestPatch {
            documents: Some(request.documents.clone()),
            activity: Some(request.activity.clone()),
            ..Default::default()
        };
        Ok(Some(RemoteCall::Patch { id: self.id.clone(), patch }))
    }
}

/// Approve one generated document.
#[derive(Debug, Clone)]
pub struct ApproveDocument {
    pub id: String,
    pub kind: DocumentKind,
    pub actor: Actor,
}

impl Mutation for ApproveDocument {
    fn name(&self) -> &'static str {
        "approve_document"
    }

    fn apply(
        &self,
        state: &mut StoreState,
        now: DateTime<Utc>,
    ) -> Result<Option<RemoteCall>, StoreError> {
        let request = state.find_mut(&self.id)?;
        if crate::workflow::is_read_only(self.actor.role, request.stage) {
            return Err(StoreError::ReadOnly { role: self.actor.role, stage: request.stage });
        }

        let document = request
            .documents
            .iter_mut()
            .find(|d| d.kind == self.kind)
            .ok_or_else(|| StoreError::Precondition(format!("no {} document", self.kind)))?;
        if !document.approve(&self.actor.name, now) {
            return Ok(None);
        }

        request.log(now, format!("Approved {}", self.kind.title()), &self.actor.name);

        let patch = RequestPatch {
            documents: Some(request.documents.clone()),
            activity: Some(request.activity.clone()),
            ..Default::default()
        };
        Ok(Some(RemoteCall::Patch { id: self.id.clone(), patch }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Priority, Role};

    fn state_with(request: Request) -> StoreState {
        StoreState { requests: vec![request], selected: None }
    }

    #[test]
    fn test_denied_transition_leaves_state_untouched() {
        let request = Request::new("SSO", "rita", Priority::High, Utc::now());
        let mut state = state_with(request.clone());
        let before = state.clone();

        let mutation = UpdateStage {
            id: request.id,
            to: Stage::Completed,
            note: None,
            actor: Actor::new("rita", Role::Requester),
        };

        assert!(matches!(
            mutation.apply(&mut state, Utc::now()),
            Err(StoreError::Permission { .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_rejection_requires_note() {
        let mut request = Request::new("SSO", "rita", Priority::High, Utc::now());
        request.stage = Stage::ReadyForDev;
        let mut state = state_with(request.clone());

        let mut mutation = UpdateStage {
            id: request.id,
            to: Stage::Scoping,
            note: Some("   ".into()),
            actor: Actor::new("dev", Role::Dev),
        };
        assert!(matches!(
            mutation.apply(&mut state, Utc::now()),
            Err(StoreError::Precondition(_))
        ));

        mutation.note = Some("Acceptance criteria missing".into());
        assert!(mutation.apply(&mut state, Utc::now()).unwrap().is_some());
        assert_eq!(state.requests[0].stage, Stage::Scoping);
        assert_eq!(
            state.requests[0].activity.last().unwrap().action,
            "Returned to scoping: Acceptance criteria missing"
        );
    }

    #[test]
    fn test_adjusted_score_logged_as_stored() {
        let request = Request::new("SSO", "rita", Priority::High, Utc::now());
        let mut state = state_with(request.clone());
        let breakdown = crate::workflow::ScoreBreakdown::new(20.5, 12.0, 10.0, 5.0, 5.0);
        let assessment = ImpactAssessment::manual_override(breakdown, "Half", "pat", Utc::now());

        let mutation = AdjustImpactScore {
            id: request.id,
            assessment,
            actor: Actor::new("pat", Role::ProductOwner),
            policy: SumPolicy::Reject,
        };
        mutation.apply(&mut state, Utc::now()).unwrap();

        let action = &state.requests[0].activity.last().unwrap().action;
        assert!(action.starts_with("Impact score adjusted to 52.5 (Tier "), "{action}");
    }

    #[test]
    fn test_snapshot_restore_clears_dangling_selection() {
        let mut state = StoreState::default();
        let snapshot = Snapshot::capture(&state);

        let request = Request::new("SSO", "rita", Priority::High, Utc::now());
        state.selected = Some(request.id.clone());
        state.requests.push(request);

        snapshot.restore(&mut state);
        assert!(state.requests.is_empty());
        assert_eq!(state.selected, None);
    }

    #[test]
    fn test_guard_restores_unless_committed() {
        let lock = RwLock::new(StoreState::default());
        let request = Request::new("SSO", "rita", Priority::High, Utc::now());

        {
            let _guard = RollbackGuard::arm(&lock, "test");
            lock.write().requests.push(request.clone());
        }
        assert!(lock.read().requests.is_empty());

        let guard = RollbackGuard::arm(&lock, "test");
        lock.write().requests.push(request);
        guard.commit();
        assert_eq!(lock.read().requests.len(), 1);
    }
}
