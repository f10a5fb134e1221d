//! Workflow domain model for change requests.
//!
//! Everything here is pure: the request entity, the stage gate, deadline
//! calculation, and impact scoring. State changes go through
//! [`crate::store::RequestStore`].
//!
//! ## Pipeline
//!
//! `Intake -> Scoping -> Ready for Dev -> In Progress -> Review -> Completed`,
//! with rework edges back to `Scoping` and `In Progress`. See [`TRANSITIONS`].

mod documents;
mod impact;
mod request;
mod sla;
mod stage;

pub use documents::{all_approved, DocumentKind, GeneratedDocument};
pub use impact::{
    badge_variant, is_quick_win, parse_assessment, sort_by_impact_score, validate, validate_with,
    BadgeVariant, ImpactAssessment, ScoreBreakdown, SumPolicy, Tier, ValidationError, DIMENSIONS,
    QUICK_WIN_THRESHOLD, SUM_TOLERANCE,
};
pub use request::{ActivityEntry, Complexity, Priority, Request, RequestDraft};
pub use sla::{
    calculate_sla, compute as compute_sla, days_between, effective_sla, sla_days, SlaData,
    SlaStatus, AT_RISK_DAYS,
};
pub use stage::{
    available_transitions, can_transition, is_read_only, transition, Actor, OwnerEffect,
    Requirement, Role, Stage, Transition, TRANSITIONS,
};

