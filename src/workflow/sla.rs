//! Delivery deadline calculation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::request::{Complexity, Request};

/// Remaining days at or below which a request counts as at risk.
pub const AT_RISK_DAYS: i64 = 2;

/// Deadline status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlaStatus {
    OnTime,
    AtRisk,
    Overdue,
}

impl SlaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTime => "on-time",
            Self::AtRisk => "at-risk",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed deadline for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaData {
    pub target_completion_date: DateTime<Utc>,
    pub days_remaining: i64,
    pub status: SlaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_overdue: Option<i64>,
}

/// Calendar days allowed for a given complexity.
pub fn sla_days(complexity: Option<Complexity>) -> i64 {
    match complexity.unwrap_or_default() {
        Complexity::Simple => 5,
        Complexity::Medium => 8,
        Complexity::Complex => 14,
    }
}

/// Whole days from `from` to `to`, both truncated to UTC midnight.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to.date_naive() - from.date_naive()).num_days()
}

/// Compute the SLA for `created_at` and `complexity` as seen at `now`.
pub fn compute(
    created_at: DateTime<Utc>,
    complexity: Option<Complexity>,
    now: DateTime<Utc>,
) -> SlaData {
    let target_completion_date = created_at
        .checked_add_signed(Duration::days(sla_days(complexity)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let days_remaining = days_between(now, target_completion_date);

    let status = if days_remaining < 0 {
        SlaStatus::Overdue
    } else if days_remaining <= AT_RISK_DAYS {
        SlaStatus::AtRisk
    } else {
        SlaStatus::OnTime
    };

    SlaData {
        target_completion_date,
        days_remaining,
        status,
        days_overdue: (status == SlaStatus::Overdue).then(|| days_remaining.abs()),
    }
}

/// Compute the SLA for a request. Does not touch the request.
pub fn calculate_sla(request: &Request, now: DateTime<Utc>) -> SlaData {
    compute(request.effective_created_at(now), request.complexity, now)
}

/// The cached SLA if the request carries one, otherwise a fresh calculation.
pub fn effective_sla(request: &Request, now: DateTime<Utc>) -> SlaData {
    request.sla.clone().unwrap_or_else(|| calculate_sla(request, now))
}
