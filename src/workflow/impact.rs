//! Impact assessment scoring, validation and prioritization.
//!
//! An assessment scores a request on five weighted dimensions that add up to
//! at most 100. Tier 1 assessments come from the scoring model, tier 2 from a
//! human override, tier 3 from a validated business case.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::request::{Complexity, Request};

/// Allowed drift between the breakdown sum and the stated total.
pub const SUM_TOLERANCE: f64 = 0.01;

/// Highest possible total score.
pub const MAX_TOTAL_SCORE: f64 = 100.0;

/// Scores above this (with simple complexity) make a quick win.
pub const QUICK_WIN_THRESHOLD: f64 = 70.0;

/// Scoring dimensions and their maxima, in wire order.
pub const DIMENSIONS: [(&str, f64); 5] = [
    ("revenueImpact", 30.0),
    ("userReach", 25.0),
    ("strategicAlignment", 20.0),
    ("urgency", 15.0),
    ("quickWinBonus", 10.0),
];

/// Per-dimension scores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub revenue_impact: f64,
    pub user_reach: f64,
    pub strategic_alignment: f64,
    pub urgency: f64,
    pub quick_win_bonus: f64,
}

impl ScoreBreakdown {
    pub fn new(
        revenue_impact: f64,
        user_reach: f64,
        strategic_alignment: f64,
        urgency: f64,
        quick_win_bonus: f64,
    ) -> Self {
        Self { revenue_impact, user_reach, strategic_alignment, urgency, quick_win_bonus }
    }

    /// Sum of all dimensions.
    pub fn total(&self) -> f64 {
        self.values().iter().sum()
    }

    /// Values in the same order as [`DIMENSIONS`].
    pub fn values(&self) -> [f64; 5] {
        [
            self.revenue_impact,
            self.user_reach,
            self.strategic_alignment,
            self.urgency,
            self.quick_win_bonus,
        ]
    }
}

/// Provenance of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    /// Produced by the scoring model
    Ai,
    /// Entered by a person, replacing the model's score
    Override,
    /// Backed by a validated business case
    Validated,
}

impl TryFrom<u8> for Tier {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ai),
            2 => Ok(Self::Override),
            3 => Ok(Self::Validated),
            other => Err(ValidationError::InvalidTier(i64::from(other))),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Ai => 1,
            Tier::Override => 2,
            Tier::Validated => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// A scored impact assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactAssessment {
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
    pub tier: Tier,
    pub assessed_by: String,
    pub assessed_at: DateTime<Utc>,
    pub justification: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
    #[serde(default)]
    pub customer_commitment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitive_intel: Option<String>,
}

impl ImpactAssessment {
    /// Build a tier 2 assessment from a person's scores.
    ///
    /// The result stands on its own; nothing is carried over from the
    /// assessment it replaces.
    pub fn manual_override(
        breakdown: ScoreBreakdown,
        justification: impl Into<String>,
        assessed_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            total_score: breakdown.total(),
            breakdown,
            tier: Tier::Override,
            assessed_by: assessed_by.into(),
            assessed_at: now,
            justification: justification.into(),
            dependencies: Vec::new(),
            risks: Vec::new(),
            customer_commitment: false,
            competitive_intel: None,
        }
    }

    /// Whether the breakdown adds up to the stated total.
    pub fn is_consistent(&self) -> bool {
        (self.breakdown.total() - self.total_score).abs() < SUM_TOLERANCE
    }
}

/// Reasons an assessment is refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} must be a number")]
    NotANumber { field: &'static str },

    #[error("Total score {0} is outside 0..=100")]
    TotalOutOfRange(f64),

    #[error("{dimension} score {value} is outside 0..={max}")]
    DimensionOutOfRange { dimension: &'static str, value: f64, max: f64 },

    #[error("Tier {0} is not one of 1, 2, 3")]
    InvalidTier(i64),

    #[error("Justification must not be empty")]
    EmptyJustification,

    #[error("Breakdown sums to {sum} but total score is {total}")]
    SumMismatch { sum: f64, total: f64 },

    #[error("Malformed assessment: {0}")]
    Malformed(String),
}

/// How to treat a breakdown that does not add up to the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SumPolicy {
    /// Log a warning and accept
    #[default]
    Warn,
    /// Refuse the assessment
    Reject,
}

impl SumPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Reject
        } else {
            Self::Warn
        }
    }
}

/// Validate an assessment with the default [`SumPolicy`].
pub fn validate(assessment: &ImpactAssessment) -> Result<(), ValidationError> {
    validate_with(assessment, SumPolicy::default())
}

/// Validate ranges, justification, and the breakdown sum.
pub fn validate_with(
    assessment: &ImpactAssessment,
    policy: SumPolicy,
) -> Result<(), ValidationError> {
    let total = assessment.total_score;
    if !total.is_finite() || !(0.0..=MAX_TOTAL_SCORE).contains(&total) {
        return Err(ValidationError::TotalOutOfRange(total));
    }

    for (&(dimension, max), value) in DIMENSIONS.iter().zip(assessment.breakdown.values()) {
        if !value.is_finite() || value < 0.0 || value > max {
            return Err(ValidationError::DimensionOutOfRange { dimension, value, max });
        }
    }

    if assessment.justification.trim().is_empty() {
        return Err(ValidationError::EmptyJustification);
    }

    if !assessment.is_consistent() {
        let sum = assessment.breakdown.total();
        match policy {
            SumPolicy::Warn => {
                tracing::warn!(sum, total, "Impact breakdown does not match total score");
            }
            SumPolicy::Reject => return Err(ValidationError::SumMismatch { sum, total }),
        }
    }

    Ok(())
}

/// Turn untrusted JSON (typically model output) into a validated assessment.
///
/// `assessedBy` and `assessedAt` are optional in the input; `default_assessor`
/// and `now` fill them in when absent.
pub fn parse_assessment(
    value: &Value,
    default_assessor: &str,
    now: DateTime<Utc>,
    policy: SumPolicy,
) -> Result<ImpactAssessment, ValidationError> {
    let obj =
        value.as_object().ok_or_else(|| ValidationError::Malformed("expected an object".into()))?;

    let total_score = number_field(obj.get("totalScore"), "totalScore")?;
    let breakdown_value = obj.get("breakdown").ok_or(ValidationError::MissingField("breakdown"))?;
    let tier_value = obj.get("tier").ok_or(ValidationError::MissingField("tier"))?;

    let tier_number = tier_value
        .as_i64()
        .or_else(|| tier_value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or(ValidationError::NotANumber { field: "tier" })?;
    let tier = u8::try_from(tier_number)
        .map_err(|_| ValidationError::InvalidTier(tier_number))
        .and_then(Tier::try_from)?;

    let breakdown_obj = breakdown_value
        .as_object()
        .ok_or_else(|| ValidationError::Malformed("breakdown must be an object".into()))?;
    let mut values = [0.0; 5];
    for (slot, &(name, _)) in values.iter_mut().zip(DIMENSIONS.iter()) {
        *slot = number_field(breakdown_obj.get(name), name)?;
    }
    let breakdown = ScoreBreakdown::new(values[0], values[1], values[2], values[3], values[4]);

    let justification =
        obj.get("justification").and_then(Value::as_str).unwrap_or_default().to_string();

    let assessed_at = obj
        .get("assessedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or(now, |dt| dt.with_timezone(&Utc));

    let assessment = ImpactAssessment {
        total_score,
        breakdown,
        tier,
        assessed_by: obj
            .get("assessedBy")
            .and_then(Value::as_str)
            .unwrap_or(default_assessor)
            .to_string(),
        assessed_at,
        justification,
        dependencies: string_list(obj.get("dependencies")),
        risks: string_list(obj.get("risks")),
        customer_commitment: obj
            .get("customerCommitment")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        competitive_intel: obj
            .get("competitiveIntel")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
    };

    validate_with(&assessment, policy)?;
    Ok(assessment)
}

fn number_field(value: Option<&Value>, field: &'static str) -> Result<f64, ValidationError> {
    let value = value.filter(|v| !v.is_null()).ok_or(ValidationError::MissingField(field))?;
    value.as_f64().ok_or(ValidationError::NotANumber { field })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Badge shown next to a request in lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeVariant {
    None,
    High,
    Medium,
    Low,
}

impl BadgeVariant {
    pub fn for_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::High
        } else if score >= 60.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Badge for a request; `None` when unassessed.
pub fn badge_variant(request: &Request) -> BadgeVariant {
    request.impact_score().map_or(BadgeVariant::None, BadgeVariant::for_score)
}

/// High impact and simple to deliver.
pub fn is_quick_win(request: &Request) -> bool {
    request.impact_score().is_some_and(|score| score > QUICK_WIN_THRESHOLD)
        && request.complexity == Some(Complexity::Simple)
}

/// Assessed requests by descending score, then unassessed ones in input order.
pub fn sort_by_impact_score(requests: &[Request]) -> Vec<Request> {
    let (mut assessed, unassessed): (Vec<&Request>, Vec<&Request>) =
        requests.iter().partition(|r| r.impact_assessment.is_some());

    // sort_by is stable, so equal scores keep their input order
    assessed.sort_by(|a, b| {
        let a = a.impact_score().unwrap_or_default();
        let b = b.impact_score().unwrap_or_default();
        b.total_cmp(&a)
    });

    assessed.into_iter().chain(unassessed).cloned().collect()
}
