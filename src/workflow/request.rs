//! The change request entity and its supporting value types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::documents::GeneratedDocument;
use super::impact::ImpactAssessment;
use super::sla::SlaData;
use super::stage::Stage;

/// A business-change request moving through the workflow pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Stable identifier, never changed after creation
    pub id: String,

    /// Short title
    pub title: String,

    /// What the requester is asking for
    #[serde(default)]
    pub description: String,

    /// Current pipeline stage
    pub stage: Stage,

    /// Current owner of the work
    pub owner: String,

    /// Who submitted the request
    pub submitted_by: String,

    /// Business priority
    pub priority: Priority,

    /// Delivery complexity; `medium` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,

    /// Creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Legacy age field used when `created_at` is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_open: Option<i64>,

    /// Append-only activity log
    #[serde(default)]
    pub activity: Vec<ActivityEntry>,

    /// Alert raised by the router at intake
    #[serde(default)]
    pub ai_alert: Option<String>,

    /// Current impact assessment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_assessment: Option<ImpactAssessment>,

    /// Cached SLA snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<SlaData>,

    /// Generated scoping documents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<GeneratedDocument>,
}

impl Request {
    /// Create a freshly submitted request at the `Scoping` stage.
    pub fn new(
        title: impl Into<String>,
        submitted_by: impl Into<String>,
        priority: Priority,
        now: DateTime<Utc>,
    ) -> Self {
        let submitted_by = submitted_by.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            stage: Stage::Scoping,
            owner: submitted_by.clone(),
            submitted_by: submitted_by.clone(),
            priority,
            complexity: None,
            created_at: Some(now),
            days_open: None,
            activity: vec![ActivityEntry::new(now, "Request submitted", submitted_by)],
            ai_alert: None,
            impact_assessment: None,
            sla: None,
            documents: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the complexity.
    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Complexity with the `medium` default applied.
    pub fn effective_complexity(&self) -> Complexity {
        self.complexity.unwrap_or_default()
    }

    /// Creation time, estimated from `days_open` for records that predate `created_at`.
    ///
    /// An age outside chrono's range saturates at the earliest (or, for a
    /// negative age, latest) representable instant.
    pub fn effective_created_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.created_at.unwrap_or_else(|| {
            let days = self.days_open.unwrap_or(0);
            Duration::try_days(days).and_then(|age| now.checked_sub_signed(age)).unwrap_or(
                if days < 0 { DateTime::<Utc>::MAX_UTC } else { DateTime::<Utc>::MIN_UTC },
            )
        })
    }

    /// Current impact score, if the request has been assessed.
    pub fn impact_score(&self) -> Option<f64> {
        self.impact_assessment.as_ref().map(|a| a.total_score)
    }

    /// Append an entry to the activity log.
    pub fn log(
        &mut self,
        timestamp: DateTime<Utc>,
        action: impl Into<String>,
        user: impl Into<String>,
    ) {
        self.activity.push(ActivityEntry::new(timestamp, action, user));
    }
}

/// What a requester fills in at intake, before scoring and routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    pub submitted_by: String,
}

impl RequestDraft {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        submitted_by: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority,
            submitted_by: submitted_by.into(),
        }
    }

    /// Build the request record, still unrouted and unassessed.
    pub fn into_request(self, now: DateTime<Utc>) -> Request {
        Request::new(self.title, self.submitted_by, self.priority, now)
            .with_description(self.description)
    }
}

/// One line of a request's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub user: String,
}

impl ActivityEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        action: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self { timestamp, action: action.into(), user: user.into() }
    }
}

/// Business priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Delivery complexity, which drives the SLA window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        };
        f.write_str(name)
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            other => Err(format!("unknown complexity '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_new_request_starts_in_scoping() {
        let request = Request::new("Export CSV", "alice", Priority::High, now());

        assert_eq!(request.stage, Stage::Scoping);
        assert_eq!(request.owner, "alice");
        assert_eq!(request.activity.len(), 1);
        assert_eq!(request.created_at, Some(now()));
    }

    #[test]
    fn test_complexity_defaults_to_medium() {
        let request = Request::new("Export CSV", "alice", Priority::Low, now());
        assert_eq!(request.effective_complexity(), Complexity::Medium);
    }

    #[test]
    fn test_created_at_fallback_uses_days_open() {
        let mut request = Request::new("Legacy", "bob", Priority::Low, now());
        request.created_at = None;
        request.days_open = Some(4);

        assert_eq!(request.effective_created_at(now()), now() - Duration::days(4));
    }

    #[test]
    fn test_out_of_range_days_open_saturates() {
        let mut request = Request::new("Legacy", "bob", Priority::Low, now());
        request.created_at = None;

        request.days_open = Some(i64::MAX / 2);
        assert_eq!(request.effective_created_at(now()), DateTime::<Utc>::MIN_UTC);

        request.days_open = Some(i64::MIN / 2);
        assert_eq!(request.effective_created_at(now()), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let json = serde_json::json!({
            "id": "req-1",
            "title": "Dark mode",
            "stage": "Ready for Dev",
            "owner": "dana",
            "submittedBy": "erin",
            "priority": "Medium",
            "complexity": "simple",
            "aiAlert": "Possible duplicate of req-0"
        });

        let request: Request = serde_json::from_value(json).unwrap();
        assert_eq!(request.stage, Stage::ReadyForDev);
        assert_eq!(request.complexity, Some(Complexity::Simple));
        assert_eq!(request.ai_alert.as_deref(), Some("Possible duplicate of req-0"));
        assert!(request.activity.is_empty());
        assert!(request.created_at.is_none());
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
