//! Request routing at intake.
//!
//! The router asks a provider who should own a new request, how complex it
//! looks, and whether it resembles existing work. The answer is untrusted and
//! goes through [`RoutingDecision::from_value`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{extract_json, AIError, GenerationProvider, Prompt};
use crate::workflow::{Complexity, RequestDraft, ValidationError};

/// Where a new request goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    /// Initial owner
    pub owner: String,

    /// Estimated complexity
    pub complexity: Complexity,

    /// Duplicate or conflict warning shown to the owner
    pub alert: Option<String>,
}

impl RoutingDecision {
    /// Decision used when routing is unavailable.
    pub fn fallback(default_owner: impl Into<String>) -> Self {
        Self { owner: default_owner.into(), complexity: Complexity::Medium, alert: None }
    }

    /// Read a decision from untrusted JSON.
    ///
    /// `owner` is required. An unknown or missing complexity becomes
    /// `medium`; a blank alert is dropped.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationError::Malformed("expected an object".into()))?;

        let owner = obj
            .get("owner")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or(ValidationError::MissingField("owner"))?
            .to_string();

        let complexity = match obj.get("complexity").and_then(Value::as_str) {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::debug!(error = %e, "Unrecognized complexity, using medium");
                Complexity::Medium
            }),
            None => Complexity::Medium,
        };

        let alert = obj
            .get("alert")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        Ok(Self { owner, complexity, alert })
    }
}

/// Asks a provider to route a draft.
pub struct RequestRouter {
    provider: Arc<dyn GenerationProvider>,
    timeout: Duration,
}

impl RequestRouter {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider, timeout: Duration::from_secs(120) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Route a draft. Fails if the provider fails or its answer is unusable.
    pub async fn route(&self, draft: &RequestDraft) -> Result<RoutingDecision, AIError> {
        let prompt = routing_prompt(draft);
        let text = tokio::time::timeout(self.timeout, self.provider.generate(&prompt))
            .await
            .map_err(|_| AIError::Timeout(self.timeout))??;

        let decision = RoutingDecision::from_value(&extract_json(&text)?)?;
        tracing::debug!(
            owner = %decision.owner,
            complexity = %decision.complexity,
            "Request routed"
        );
        Ok(decision)
    }
}

fn routing_prompt(draft: &RequestDraft) -> Prompt {
    let system = r#"You route incoming change requests to an owning team.
Respond with a single JSON object only:
{ "owner": string, "complexity": "simple" | "medium" | "complex", "alert": string | null }
Set "alert" when the request looks like a duplicate of, or conflicts with, existing work."#;

    let user =
        format!("Title: {}\nPriority: {}\n\n{}", draft.title, draft.priority, draft.description);
    Prompt::new(system, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedProvider;
    use crate::workflow::Priority;
    use serde_json::json;

    #[test]
    fn test_from_value_defaults() {
        let decision = RoutingDecision::from_value(&json!({ "owner": "payments" })).unwrap();
        assert_eq!(decision, RoutingDecision {
            owner: "payments".into(),
            complexity: Complexity::Medium,
            alert: None,
        });

        let decision = RoutingDecision::from_value(&json!({
            "owner": "payments", "complexity": "gigantic", "alert": "  "
        }))
        .unwrap();
        assert_eq!(decision.complexity, Complexity::Medium);
        assert_eq!(decision.alert, None);
    }

    #[test]
    fn test_from_value_requires_owner() {
        assert_eq!(
            RoutingDecision::from_value(&json!({ "owner": "" })),
            Err(ValidationError::MissingField("owner"))
        );
        assert!(RoutingDecision::from_value(&json!(["payments"])).is_err());
    }

    #[tokio::test]
    async fn test_route() {
        let reply = r#"{"owner":"billing","complexity":"simple","alert":"Similar to REQ-12"}"#;
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(reply.to_string())]));
        let router = RequestRouter::new(provider);
        let draft = RequestDraft::new("Invoice export", "", Priority::Low, "maria");

        let decision = router.route(&draft).await.unwrap();
        assert_eq!(decision.owner, "billing");
        assert_eq!(decision.complexity, Complexity::Simple);
        assert_eq!(decision.alert.as_deref(), Some("Similar to REQ-12"));
    }
}
