//! Tier-1 impact scoring at intake.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{extract_json, AIError, GenerationProvider, Prompt};
use crate::workflow::{parse_assessment, ImpactAssessment, RequestDraft, SumPolicy, DIMENSIONS};

/// Name recorded as the assessor of generated assessments.
pub const AI_ASSESSOR: &str = "AI";

/// Asks a provider for an impact assessment and validates the answer.
pub struct ImpactScorer {
    provider: Arc<dyn GenerationProvider>,
    policy: SumPolicy,
    timeout: Duration,
}

impl ImpactScorer {
    pub fn new(provider: Arc<dyn GenerationProvider>) -> Self {
        Self { provider, policy: SumPolicy::default(), timeout: Duration::from_secs(120) }
    }

    pub fn with_policy(mut self, policy: SumPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Score a draft. The result is always tier 1, whatever the model claims.
    pub async fn score(
        &self,
        draft: &RequestDraft,
        now: DateTime<Utc>,
    ) -> Result<ImpactAssessment, AIError> {
        let prompt = scoring_prompt(draft);
        let text = tokio::time::timeout(self.timeout, self.provider.generate(&prompt))
            .await
            .map_err(|_| AIError::Timeout(self.timeout))??;

        let mut value = extract_json(&text)?;
        if let Value::Object(obj) = &mut value {
            obj.insert("tier".to_string(), Value::from(1));
        }

        let assessment = parse_assessment(&value, AI_ASSESSOR, now, self.policy)?;
        tracing::debug!(
            provider = self.provider.name(),
            score = assessment.total_score,
            "Impact assessment generated"
        );
        Ok(assessment)
    }
}

fn scoring_prompt(draft: &RequestDraft) -> Prompt {
    let dimensions = DIMENSIONS
        .iter()
        .map(|(name, max)| format!("- {name}: 0 to {max}"))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        r#"You assess the business impact of change requests.
Score each dimension within its range:
{dimensions}

Respond with a single JSON object only:
{{ "totalScore": number, "breakdown": {{ ... }}, "justification": string,
   "dependencies": [string], "risks": [string] }}
totalScore must equal the sum of the breakdown."#
    );

    let user = format!(
        "Title: {}\nPriority: {}\nSubmitted by: {}\n\n{}",
        draft.title, draft.priority, draft.submitted_by, draft.description
    );
    Prompt::new(system, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedProvider;
    use crate::workflow::{Priority, Tier, ValidationError};

    fn draft() -> RequestDraft {
        RequestDraft::new("Invoice export", "Finance needs CSV exports", Priority::High, "maria")
    }

    const VALID: &str = r#"```json
{
  "totalScore": 72,
  "breakdown": { "revenueImpact": 25, "userReach": 20, "strategicAlignment": 12,
                 "urgency": 10, "quickWinBonus": 5 },
  "tier": 3,
  "justification": "Blocks month-end close"
}
```"#;

    #[tokio::test]
    async fn test_score_is_always_tier_one() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(VALID.to_string())]));
        let scorer = ImpactScorer::new(provider.clone());

        let assessment = scorer.score(&draft(), Utc::now()).await.unwrap();

        assert_eq!(assessment.tier, Tier::Ai);
        assert_eq!(assessment.total_score, 72.0);
        assert_eq!(assessment.assessed_by, AI_ASSESSOR);
        let prompts = provider.prompts.lock();
        assert!(prompts[0].user.contains("Invoice export"));
        assert!(prompts[0].system.contains(r#"{ "totalScore": number, "breakdown": {"#));
        assert!(prompts[0].system.contains("revenueImpact: 0 to 30"));
    }

    #[tokio::test]
    async fn test_out_of_range_dimension_rejected() {
        let body = VALID.replace("\"revenueImpact\": 25", "\"revenueImpact\": 45");
        let scorer = ImpactScorer::new(Arc::new(ScriptedProvider::new(vec![Ok(body)])));

        let err = scorer.score(&draft(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AIError::Invalid(ValidationError::DimensionOutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_prose_answer_is_parse_error() {
        let reply = "I think this is quite important.".to_string();
        let scorer = ImpactScorer::new(Arc::new(ScriptedProvider::new(vec![Ok(reply)])));

        assert!(matches!(
            scorer.score(&draft(), Utc::now()).await,
            Err(AIError::Parse { .. })
        ));
    }
}
