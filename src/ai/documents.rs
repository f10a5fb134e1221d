//! Scoping document generation.
//!
//! The three documents are generated one after another, each streamed, and
//! each later prompt sees the documents already produced.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{decode_stream, AIError, DecodeOptions, GenerationProvider, Prompt};
use crate::workflow::{DocumentKind, GeneratedDocument, Request};

/// Progress of a [`DocumentGenerator::generate_all`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationProgress {
    /// 1-based position of the current document
    pub step: usize,
    pub total: usize,
    pub kind: DocumentKind,
    /// Characters received so far for this document
    pub received: usize,
}

/// Generates the scoping document set for a request.
pub struct DocumentGenerator {
    provider: Arc<dyn GenerationProvider>,
    options: DecodeOptions,
}

impl DocumentGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>, options: DecodeOptions) -> Self {
        Self { provider, options }
    }

    /// Generate every document kind in order.
    ///
    /// Output that is not valid JSON is replaced by a placeholder document.
    /// Any other failure aborts the run.
    pub async fn generate_all(
        &self,
        request: &Request,
        now: DateTime<Utc>,
        mut on_progress: impl FnMut(GenerationProgress) + Send,
    ) -> Result<Vec<GeneratedDocument>, AIError> {
        let total = DocumentKind::ALL.len();
        let mut documents: Vec<GeneratedDocument> = Vec::with_capacity(total);

        for (index, kind) in DocumentKind::ALL.into_iter().enumerate() {
            let step = index + 1;
            on_progress(GenerationProgress { step, total, kind, received: 0 });

            let prompt = document_prompt(kind, request, &documents);
            let stream = tokio::time::timeout(self.options.timeout, self.provider.stream(&prompt))
                .await
                .map_err(|_| AIError::Timeout(self.options.timeout))??;
            let decoded = decode_stream(stream, &self.options, |text| {
                on_progress(GenerationProgress { step, total, kind, received: text.len() });
            })
            .await;

            let document = match decoded {
                Ok(content) => GeneratedDocument::new(kind, content, now),
                Err(AIError::Parse { message, excerpt }) => {
                    tracing::warn!(
                        kind = %kind,
                        error = %message,
                        excerpt = %excerpt,
                        "Generated document is not valid JSON, using placeholder"
                    );
                    GeneratedDocument::placeholder(kind, now)
                }
                Err(e) => return Err(e),
            };
            documents.push(document);
        }

        tracing::info!(
            request = %request.id,
            count = documents.len(),
            "Generated scoping documents"
        );
        Ok(documents)
    }
}

fn document_prompt(
    kind: DocumentKind,
    request: &Request,
    earlier: &[GeneratedDocument],
) -> Prompt {
    let shape = match kind {
        DocumentKind::Prd => {
            r#"{ "title": string, "problem": string, "goals": [string], "nonGoals": [string],
  "requirements": [string], "successMetrics": [string] }"#
        }
        DocumentKind::UserStories => {
            r#"{ "title": string, "stories": [{ "asA": string, "iWant": string,
  "soThat": string, "acceptanceCriteria": [string] }] }"#
        }
        DocumentKind::TechnicalSpec => {
            r#"{ "title": string, "overview": string, "components": [string],
  "dataChanges": [string], "risks": [string], "estimate": string }"#
        }
    };

    let system = format!(
        "You write the {} for a change request.\n\
         Respond with a single JSON object only, shaped as:\n{shape}",
        kind.title()
    );

    let mut user = format!(
        "Title: {}\nPriority: {}\nComplexity: {}\n\n{}",
        request.title,
        request.priority,
        request.effective_complexity(),
        request.description
    );
    for document in earlier {
        user.push_str(&format!("\n\n{}:\n{}", document.kind.title(), document.content));
    }
    Prompt::new(system, user)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ai::testing::ScriptedProvider;
    use crate::ai::ChunkStream;
    use crate::workflow::Priority;

    fn request() -> Request {
        Request::new("Saved searches", "omar", Priority::Medium, Utc::now())
    }

    #[tokio::test]
    async fn test_generates_in_order_with_progress() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"title":"PRD"}"#.to_string()),
            Ok(r#"{"title":"Stories"}"#.to_string()),
            Ok(r#"{"title":"Tech"}"#.to_string()),
        ]));
        let generator = DocumentGenerator::new(provider.clone(), DecodeOptions::default());

        let mut steps = Vec::new();
        let documents = generator
            .generate_all(&request(), Utc::now(), |p| {
                if p.received == 0 {
                    steps.push((p.step, p.kind));
                }
            })
            .await
            .unwrap();

        assert_eq!(
            steps,
            vec![
                (1, DocumentKind::Prd),
                (2, DocumentKind::UserStories),
                (3, DocumentKind::TechnicalSpec)
            ]
        );
        assert_eq!(documents.len(), 3);
        assert!(documents.iter().all(|d| !d.fallback && !d.approved));

        // Later prompts carry earlier output
        let prompts = provider.prompts.lock();
        assert!(prompts[2].user.contains("\"Stories\""));
    }

    #[tokio::test]
    async fn test_unparseable_document_falls_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"title":"PRD"}"#.to_string()),
            Ok("Sorry, here are some stories in prose".to_string()),
            Ok(r#"{"title":"Tech"}"#.to_string()),
        ]));
        let generator = DocumentGenerator::new(provider, DecodeOptions::default());

        let documents = generator.generate_all(&request(), Utc::now(), |_| {}).await.unwrap();

        assert!(documents[1].fallback);
        assert_eq!(documents[1].content["sections"], serde_json::json!([]));
        assert!(!documents[2].fallback);
    }

    struct StalledProvider;

    #[async_trait::async_trait]
    impl GenerationProvider for StalledProvider {
        async fn generate(&self, _prompt: &Prompt) -> Result<String, AIError> {
            std::future::pending().await
        }

        async fn stream(&self, _prompt: &Prompt) -> Result<ChunkStream, AIError> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_stream_that_never_opens_times_out() {
        let options = DecodeOptions { timeout: Duration::from_millis(50), ..Default::default() };
        let generator = DocumentGenerator::new(Arc::new(StalledProvider), options);

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            generator.generate_all(&request(), Utc::now(), |_| {}),
        )
        .await
        .expect("generation should give up on its own");

        assert!(matches!(result, Err(AIError::Timeout(d)) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_other_errors_abort() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(r#"{"title":"PRD"}"#.to_string()),
            Err(AIError::ApiError("500".into())),
        ]));
        let generator = DocumentGenerator::new(provider.clone(), DecodeOptions::default());

        let result = generator.generate_all(&request(), Utc::now(), |_| {}).await;

        assert!(matches!(result, Err(AIError::ApiError(_))));
        assert_eq!(provider.prompts.lock().len(), 2);
    }
}
