//! Scoping documents generated for a request.
//!
//! Each request gets three artifacts during scoping. A product owner must
//! approve all of them before the request can move to development.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// Product requirements document
    Prd,
    UserStories,
    TechnicalSpec,
}

impl DocumentKind {
    /// Generation order.
    pub const ALL: [Self; 3] = [Self::Prd, Self::UserStories, Self::TechnicalSpec];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prd => "prd",
            Self::UserStories => "user-stories",
            Self::TechnicalSpec => "technical-spec",
        }
    }

    /// Human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Prd => "Product Requirements",
            Self::UserStories => "User Stories",
            Self::TechnicalSpec => "Technical Specification",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown document kind '{s}'"))
    }
}

/// A generated document and its approval state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub kind: DocumentKind,

    /// Structured document body
    pub content: Value,

    pub generated_at: DateTime<Utc>,

    #[serde(default)]
    pub approved: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    /// Content is a placeholder because generation output could not be parsed
    #[serde(default)]
    pub fallback: bool,
}

impl GeneratedDocument {
    pub fn new(kind: DocumentKind, content: Value, generated_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            content,
            generated_at,
            approved: false,
            approved_by: None,
            approved_at: None,
            fallback: false,
        }
    }

    /// Minimal placeholder used when generation output is unusable.
    pub fn placeholder(kind: DocumentKind, generated_at: DateTime<Utc>) -> Self {
        let content = serde_json::json!({ "title": kind.title(), "sections": [] });
        Self { fallback: true, ..Self::new(kind, content, generated_at) }
    }

    /// Mark approved. Returns false if it already was.
    pub fn approve(&mut self, by: &str, at: DateTime<Utc>) -> bool {
        if self.approved {
            return false;
        }
        self.approved = true;
        self.approved_by = Some(by.to_string());
        self.approved_at = Some(at);
        true
    }
}

/// Whether a non-empty document set is fully approved.
pub fn all_approved(documents: &[GeneratedDocument]) -> bool {
    !documents.is_empty() && documents.iter().all(|d| d.approved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_all_approved_requires_documents() {
        assert!(!all_approved(&[]));

        let mut docs: Vec<GeneratedDocument> = DocumentKind::ALL
            .into_iter()
            .map(|k| GeneratedDocument::new(k, Value::Null, now()))
            .collect();
        assert!(!all_approved(&docs));

        for doc in &mut docs {
            doc.approve("po", now());
        }
        assert!(all_approved(&docs));
    }

    #[test]
    fn test_approve_is_idempotent() {
        let mut doc = GeneratedDocument::new(DocumentKind::Prd, Value::Null, now());
        assert!(doc.approve("po", now()));
        assert!(!doc.approve("someone-else", now()));
        assert_eq!(doc.approved_by.as_deref(), Some("po"));
    }

    #[test]
    fn test_placeholder_is_marked_fallback() {
        let doc = GeneratedDocument::placeholder(DocumentKind::UserStories, now());
        assert!(doc.fallback);
        assert_eq!(doc.content["title"], "User Stories");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("USER-STORIES".parse::<DocumentKind>().unwrap(), DocumentKind::UserStories);
        assert!("roadmap".parse::<DocumentKind>().is_err());
    }
}
