//! UI-agnostic conversation types
//!
//! This module contains the message and backend reply types shared between the
//! core and any front-end. They serialize with the same field names the RAG
//! backend and the persisted session history use.

use serde::{Deserialize, Serialize};

/// A chat message in the conversation. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceReference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
            confidence: None,
        }
    }

    /// A plain assistant message (errors and local notices carry no sources).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: None,
            confidence: None,
        }
    }

    /// Build the assistant message for a successful backend reply.
    pub fn from_response(response: QueryResponse) -> Self {
        Self {
            role: Role::Assistant,
            content: response.answer,
            sources: Some(response.sources),
            confidence: Some(response.confidence),
        }
    }

    /// Sources worth listing under the message (absent and empty look the same).
    pub fn visible_sources(&self) -> &[SourceReference] {
        self.sources.as_deref().unwrap_or(&[])
    }

    /// Badge label to show under the message, if any.
    pub fn confidence_badge(&self) -> Option<&'static str> {
        self.confidence.and_then(|c| c.badge())
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Backend-reported certainty tier for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    None,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::None => "none",
        }
    }

    /// High-confidence answers get no badge.
    pub fn badge(&self) -> Option<&'static str> {
        match self {
            Confidence::High => None,
            Confidence::Medium => Some("Medium confidence"),
            Confidence::Low => Some("Low confidence"),
            Confidence::None => Some("Not found"),
        }
    }
}

/// A citation pointing back into the textbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub chapter_title: String,
    pub section_title: String,
    // Older backend builds omit the module field.
    #[serde(default)]
    pub module: String,
    pub url: String,
    pub relevance_score: f64,
}

impl SourceReference {
    /// Relevance as a whole percentage, e.g. 0.92 -> 92.
    pub fn relevance_percent(&self) -> u32 {
        (self.relevance_score.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

/// Successful reply from `POST /query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceReference>,
    pub confidence: Confidence,
    pub mode_used: String,
    pub chunks_retrieved: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(score: f64) -> SourceReference {
        SourceReference {
            chapter_title: "Chapter 1: Introduction to ROS 2".to_string(),
            section_title: "What is ROS 2?".to_string(),
            module: "module-1-ros2".to_string(),
            url: "/module-1-ros2/chapter-1#what-is-ros2".to_string(),
            relevance_score: score,
        }
    }

    #[test]
    fn test_relevance_percent_rounds() {
        assert_eq!(source(0.92).relevance_percent(), 92);
        assert_eq!(source(0.875).relevance_percent(), 88);
        assert_eq!(source(0.0).relevance_percent(), 0);
        assert_eq!(source(1.0).relevance_percent(), 100);
    }

    #[test]
    fn test_confidence_badges() {
        assert_eq!(Confidence::High.badge(), None);
        assert_eq!(Confidence::Medium.badge(), Some("Medium confidence"));
        assert_eq!(Confidence::Low.badge(), Some("Low confidence"));
        assert_eq!(Confidence::None.badge(), Some("Not found"));
    }

    #[test]
    fn test_response_decodes_without_module() {
        let json = r#"{
            "answer": "ROS 2 is...",
            "sources": [{"chapter_title": "c", "section_title": "s", "url": "/u", "relevance_score": 0.5}],
            "confidence": "medium",
            "mode_used": "global",
            "chunks_retrieved": 3
        }"#;
        let response: QueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.sources[0].module, "");
        assert_eq!(response.confidence, Confidence::Medium);
    }

    #[test]
    fn test_unknown_confidence_is_rejected() {
        let json = r#"{"answer": "a", "sources": [], "confidence": "certain", "mode_used": "global", "chunks_retrieved": 0}"#;
        assert!(serde_json::from_str::<QueryResponse>(json).is_err());
    }

    #[test]
    fn test_plain_messages_persist_without_optional_fields() {
        let json = serde_json::to_string(&Message::user("hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
    }

    #[test]
    fn test_message_from_response_keeps_citations() {
        let msg = Message::from_response(QueryResponse {
            answer: "ROS 2 is...".to_string(),
            sources: vec![source(0.92)],
            confidence: Confidence::High,
            mode_used: "global".to_string(),
            chunks_retrieved: 4,
        });
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.visible_sources().len(), 1);
        assert_eq!(msg.confidence_badge(), None);
    }
}
