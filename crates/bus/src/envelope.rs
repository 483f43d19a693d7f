//! Wire envelopes for the correlation protocol.
//!
//! Every payload crossing a topic is one of these JSON-serializable types,
//! correlated end-to-end by the `id` the intake layer generated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a request, carried explicitly on the record.
///
/// `expired` has no variant: a request whose record was never written (or
/// already discarded) is observable only as absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Completed,
    Failed,
}

/// Published on the `questions` topic by the intake layer. Written once,
/// never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEnvelope {
    pub id: Uuid,
    pub question: String,
    pub k: usize,
    pub created_at: DateTime<Utc>,
}

impl QuestionEnvelope {
    pub fn new(question: impl Into<String>, k: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            k,
            created_at: Utc::now(),
        }
    }
}

/// Published on the `generation` topic by the retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationEnvelope {
    pub id: Uuid,
    pub question: String,
    pub contexts: Vec<String>,
}

/// Terminal record written exactly once per request id, keyed by that id in
/// the response store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: Uuid,
    pub question: String,
    pub contexts: Vec<String>,
    pub answer: String,
    pub status: RequestStatus,
    /// Error detail, present only on failed records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_seconds: f64,
}

impl ResponseRecord {
    /// A successful completion.
    pub fn completed(
        id: Uuid,
        question: impl Into<String>,
        contexts: Vec<String>,
        answer: impl Into<String>,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            id,
            question: question.into(),
            contexts,
            answer: answer.into(),
            status: RequestStatus::Completed,
            error: None,
            elapsed_seconds,
        }
    }

    /// A failed completion carrying the error detail, so the poller
    /// terminates deterministically instead of timing out.
    pub fn failed(
        id: Uuid,
        question: impl Into<String>,
        detail: impl Into<String>,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            id,
            question: question.into(),
            contexts: Vec::new(),
            answer: String::new(),
            status: RequestStatus::Failed,
            error: Some(detail.into()),
            elapsed_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_envelope_roundtrip() {
        let envelope = QuestionEnvelope::new("What is Docker?", 3);
        let json = serde_json::to_string(&envelope).unwrap();
        let back: QuestionEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, envelope.id);
        assert_eq!(back.question, "What is Docker?");
        assert_eq!(back.k, 3);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RequestStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let json = serde_json::to_string(&RequestStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }

    #[test]
    fn test_completed_record_has_no_error() {
        let record = ResponseRecord::completed(
            Uuid::new_v4(),
            "q",
            vec!["ctx".to_string()],
            "an answer",
            0.5,
        );
        assert_eq!(record.status, RequestStatus::Completed);
        assert!(record.error.is_none());

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_failed_record_carries_detail() {
        let record = ResponseRecord::failed(Uuid::new_v4(), "q", "missing field: contexts", 0.1);
        assert_eq!(record.status, RequestStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("missing field: contexts"));
        assert!(record.answer.is_empty());
    }
}
