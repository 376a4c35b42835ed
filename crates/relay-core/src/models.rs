use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A single entry in the reference source list consumed at startup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SourceRef {
    /// Addressable location of the document (http/https URL).
    pub url: String,
    /// Optional human-readable title for logs and reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SourceRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A fetched document ready for ingestion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Document {
    pub source: SourceRef,
    pub content: String,
}

/// A chat request from the surrounding service.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatRequest {
    /// The user's question.
    pub query: String,
    /// Conversation scope; requests in different conversations never share
    /// cached responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Deterministic cache fingerprint: SHA-256 over the whitespace-normalized
    /// query plus the conversation scope.
    pub fn fingerprint(&self) -> String {
        let normalized = self.query.split_whitespace().collect::<Vec<_>>().join(" ");
        compute_fingerprint(&normalized, self.conversation_id.as_deref())
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A chat response from the backend.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub usage: Usage,
}

/// One failed item in a bulk-load run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadFailure {
    pub source: SourceRef,
    pub reason: String,
}

/// Summary of a bulk-load run (startup or manual reload).
#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// True when `initialize()` found an already-populated store and issued
    /// zero fetches.
    pub skipped: bool,
    pub total: usize,
    pub processed: usize,
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Compute a SHA-256 fingerprint for a query within a conversation scope,
/// returned as 64-char hex.
pub fn compute_fingerprint(query: &str, scope: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(scope.unwrap_or("").as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = compute_fingerprint("what is relay?", Some("conv-1"));
        let b = compute_fingerprint("what is relay?", Some("conv-1"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_varies_by_scope() {
        let a = compute_fingerprint("what is relay?", Some("conv-1"));
        let b = compute_fingerprint("what is relay?", Some("conv-2"));
        let c = compute_fingerprint("what is relay?", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn request_fingerprint_normalizes_whitespace() {
        let a = ChatRequest::new("what  is\n relay?").fingerprint();
        let b = ChatRequest::new("what is relay?").fingerprint();
        assert_eq!(a, b);
    }

    #[test]
    fn source_list_deserializes() {
        let json = r#"[{"url": "https://docs.example.com/a", "title": "A"},
                       {"url": "https://docs.example.com/b"}]"#;
        let sources: Vec<SourceRef> = serde_json::from_str(json).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title.as_deref(), Some("A"));
        assert!(sources[1].title.is_none());
    }
}
