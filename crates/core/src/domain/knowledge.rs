use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseEntry {
    pub id: PolicyId,
    pub category: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl KnowledgeBaseEntry {
    pub fn validate(&self) -> Result<(), DomainError> {
        let reason = if self.id.0.trim().is_empty() {
            Some("id is blank")
        } else if self.question.trim().is_empty() {
            Some("question is blank")
        } else if self.answer.trim().is_empty() {
            Some("answer is blank")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(DomainError::InvalidKnowledgeEntry {
                id: self.id.0.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// The answer followed by its citation token, e.g. `... [Policy1.1]`.
    pub fn cited_answer(&self) -> String {
        format!("{} [{}]", self.answer.trim(), self.id.0)
    }
}

/// Static policy Q&A set, loaded once and immutable afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeBaseEntry>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<KnowledgeBaseEntry>) -> Self {
        Self { entries }
    }

    /// Reads a JSON array of entries. A missing or malformed file yields an
    /// empty knowledge base; invalid entries are skipped.
    pub fn load_or_empty(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "assistant.knowledge_base.unavailable",
                    path = %path.display(),
                    error = %error,
                    "knowledge base not found, using empty set"
                );
                return Self::default();
            }
        };

        let parsed = match serde_json::from_str::<Vec<KnowledgeBaseEntry>>(&raw) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(
                    event_name = "assistant.knowledge_base.malformed",
                    path = %path.display(),
                    error = %error,
                    "knowledge base could not be parsed, using empty set"
                );
                return Self::default();
            }
        };

        let mut entries = Vec::with_capacity(parsed.len());
        for entry in parsed {
            match entry.validate() {
                Ok(()) => entries.push(entry),
                Err(error) => warn!(
                    event_name = "assistant.knowledge_base.entry_skipped",
                    error = %error,
                    "skipping invalid knowledge base entry"
                ),
            }
        }

        info!(
            event_name = "assistant.knowledge_base.loaded",
            path = %path.display(),
            entry_count = entries.len(),
            "knowledge base loaded"
        );
        Self { entries }
    }

    pub fn entries(&self) -> &[KnowledgeBaseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.0.as_str()).collect()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id.0 == id)
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeBaseEntry> {
        self.entries.iter().find(|entry| entry.id.0 == id)
    }

    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for entry in &self.entries {
            if !seen.insert(entry.id.0.as_str()) && !duplicates.contains(&entry.id.0) {
                duplicates.push(entry.id.0.clone());
            }
        }
        duplicates
    }
}
