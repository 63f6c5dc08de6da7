use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Turns kept per user; the oldest is evicted first.
pub const MEMORY_TURN_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-user bounded conversation history. Histories are created on first use
/// and live for the lifetime of the process.
#[derive(Debug)]
pub struct ConversationMemory {
    limit: usize,
    turns: RwLock<HashMap<String, VecDeque<ConversationTurn>>>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::with_limit(MEMORY_TURN_LIMIT)
    }
}

impl ConversationMemory {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: limit.max(1), turns: RwLock::new(HashMap::new()) }
    }

    pub async fn record(&self, user_id: &str, turn: ConversationTurn) {
        let mut turns = self.turns.write().await;
        let history = turns.entry(user_id.to_string()).or_default();
        history.push_back(turn);
        while history.len() > self.limit {
            history.pop_front();
        }
    }

    /// Oldest first.
    pub async fn history(&self, user_id: &str) -> Vec<ConversationTurn> {
        self.turns
            .read()
            .await
            .get(user_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn user_count(&self) -> usize {
        self.turns.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ConversationMemory, ConversationTurn, MEMORY_TURN_LIMIT};

    fn turn(index: usize) -> ConversationTurn {
        ConversationTurn {
            user: format!("question {index}"),
            assistant: format!("answer {index}"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn keeps_only_the_most_recent_turns() {
        let memory = ConversationMemory::default();
        for index in 0..MEMORY_TURN_LIMIT + 3 {
            memory.record("user_1", turn(index)).await;
        }

        let history = memory.history("user_1").await;
        assert_eq!(history.len(), MEMORY_TURN_LIMIT);
        assert_eq!(history[0].user, "question 3");
        assert_eq!(history[MEMORY_TURN_LIMIT - 1].user, "question 12");
    }

    #[tokio::test]
    async fn histories_are_per_user_and_created_lazily() {
        let memory = ConversationMemory::default();
        assert_eq!(memory.user_count().await, 0);
        assert!(memory.history("nobody").await.is_empty());

        memory.record("a", turn(1)).await;
        memory.record("b", turn(2)).await;
        memory.record("a", turn(3)).await;

        assert_eq!(memory.user_count().await, 2);
        assert_eq!(memory.history("a").await.len(), 2);
        assert_eq!(memory.history("b").await[0].assistant, "answer 2");
    }
}
