//! Process-wide usage counters for the assistant.

use std::collections::BTreeMap;

use serde::Serialize;
use shopdesk_core::domain::intent::IntentKind;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCounts {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStats {
    pub total_queries: u64,
    pub intent_counts: BTreeMap<IntentKind, u64>,
    pub function_calls: BTreeMap<String, FunctionCounts>,
    pub successful_function_calls: u64,
    pub failed_function_calls: u64,
    pub generation_calls: u64,
    pub direct_responses: u64,
    pub fallback_responses: u64,
    pub errors: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub stats: RuntimeStats,
    pub generation_usage_percent: f64,
    pub direct_usage_percent: f64,
    pub conversation_memory_size: usize,
}

impl RuntimeStats {
    pub fn record_query(&mut self, intent: IntentKind) {
        self.total_queries += 1;
        *self.intent_counts.entry(intent).or_default() += 1;
    }

    pub fn record_function(&mut self, name: &str, success: bool) {
        let counts = self.function_calls.entry(name.to_string()).or_default();
        counts.calls += 1;
        if success {
            counts.successes += 1;
            self.successful_function_calls += 1;
        } else {
            counts.failures += 1;
            self.failed_function_calls += 1;
        }
    }

    pub fn record_generation(&mut self) {
        self.generation_calls += 1;
    }

    pub fn record_direct(&mut self) {
        self.direct_responses += 1;
    }

    pub fn record_fallback(&mut self) {
        self.fallback_responses += 1;
    }

    /// Counts a message that failed unexpectedly under the `error` intent.
    pub fn record_error(&mut self) {
        self.errors += 1;
        self.fallback_responses += 1;
        *self.intent_counts.entry(IntentKind::Error).or_default() += 1;
    }

    pub fn intent_count(&self, intent: IntentKind) -> u64 {
        self.intent_counts.get(&intent).copied().unwrap_or(0)
    }

    pub fn snapshot(&self, conversation_memory_size: usize) -> StatsSnapshot {
        StatsSnapshot {
            stats: self.clone(),
            generation_usage_percent: percentage(self.generation_calls, self.total_queries),
            direct_usage_percent: percentage(self.direct_responses, self.total_queries),
            conversation_memory_size,
        }
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 * 100.0 / total as f64;
    (raw * 100.0).round() / 100.0
}
