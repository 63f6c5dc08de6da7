use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    PolicyQuestion,
    OrderStatus,
    ProductSearch,
    Complaint,
    Chitchat,
    OffTopic,
    Violation,
    Error,
}

impl IntentKind {
    pub const ALL: [IntentKind; 8] = [
        Self::PolicyQuestion,
        Self::OrderStatus,
        Self::ProductSearch,
        Self::Complaint,
        Self::Chitchat,
        Self::OffTopic,
        Self::Violation,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyQuestion => "policy_question",
            Self::OrderStatus => "order_status",
            Self::ProductSearch => "product_search",
            Self::Complaint => "complaint",
            Self::Chitchat => "chitchat",
            Self::OffTopic => "off_topic",
            Self::Violation => "violation",
            Self::Error => "error",
        }
    }

    /// Intents whose replies are always routed through the generation service.
    pub fn requires_generation(&self) -> bool {
        matches!(self, Self::PolicyQuestion | Self::OrderStatus | Self::ProductSearch)
    }

    /// Intents that may trigger backend function calls.
    pub fn uses_functions(&self) -> bool {
        matches!(self, Self::OrderStatus | Self::ProductSearch)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| DomainError::UnknownIntent(value.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Keyword,
    OrderContextPolicy,
    Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: IntentKind,
    pub confidence: f32,
    pub method: DetectionMethod,
}

impl Classification {
    pub fn new(intent: IntentKind, confidence: f32, method: DetectionMethod) -> Self {
        Self { intent, confidence: confidence.clamp(0.0, 1.0), method }
    }
}

#[cfg(test)]
mod tests {
    use super::{Classification, DetectionMethod, IntentKind};

    #[test]
    fn labels_round_trip_through_from_str() {
        for intent in IntentKind::ALL {
            assert_eq!(intent.as_str().parse::<IntentKind>(), Ok(intent));
        }
        assert!("shopping".parse::<IntentKind>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_labels() {
        let encoded = serde_json::to_string(&IntentKind::PolicyQuestion).expect("serialize");
        assert_eq!(encoded, "\"policy_question\"");
    }

    #[test]
    fn generation_intents_are_the_grounded_three() {
        let generated = IntentKind::ALL
            .into_iter()
            .filter(IntentKind::requires_generation)
            .collect::<Vec<_>>();
        assert_eq!(
            generated,
            vec![IntentKind::PolicyQuestion, IntentKind::OrderStatus, IntentKind::ProductSearch]
        );
    }

    #[test]
    fn confidence_is_clamped() {
        let classification =
            Classification::new(IntentKind::Chitchat, 1.7, DetectionMethod::Keyword);
        assert_eq!(classification.confidence, 1.0);
    }
}
