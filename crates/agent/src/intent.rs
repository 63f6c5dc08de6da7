//! Deterministic keyword classifier.
//!
//! Rules are evaluated in a fixed order:
//! 1. order context + policy keyword → `policy_question` (0.9)
//! 2. any violation keyword → `violation` (1.0)
//! 3. first intent in [`PRIORITY`] with a matching phrase → that intent (0.8)
//! 4. nothing matched → `off_topic` (0.4)

use std::sync::LazyLock;

use regex::Regex;
use shopdesk_core::domain::intent::{Classification, DetectionMethod, IntentKind};

pub const ORDER_CONTEXT_POLICY_CONFIDENCE: f32 = 0.9;
pub const VIOLATION_CONFIDENCE: f32 = 1.0;
pub const KEYWORD_CONFIDENCE: f32 = 0.8;
pub const FALLBACK_CONFIDENCE: f32 = 0.4;

pub const PRIORITY: [IntentKind; 6] = [
    IntentKind::OrderStatus,
    IntentKind::ProductSearch,
    IntentKind::PolicyQuestion,
    IntentKind::Complaint,
    IntentKind::Chitchat,
    IntentKind::OffTopic,
];

static ORDER_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\border\s*#?\d*\b|\border\s+number|\bmy\s+order\b")
        .expect("valid order context regex")
});

const ORDER_CONTEXT_POLICY_WORDS: [&str; 7] =
    ["policy", "return", "refund", "exchange", "shipping", "payment", "privacy"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordRule {
    pub intent: IntentKind,
    pub phrases: Vec<&'static str>,
}

#[derive(Clone, Debug)]
enum Matcher {
    Phrase(String),
    Word(Regex),
}

impl Matcher {
    fn compile(keyword: &str) -> Self {
        let keyword = keyword.to_lowercase();
        if keyword.contains(' ') {
            return Self::Phrase(keyword);
        }
        match Regex::new(&format!(r"\b{}\b", regex::escape(&keyword))) {
            Ok(regex) => Self::Word(regex),
            Err(_) => Self::Phrase(keyword),
        }
    }

    fn is_match(&self, input: &str) -> bool {
        match self {
            Self::Phrase(phrase) => input.contains(phrase.as_str()),
            Self::Word(regex) => regex.is_match(input),
        }
    }
}

#[derive(Clone, Debug)]
struct CompiledRule {
    intent: IntentKind,
    matchers: Vec<Matcher>,
}

impl CompiledRule {
    fn matches(&self, input: &str) -> bool {
        self.matchers.iter().any(|matcher| matcher.is_match(input))
    }
}

#[derive(Clone, Debug)]
pub struct IntentClassifier {
    rules: Vec<CompiledRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CompiledRule {
                intent: rule.intent,
                matchers: rule.phrases.iter().map(|phrase| Matcher::compile(phrase)).collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn classify(&self, text: &str) -> Classification {
        let input = text.trim().to_lowercase();

        if is_policy_question_with_order_context(&input) {
            return Classification::new(
                IntentKind::PolicyQuestion,
                ORDER_CONTEXT_POLICY_CONFIDENCE,
                DetectionMethod::OrderContextPolicy,
            );
        }

        if self.matches_intent(IntentKind::Violation, &input) {
            return Classification::new(
                IntentKind::Violation,
                VIOLATION_CONFIDENCE,
                DetectionMethod::Keyword,
            );
        }

        PRIORITY
            .into_iter()
            .find(|intent| self.matches_intent(*intent, &input))
            .map(|intent| Classification::new(intent, KEYWORD_CONFIDENCE, DetectionMethod::Keyword))
            .unwrap_or_else(|| {
                Classification::new(
                    IntentKind::OffTopic,
                    FALLBACK_CONFIDENCE,
                    DetectionMethod::Fallback,
                )
            })
    }

    /// Whether any phrase registered for `intent` matches the lowercased input.
    pub fn matches_intent(&self, intent: IntentKind, input: &str) -> bool {
        self.rules.iter().filter(|rule| rule.intent == intent).any(|rule| rule.matches(input))
    }

    pub fn intents(&self) -> Vec<IntentKind> {
        let mut intents = Vec::new();
        for rule in &self.rules {
            if !intents.contains(&rule.intent) {
                intents.push(rule.intent);
            }
        }
        intents
    }
}

fn is_policy_question_with_order_context(input: &str) -> bool {
    ORDER_CONTEXT.is_match(input)
        && ORDER_CONTEXT_POLICY_WORDS.iter().any(|keyword| input.contains(keyword))
}

pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule {
            intent: IntentKind::PolicyQuestion,
            phrases: vec![
                "return", "refund", "exchange", "purchase", "warranty", "policy", "policies",
                "shipping", "delivery", "ship", "international", "return policy", "money back",
                "guarantee", "discount", "student", "promo", "coupon", "payment", "credit card",
                "pay", "billing", "methods", "accept", "privacy", "data", "personal", "security",
                "secure", "protection", "cash on delivery", "cash", "cod", "how long", "how much",
                "what if", "can i", "do you", "used items",
            ],
        },
        KeywordRule {
            intent: IntentKind::OrderStatus,
            phrases: vec![
                "order status", "where is my order", "when will it arrive", "delivery date",
                "my orders", "order history", "past orders", "previous orders", "order #",
                "order number", "order id", "order confirmation", "status", "track", "package",
                "my recent orders", "can you check", "show me my recent orders",
                "show me my orders", "check my orders", "where is order", "track order",
                "track my order", "check order", "order tracking", "my order status",
                "when will my order",
            ],
        },
        KeywordRule {
            intent: IntentKind::ProductSearch,
            phrases: vec![
                "search", "find", "looking for", "products", "items", "catalog",
                "what do you have", "browse", "available", "summer", "show me", "dresses",
                "shirts", "pants", "shoes", "clothing", "apparel", "dress", "jackets", "jeans",
                "sell", "do you have", "have you got",
            ],
        },
        KeywordRule {
            intent: IntentKind::Complaint,
            phrases: vec![
                "complaint", "issue", "problem", "not happy", "frustrated", "bad experience",
                "terrible", "awful", "disappointed", "upset", "not working", "broken", "damaged",
                "wrong item", "missing", "problem with", "issue with", "late", "poor quality",
                "unacceptable", "unhappy",
            ],
        },
        KeywordRule {
            intent: IntentKind::Chitchat,
            phrases: vec![
                "hello", "hi", "hey", "how are you", "good morning", "good afternoon",
                "good evening", "what's up", "howdy", "greetings", "what's your name",
                "your name", "who are you", "help me with", "what can you", "can you help",
                "about your", "about the store", "thanks", "thank you", "thank", "appreciate",
            ],
        },
        KeywordRule {
            intent: IntentKind::OffTopic,
            phrases: vec![
                "weather", "tell me about", "sports", "politics", "movies", "music", "news",
                "joke", "tell me a story", "random", "off topic", "capital of", "2+2",
                "favorite color", "stock market",
            ],
        },
        KeywordRule {
            intent: IntentKind::Violation,
            phrases: vec![
                "fuck", "shit", "asshole", "bitch", "damn", "stupid", "idiot", "hate", "kill",
                "violence", "abusive", "inappropriate", "terrible service", "awful service",
                "horrible service", "worst service", "pissed off", "bullshit", "fucking",
                "you guys are", "you're all", "garbage", "trash", "rubbish", "worthless",
                "useless",
            ],
        },
    ]
}
