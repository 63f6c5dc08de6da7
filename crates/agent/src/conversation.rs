//! Parameter extraction from free-form customer messages.
//!
//! Everything here is pattern based and deterministic. The extractor never
//! calls the commerce backend; it only decides what a backend call would need.

use std::sync::LazyLock;

use regex::Regex;
use shopdesk_core::domain::intent::IntentKind;

pub const MIN_SEARCH_QUERY_CHARS: usize = 2;
pub const MAX_SEARCH_QUERY_CHARS: usize = 100;

static ORDER_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:order|order number|order id|orderid|#|track|status of|where is)[:\s]*(ord_\d+_[a-zA-Z0-9]{9,})",
        r"(?i)(ord_\d+_[a-zA-Z0-9]{9,})",
        r"(?i)\b(ord_[a-zA-Z0-9_]{10,})\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid order id regex"))
    .collect()
});

static SEARCH_LEAD_INS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:search|find|look for|show me|looking for|have|got|carry|sell)\s+(?:for\s+)?(.+)",
        r"(?i)(?:can you|do you)\s+(?:show me|find|search for|have)\s+(.+)",
        r"(?i)(?:what|which|where).*?\s+(?:do you have|can i find|are available)\s+(.+)",
        r"(?i)(?:i need|i want|i'm looking for)\s+(.+)",
        r"(?i)(?:what|which)\s+(.+?)(?:\?|$)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid search lead-in regex"))
    .collect()
});

static SEARCH_TRAILING_NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\s+(?:do you have|are there|can you find|do you carry|do you sell).*$",
        r"(?i)\s+(?:clothes|clothing|wear|apparel|items|products)$",
        r"(?i)\s+(?:in stock|available|in store|online|on sale)$",
        r"(?i)\s+for\s+(?:me|women|men|kids|children)$",
        r"(?i)\s+(?:please|thanks|thank you|pls|plz)$",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid trailing noise regex"))
    .collect()
});

static LEADING_ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:a|some|any|the)\s+").expect("valid leading article regex")
});

static LEADING_FOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^for\s+").expect("valid leading for regex"));

const CUSTOMER_ORDER_PHRASES: [&str; 3] = ["recent orders", "my orders", "order history"];
const SEARCH_TRIGGER_PHRASES: [&str; 4] = ["search", "show me", "looking for", "find"];
const GENERIC_GARMENT_WORDS: [&str; 3] = ["wear", "clothes", "clothing"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedParameters {
    pub order_id: Option<String>,
    pub search_query: Option<String>,
    pub wants_order_history: bool,
    pub wants_product_search: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ParameterExtractor;

impl ParameterExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, intent: IntentKind, text: &str) -> ExtractedParameters {
        let normalized_text = text.to_lowercase();
        match intent {
            IntentKind::OrderStatus => ExtractedParameters {
                order_id: extract_order_id(text),
                wants_order_history: mentions_any(&normalized_text, &CUSTOMER_ORDER_PHRASES),
                ..ExtractedParameters::default()
            },
            IntentKind::ProductSearch => ExtractedParameters {
                search_query: extract_search_query(text),
                wants_product_search: mentions_any(&normalized_text, &SEARCH_TRIGGER_PHRASES),
                ..ExtractedParameters::default()
            },
            _ => ExtractedParameters::default(),
        }
    }
}

/// First `ord_...` identifier found by the ordered pattern list.
pub fn extract_order_id(text: &str) -> Option<String> {
    ORDER_ID_PATTERNS.iter().find_map(|pattern| {
        pattern.captures(text).and_then(|captures| {
            captures.get(1).map(|found| found.as_str().trim().to_string())
        })
    })
}

/// Product phrase with conversational lead-ins and trailing noise removed.
pub fn extract_search_query(text: &str) -> Option<String> {
    let extracted = SEARCH_LEAD_INS
        .iter()
        .find_map(|pattern| {
            pattern.captures(text).and_then(|captures| captures.get(1)).map(|found| found.as_str())
        })
        .unwrap_or(text);

    let without_question_marks = extracted.replace('?', "");
    let mut cleaned = LEADING_ARTICLE.replace(&without_question_marks, "").trim().to_string();
    for pattern in SEARCH_TRAILING_NOISE.iter() {
        cleaned = pattern.replace(&cleaned, "").into_owned();
    }

    let words = cleaned.split_whitespace().collect::<Vec<_>>();
    if words.len() == 1 && GENERIC_GARMENT_WORDS.contains(&words[0].to_lowercase().as_str()) {
        cleaned = without_question_marks.trim().to_string();
    }

    let cleaned = LEADING_FOR.replace(&cleaned, "").trim().to_string();
    let length = cleaned.chars().count();
    (MIN_SEARCH_QUERY_CHARS..MAX_SEARCH_QUERY_CHARS).contains(&length).then_some(cleaned)
}

fn mentions_any(normalized_text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| normalized_text.contains(phrase))
}
