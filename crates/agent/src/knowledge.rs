//! Scores knowledge base entries against a customer message and returns
//! the single best grounding entry.

use std::collections::BTreeSet;

use shopdesk_core::domain::knowledge::KnowledgeBaseEntry;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Semantic,
    Keyword,
    Similar,
    Exact,
}

impl MatchTier {
    pub fn score(&self) -> u8 {
        match self {
            Self::Exact => 100,
            Self::Similar => 80,
            Self::Keyword => 70,
            Self::Semantic => 60,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolicyMatch<'a> {
    pub entry: &'a KnowledgeBaseEntry,
    pub tier: MatchTier,
}

impl PolicyMatch<'_> {
    pub fn score(&self) -> u8 {
        self.tier.score()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryVocabulary {
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub semantic: &'static [&'static str],
}

pub const IMPORTANT_WORDS: [&str; 19] = [
    "how", "what", "when", "where", "can", "do", "does", "return", "refund", "exchange", "ship",
    "shipping", "delivery", "pay", "payment", "discount", "price", "cost", "warranty",
];

pub const SIMILAR_OVERLAP_THRESHOLD: usize = 2;

pub fn default_vocabularies() -> Vec<CategoryVocabulary> {
    vec![
        CategoryVocabulary {
            category: "returns",
            keywords: &["return", "refund", "exchange", "send back"],
            semantic: &["refund", "exchange", "send back", "return item", "send it back", "take back"],
        },
        CategoryVocabulary {
            category: "shipping",
            keywords: &["shipping", "delivery", "track", "ship"],
            semantic: &["delivery", "track", "arrive", "when will", "shipping time", "delivery date"],
        },
        CategoryVocabulary {
            category: "payment",
            keywords: &["payment", "credit", "pay", "billing", "card"],
            semantic: &["pay", "credit card", "debit", "billing", "payment method", "how to pay"],
        },
        CategoryVocabulary {
            category: "discounts",
            keywords: &["discount", "promo", "coupon", "sale", "offer"],
            semantic: &["coupon", "promo code", "sale", "reduction", "cheaper", "lower price"],
        },
        CategoryVocabulary {
            category: "privacy",
            keywords: &["privacy", "data", "personal"],
            semantic: &["data", "information", "personal data", "privacy policy"],
        },
        CategoryVocabulary {
            category: "security",
            keywords: &["security", "secure", "protection"],
            semantic: &["secure", "safe", "protection", "hack", "breach"],
        },
        CategoryVocabulary {
            category: "support",
            keywords: &["support", "contact", "help", "customer service"],
            semantic: &[],
        },
    ]
}

#[derive(Clone, Debug)]
pub struct KnowledgeMatcher {
    vocabularies: Vec<CategoryVocabulary>,
}

impl Default for KnowledgeMatcher {
    fn default() -> Self {
        Self::new(default_vocabularies())
    }
}

impl KnowledgeMatcher {
    pub fn new(vocabularies: Vec<CategoryVocabulary>) -> Self {
        Self { vocabularies }
    }

    /// Strongest tier `entry` reaches for `query`, if any.
    pub fn score(&self, query: &str, entry: &KnowledgeBaseEntry) -> Option<MatchTier> {
        let query = normalize(query);
        if query.is_empty() {
            return None;
        }
        self.score_normalized(&query, entry)
    }

    /// Highest-scoring entry; on equal scores the entry seen first wins.
    pub fn find_best_match<'a>(
        &self,
        query: &str,
        entries: &'a [KnowledgeBaseEntry],
    ) -> Option<PolicyMatch<'a>> {
        let query = normalize(query);
        if query.is_empty() {
            return None;
        }

        let mut best: Option<PolicyMatch<'a>> = None;
        for entry in entries {
            let Some(tier) = self.score_normalized(&query, entry) else {
                continue;
            };
            if best.map_or(true, |current| tier > current.tier) {
                best = Some(PolicyMatch { entry, tier });
            }
        }

        if let Some(found) = best {
            debug!(
                event_name = "assistant.knowledge_base.matched",
                policy_id = %found.entry.id.0,
                score = found.score(),
                "grounding entry selected"
            );
        }
        best
    }

    fn score_normalized(&self, query: &str, entry: &KnowledgeBaseEntry) -> Option<MatchTier> {
        let question = normalize(&entry.question);
        if !question.is_empty() && (question.contains(query) || query.contains(&question)) {
            return Some(MatchTier::Exact);
        }
        if important_overlap(query, &question) >= SIMILAR_OVERLAP_THRESHOLD {
            return Some(MatchTier::Similar);
        }

        let vocabulary = self.vocabulary_for(&entry.category);
        let entry_keywords = entry.keywords.iter().map(|keyword| keyword.to_lowercase());
        let category_keywords = vocabulary
            .map(|vocabulary| vocabulary.keywords)
            .unwrap_or_default()
            .iter()
            .map(|keyword| keyword.to_string());
        if category_keywords
            .chain(entry_keywords)
            .any(|keyword| !keyword.is_empty() && query.contains(&keyword))
        {
            return Some(MatchTier::Keyword);
        }

        vocabulary
            .filter(|vocabulary| vocabulary.semantic.iter().any(|phrase| query.contains(phrase)))
            .map(|_| MatchTier::Semantic)
    }

    fn vocabulary_for(&self, category: &str) -> Option<&CategoryVocabulary> {
        self.vocabularies
            .iter()
            .find(|vocabulary| vocabulary.category.eq_ignore_ascii_case(category.trim()))
    }
}

/// Lowercases and collapses punctuation so "policy?" and "policy" compare equal.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|character| *character != '\'')
        .map(|character| if character.is_alphanumeric() { character } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn important_overlap(query: &str, question: &str) -> usize {
    let question_words = question.split(' ').collect::<BTreeSet<_>>();
    query
        .split(' ')
        .filter(|word| IMPORTANT_WORDS.contains(word) && question_words.contains(word))
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use shopdesk_core::domain::knowledge::{KnowledgeBaseEntry, PolicyId};

    use super::{KnowledgeMatcher, MatchTier};

    fn entry(id: &str, category: &str, question: &str) -> KnowledgeBaseEntry {
        KnowledgeBaseEntry {
            id: PolicyId(id.to_string()),
            category: category.to_string(),
            question: question.to_string(),
            answer: format!("answer for {id}"),
            keywords: Vec::new(),
        }
    }

    fn fixture() -> Vec<KnowledgeBaseEntry> {
        vec![
            entry("Policy1.1", "returns", "What is your return policy?"),
            entry("Policy2.1", "shipping", "How long does shipping take?"),
            entry("Policy3.1", "payment", "What payment methods do you accept?"),
            entry("Policy5.1", "privacy", "How do you protect my privacy?"),
        ]
    }

    #[test]
    fn exact_question_match_scores_highest() {
        let entries = fixture();
        let found = KnowledgeMatcher::default()
            .find_best_match("What is your return policy?", &entries)
            .expect("match");
        assert_eq!(found.entry.id.0, "Policy1.1");
        assert_eq!(found.tier, MatchTier::Exact);
        assert_eq!(found.score(), 100);
    }

    #[test]
    fn shared_important_words_score_as_similar() {
        let matcher = KnowledgeMatcher::default();
        let shipping = entry("Policy2.1", "shipping", "How long does shipping take?");
        assert_eq!(
            matcher.score("how much does shipping cost abroad", &shipping),
            Some(MatchTier::Similar)
        );
    }

    #[test]
    fn category_keywords_and_semantic_phrases_are_weaker_tiers() {
        let matcher = KnowledgeMatcher::default();
        let returns = entry("Policy1.1", "returns", "What is your return policy?");
        let shipping = entry("Policy2.1", "shipping", "How long does shipping take?");

        assert_eq!(matcher.score("can I get a refund", &returns), Some(MatchTier::Keyword));
        assert_eq!(matcher.score("when will it arrive", &shipping), Some(MatchTier::Semantic));
        assert_eq!(matcher.score("favorite color", &returns), None);
    }

    #[test]
    fn entry_keywords_extend_category_vocabulary() {
        let mut loyalty = entry("Policy7.1", "loyalty", "Do you run a rewards program?");
        loyalty.keywords = vec!["Points".to_string()];

        let matcher = KnowledgeMatcher::default();
        assert_eq!(matcher.score("how many points do I have", &loyalty), Some(MatchTier::Keyword));
    }

    #[test]
    fn higher_score_wins_and_ties_keep_first_seen() {
        let entries = vec![
            entry("PolicyA", "returns", "Can I exchange sale items?"),
            entry("PolicyB", "returns", "Are refunds issued to the original card?"),
            entry("PolicyC", "returns", "What is your return policy?"),
        ];
        let matcher = KnowledgeMatcher::default();

        let tie = matcher.find_best_match("I want my money, refund please", &entries).expect("match");
        assert_eq!(tie.entry.id.0, "PolicyA");
        assert_eq!(tie.tier, MatchTier::Keyword);

        let exact = matcher.find_best_match("what is your return policy", &entries).expect("match");
        assert_eq!(exact.entry.id.0, "PolicyC");
    }

    #[test]
    fn empty_query_or_catalog_has_no_match() {
        let matcher = KnowledgeMatcher::default();
        assert!(matcher.find_best_match("   ?  ", &fixture()).is_none());
        assert!(matcher.find_best_match("return policy", &[]).is_none());
    }

    #[test]
    fn best_score_never_decreases_when_entries_are_added() {
        let matcher = KnowledgeMatcher::default();
        let mut entries = vec![entry("Policy2.1", "shipping", "How long does shipping take?")];
        let query = "what is your return policy?";
        let before = matcher.find_best_match(query, &entries).map(|found| found.score());

        entries.push(entry("Policy1.1", "returns", "What is your return policy?"));
        let after = matcher.find_best_match(query, &entries).map(|found| found.score());

        assert!(after >= before);
        assert_eq!(after, Some(100));
    }
}
