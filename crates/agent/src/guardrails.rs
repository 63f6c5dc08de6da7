//! Output guardrails: scrubbing of generated text and citation checks.
//!
//! Generated text is untrusted. [`ResponseSanitizer`] removes prompt echoes,
//! invented dialogue, sign-offs and markup by applying an ordered rule list
//! until the text stops changing. Citation helpers then drop any `[token]`
//! that does not name a knowledge base entry.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use shopdesk_core::domain::knowledge::KnowledgeBase;
use tracing::{debug, warn};

pub const MAX_SANITIZE_PASSES: usize = 5;
pub const MIN_RESPONSE_CHARS: usize = 10;

static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").expect("valid citation regex"));

static CITATION_DEBRIS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)PolicyID:\s*\d+", r"(?i)\bSection\s+\d+(?:\.\d+)*", r"Policy\d+\.\d+:\s*"]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("valid citation debris regex"))
        .collect()
});

static SPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid whitespace regex"));

static SPACE_BEFORE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([.,!?;])").expect("valid punctuation regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StripScope {
    First,
    All,
}

#[derive(Clone, Debug)]
pub struct StripRule {
    pub name: &'static str,
    pattern: Regex,
    replacement: &'static str,
    scope: StripScope,
}

impl StripRule {
    pub fn new(
        name: &'static str,
        pattern: &str,
        replacement: &'static str,
        scope: StripScope,
    ) -> Result<Self, regex::Error> {
        Ok(Self { name, pattern: Regex::new(pattern)?, replacement, scope })
    }

    pub fn apply(&self, text: &str) -> String {
        match self.scope {
            StripScope::First => self.pattern.replace(text, self.replacement).into_owned(),
            StripScope::All => self.pattern.replace_all(text, self.replacement).into_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResponseSanitizer {
    rules: Vec<StripRule>,
}

impl ResponseSanitizer {
    /// Default rule set; role-label rules are keyed on the assistant's name.
    pub fn for_identity(name: &str) -> Self {
        let rules = default_rule_table(&regex::escape(name))
            .into_iter()
            .filter_map(|(rule_name, pattern, replacement, scope)| {
                StripRule::new(rule_name, &pattern, replacement, scope)
                    .map_err(|error| {
                        warn!(
                            event_name = "assistant.sanitizer.rule_invalid",
                            rule = rule_name,
                            error = %error,
                            "skipping sanitizer rule that failed to compile"
                        );
                    })
                    .ok()
            })
            .collect();
        Self { rules }
    }

    pub fn with_rules(rules: Vec<StripRule>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name).collect()
    }

    /// Cleans `raw`, returning `fallback` when too little survives.
    ///
    /// `fallback` should itself be clean so that sanitizing the result a
    /// second time leaves it unchanged.
    pub fn sanitize(&self, raw: &str, fallback: &str) -> String {
        let mut text = raw.trim().to_string();

        for pass in 0..MAX_SANITIZE_PASSES {
            let before = text.clone();
            for rule in &self.rules {
                text = rule.apply(&text);
            }
            text = text.trim().to_string();
            if text == before {
                debug!(event_name = "assistant.sanitizer.converged", passes = pass + 1, "sanitized");
                break;
            }
        }

        if text.chars().count() < MIN_RESPONSE_CHARS {
            debug!(
                event_name = "assistant.sanitizer.fallback",
                remaining_chars = text.chars().count(),
                "sanitized response too short, using fallback"
            );
            return fallback.to_string();
        }
        text
    }
}

type RuleRow = (&'static str, String, &'static str, StripScope);

fn default_rule_table(name: &str) -> Vec<RuleRow> {
    use StripScope::{All, First};

    let mut table: Vec<RuleRow> = vec![
        (
            "leading_label",
            format!(r"(?i)^(?:\s*(?:response|answer|direct[ _]answer|{name})\s*:\s*)+"),
            "",
            First,
        ),
        (
            "preamble",
            format!(
                r"(?i)^(?:\s*(?:I apologize if there was confusion in my previous response\.|The exact return policy should be:|Let me provide the exact policy:|According to our polic(?:y|ies):|Here(?:'s| is) the exact policy:|(?:response|answer|direct[ _]answer|{name})\s*:)\s*)+"
            ),
            "",
            First,
        ),
        (
            "prompt_echo",
            r"(?i)(?:RETURN POLICIES|FUNCTION RESULTS|RETURN_POLICY(?:_ID)?|PRODUCT_SEARCH|PRODUCT SEARCH|QUESTION|CRITICAL|ABSOLUTE RULES|CURRENT INTENT|INTENT BEHAVIOR|RESPONSE FORMAT)\s*:[\s\S]*$".to_string(),
            "",
            First,
        ),
        (
            "raw_payload",
            r#"(?i)(?:searchProducts:|"searchQuery"|"results"|imageUrl)[\s\S]*$"#.to_string(),
            "",
            First,
        ),
        (
            "role_lines",
            format!(r"(?im)^[ \t]*(?:user|customer|{name}|me \({name}\))[ \t]*:.*$"),
            "",
            All,
        ),
        ("inline_dialogue", r"(?im)\b(?:user|customer)[ \t]*:.*$".to_string(), "", All),
    ];

    table.extend(
        [
            ("note", r"(?i)(?:\bplease note\b|(?:\*\*)?\bnote\s*:)[\s\S]*$"),
            (
                "follow_up_offer",
                r"(?i)(?:please let (?:me|us) know|please provide more|please check your tracking|check your tracking number|if there is anything else|anything else i can assist|is there anything else|would you like|do you need|if you have|if you're interested in more details|should you need assistance|free to reach out|i can assist you with|do any of these items look interesting to you)[\s\S]*$",
            ),
            ("sign_off", r"(?i)(?:thank you!|thank you for choosing our store|have a great day!)[\s\S]*$"),
            ("hedge", r"(?i)\b(?:however|additionally),[\s\S]*$"),
            (
                "meta_commentary",
                r"(?i)(?:\bthe user\b|this response provides|\byour query\b|related resources:|click here!|click the link below|let me clarify:|due to system limitations|i'm sorry, but there seems|based on actual shipping times)[\s\S]*$",
            ),
            (
                "end_marker",
                r"(?i)(?:\*\*end of response\*\*|\[?end[ _]of[ _](?:text|response|message)\]?)[\s\S]*$",
            ),
            ("divider", r"(?:---|===|\*\*\*|\* \* \*)[\s\S]*$"),
            ("blank_run", r"\n\s*\n\s*\n[\s\S]*$"),
        ]
        .into_iter()
        .map(|(rule_name, pattern)| (rule_name, pattern.to_string(), "", First)),
    );

    table.push((
        "self_introduction",
        format!(r"(?i)\bI am {name}\b[\s\S]*$"),
        "",
        First,
    ));
    table.push((
        "order_summary_tail",
        r"(?i)(use specific order ids for detailed status\.)[\s\S]+$".to_string(),
        "$1",
        First,
    ));

    table.extend(
        [
            ("processed_notice", r"(?i)your request has been processed successfully\.?\s*"),
            ("timestamp", r"(?im)\d{1,2}:\d{2} ?(?:AM|PM)\n?"),
            ("angle_link", r"<https?://[^>]+>"),
            ("hashtag", r"#\w+"),
            (
                "emoji",
                "[\u{2728}\u{1F6CD}\u{1F4E6}\u{1F457}\u{1F4BC}\u{1F469}\u{1F468}\u{1F50D}\u{1F4A1}\u{1F31F}\u{1F4DE}\u{1F3F7}\u{1F455}\u{1F456}\u{1F454}\u{1F69A}\u{FE0F}\u{200D}]",
            ),
            ("bold_markup", r"\*\*"),
            ("space_run", r"[ \t]{2,}"),
        ]
        .into_iter()
        .map(|(rule_name, pattern)| {
            let replacement = if rule_name == "space_run" { " " } else { "" };
            (rule_name, pattern.to_string(), replacement, All)
        }),
    );

    table
}

/// Drops `[token]`s that are not knowledge base ids and tidies what remains.
pub fn normalize_citations(text: &str, knowledge: &KnowledgeBase) -> String {
    let mut kept = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut previous_citation: Option<(String, usize)> = None;

    for captures in CITATION.captures_iter(text) {
        let (Some(token), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let between = &text[cursor..token.start()];
        cursor = token.end();

        let id = inner.as_str().trim();
        if !knowledge.contains_id(id) {
            kept.push_str(between);
            continue;
        }

        let repeats_previous = previous_citation
            .as_ref()
            .is_some_and(|(previous, end)| previous == id && *end == kept.len())
            && between.trim().is_empty();
        if repeats_previous {
            continue;
        }

        kept.push_str(between);
        kept.push('[');
        kept.push_str(id);
        kept.push(']');
        previous_citation = Some((id.to_string(), kept.len()));
    }
    kept.push_str(&text[cursor..]);

    let mut cleaned = kept;
    for pattern in CITATION_DEBRIS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = SPACE_RUNS.replace_all(&cleaned, " ");
    let cleaned = SPACE_BEFORE_PUNCTUATION.replace_all(&cleaned, "$1");
    cleaned.trim().to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationReport {
    pub is_valid: bool,
    pub valid_citations: Vec<String>,
    pub invalid_citations: Vec<String>,
    pub total_citations: usize,
}

pub fn validate_citations(text: &str, knowledge: &KnowledgeBase) -> CitationReport {
    let (valid_citations, invalid_citations): (Vec<String>, Vec<String>) = CITATION
        .captures_iter(text)
        .filter_map(|captures| captures.get(1).map(|inner| inner.as_str().to_string()))
        .partition(|citation| knowledge.contains_id(citation));

    CitationReport {
        is_valid: invalid_citations.is_empty(),
        total_citations: valid_citations.len() + invalid_citations.len(),
        valid_citations,
        invalid_citations,
    }
}
