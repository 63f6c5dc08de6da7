//! Assistant identity and per-intent behavior used for prompt assembly.
//!
//! The profile is read once at startup from a TOML document. Every field is
//! resolved independently: a missing, mistyped, or unparseable value falls
//! back to the built-in default for that field only, so a broken profile can
//! never prevent the assistant from starting.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use toml::{Table, Value};
use tracing::{info, warn};

use crate::domain::intent::IntentKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub role: String,
    pub personality: String,
    pub tone: String,
    pub style: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentBehavior {
    pub behavior: String,
    pub grounding_required: bool,
    pub response_format: Option<String>,
    pub example: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantProfile {
    pub identity: Identity,
    pub intents: BTreeMap<IntentKind, IntentBehavior>,
    pub rules: Vec<String>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "Lin".to_string(),
            role: "Customer Support Specialist".to_string(),
            personality: "friendly, professional, empathetic".to_string(),
            tone: "friendly, professional, empathetic".to_string(),
            style: "concise and direct".to_string(),
        }
    }
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self { identity: Identity::default(), intents: default_intents(), rules: default_rules() }
    }
}

impl AssistantProfile {
    /// Behavior for `intent`, falling back to a generic instruction.
    pub fn behavior_for(&self, intent: IntentKind) -> IntentBehavior {
        self.intents.get(&intent).cloned().unwrap_or_else(|| IntentBehavior {
            behavior: "Help the user appropriately".to_string(),
            grounding_required: false,
            response_format: None,
            example: None,
        })
    }

    pub fn load_or_default(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "assistant.profile.unavailable",
                    path = %path.display(),
                    error = %error,
                    "assistant profile not found, using defaults"
                );
                return Self::default();
            }
        };

        match raw.parse::<Table>() {
            Ok(table) => {
                let profile = Self::from_table(&table);
                info!(
                    event_name = "assistant.profile.loaded",
                    path = %path.display(),
                    identity = %profile.identity.name,
                    rule_count = profile.rules.len(),
                    "assistant profile loaded"
                );
                profile
            }
            Err(error) => {
                warn!(
                    event_name = "assistant.profile.malformed",
                    path = %path.display(),
                    error = %error,
                    "assistant profile could not be parsed, using defaults"
                );
                Self::default()
            }
        }
    }

    pub fn from_table(table: &Table) -> Self {
        let mut profile = Self::default();

        if let Some(identity) = table.get("identity").and_then(Value::as_table) {
            let target = &mut profile.identity;
            for (key, slot) in [
                ("name", &mut target.name),
                ("role", &mut target.role),
                ("personality", &mut target.personality),
                ("tone", &mut target.tone),
                ("style", &mut target.style),
            ] {
                if let Some(value) = non_blank_str(identity, key) {
                    *slot = value;
                }
            }
        }

        if let Some(intents) = table.get("intents").and_then(Value::as_table) {
            for (label, value) in intents {
                let Ok(intent) = label.parse::<IntentKind>() else {
                    warn!(
                        event_name = "assistant.profile.unknown_intent",
                        intent = %label,
                        "ignoring behavior for unknown intent"
                    );
                    continue;
                };
                let Some(fields) = value.as_table() else {
                    continue;
                };
                let entry = profile.intents.entry(intent).or_insert_with(|| IntentBehavior {
                    behavior: "Help the user appropriately".to_string(),
                    grounding_required: false,
                    response_format: None,
                    example: None,
                });
                if let Some(behavior) = non_blank_str(fields, "behavior") {
                    entry.behavior = behavior;
                }
                if let Some(grounding) = fields.get("grounding_required").and_then(Value::as_bool)
                {
                    entry.grounding_required = grounding;
                }
                if let Some(format) = non_blank_str(fields, "response_format") {
                    entry.response_format = Some(format);
                }
                if let Some(example) = non_blank_str(fields, "example") {
                    entry.example = Some(example);
                }
            }
        }

        let rules = table.get("rules").or_else(|| table.get("general_guidelines"));
        if let Some(rules) = rules.and_then(Value::as_array) {
            let parsed = rules
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|rule| !rule.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            if !parsed.is_empty() {
                profile.rules = parsed;
            }
        }

        profile
    }
}

fn non_blank_str(table: &Table, key: &str) -> Option<String> {
    table
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn default_intents() -> BTreeMap<IntentKind, IntentBehavior> {
    [
        (IntentKind::PolicyQuestion, "Provide accurate policy information with proper citations", true),
        (IntentKind::OrderStatus, "Use function calling to get real order data", true),
        (IntentKind::ProductSearch, "Use function calling to search products", true),
        (IntentKind::Complaint, "Show genuine empathy and provide solutions", false),
        (IntentKind::Chitchat, "Be friendly but steer back to business", false),
        (IntentKind::OffTopic, "Politely redirect to relevant topics", false),
        (IntentKind::Violation, "Maintain professionalism and boundaries", false),
    ]
    .into_iter()
    .map(|(intent, behavior, grounding_required)| {
        (
            intent,
            IntentBehavior {
                behavior: behavior.to_string(),
                grounding_required,
                response_format: None,
                example: None,
            },
        )
    })
    .collect()
}

fn default_rules() -> Vec<String> {
    [
        "Never reveal you are an AI or mention the model you run on",
        "Always maintain your identity as a human support specialist",
        "Use polite and professional language",
        "Provide citations from policies when relevant using [PolicyID]",
        "Keep responses concise and to the point",
        "Do not hallucinate information",
        "ONLY use citations that exactly match provided policy IDs",
        "NEVER invent or make up policy IDs",
        "Provide ONLY the direct answer to the user's question",
        "Do NOT continue with fake conversations or follow-up questions",
        "Stop immediately after answering the question",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
