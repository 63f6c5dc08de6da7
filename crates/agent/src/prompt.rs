//! Prompt assembly for the generation service.
//!
//! For every generation-backed intent the prompt pins down the exact text
//! the model must return. [`PromptBuilder::mandated_reply`] exposes that
//! same text so the runtime can answer without the model when it fails.

use std::fmt::Write as _;

use shopdesk_core::domain::commerce::{CustomerOrders, OrderSummary, ProductSearchResult};
use shopdesk_core::domain::intent::IntentKind;
use shopdesk_core::domain::knowledge::KnowledgeBaseEntry;
use shopdesk_core::domain::profile::AssistantProfile;
use shopdesk_core::errors::ApplicationError;

use crate::templates::{NO_PRODUCTS_FOUND, ORDER_FALLBACK, POLICY_FALLBACK};
use crate::tools::{FunctionCallResult, GET_CUSTOMER_ORDERS, GET_ORDER_STATUS, SEARCH_PRODUCTS};

#[derive(Clone, Copy, Debug)]
pub struct PromptContext<'a> {
    pub text: &'a str,
    pub intent: IntentKind,
    pub grounding: Option<&'a KnowledgeBaseEntry>,
    pub results: &'a [FunctionCallResult],
}

impl<'a> PromptContext<'a> {
    fn successful(&self, function_name: &str) -> Option<&'a FunctionCallResult> {
        self.results.iter().find(|result| result.success && result.function_name == function_name)
    }

    fn decoded<T>(&self, function_name: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.successful(function_name)
            .and_then(|result| result.data.clone())
            .and_then(|data| serde_json::from_value(data).ok())
    }
}

#[derive(Clone, Debug)]
pub struct PromptBuilder {
    profile: AssistantProfile,
}

impl PromptBuilder {
    pub fn new(profile: AssistantProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &AssistantProfile {
        &self.profile
    }

    /// The exact reply the prompt instructs the model to give, if it pins one down.
    pub fn mandated_reply(&self, context: &PromptContext<'_>) -> Option<String> {
        match context.intent {
            IntentKind::PolicyQuestion => Some(
                context
                    .grounding
                    .map(KnowledgeBaseEntry::cited_answer)
                    .unwrap_or_else(|| POLICY_FALLBACK.to_string()),
            ),
            IntentKind::OrderStatus => {
                let history = context
                    .decoded::<CustomerOrders>(GET_CUSTOMER_ORDERS)
                    .filter(|history| !history.orders.is_empty());
                if let Some(history) = history {
                    return Some(history.summary_sentence());
                }
                context
                    .decoded::<OrderSummary>(GET_ORDER_STATUS)
                    .map(|order| order.status_sentence())
            }
            IntentKind::ProductSearch => {
                context.decoded::<ProductSearchResult>(SEARCH_PRODUCTS).map(|search| {
                    if search.results.is_empty() {
                        return NO_PRODUCTS_FOUND.to_string();
                    }
                    let lines = search.results.iter().map(|product| product.list_line());
                    format!(
                        "I found {} product(s):\n\n{}",
                        search.results.len(),
                        lines.collect::<Vec<_>>().join("\n")
                    )
                })
            }
            _ => None,
        }
    }

    /// Fails when the grounding entry cannot be quoted verbatim.
    pub fn build(&self, context: &PromptContext<'_>) -> Result<String, ApplicationError> {
        if let Some(entry) = context.grounding {
            entry.validate()?;
        }
        let identity = &self.profile.identity;
        let behavior = self.profile.behavior_for(context.intent);
        let mut prompt = String::new();

        push(
            &mut prompt,
            format_args!(
                "You are {}, a {}.\nPersonality: {}\nTone: {}\nStyle: {}\n\nABSOLUTE RULES:\n",
                identity.name, identity.role, identity.personality, identity.tone, identity.style
            ),
        )?;
        for rule in &self.profile.rules {
            push(&mut prompt, format_args!("• {rule}\n"))?;
        }
        push(
            &mut prompt,
            format_args!(
                "\nCURRENT INTENT: {}\nINTENT BEHAVIOR: {}\n\n",
                context.intent, behavior.behavior
            ),
        )?;

        if let Some(response_format) = &behavior.response_format {
            push(
                &mut prompt,
                format_args!("RESPONSE FORMAT (MUST FOLLOW EXACTLY):\n{response_format}\n\n"),
            )?;
        }

        self.push_intent_section(&mut prompt, context)?;

        let successful = context.results.iter().filter(|result| result.success).collect::<Vec<_>>();
        if !successful.is_empty() {
            prompt.push_str("FUNCTION RESULTS (USE THIS DATA):\n");
            for result in successful {
                let data = serde_json::to_string_pretty(&result.data).map_err(|error| {
                    ApplicationError::Processing(format!(
                        "could not serialize `{}` result for the prompt: {error}",
                        result.function_name
                    ))
                })?;
                push(&mut prompt, format_args!("{data}\n"))?;
            }
            prompt.push('\n');
        }

        if let Some(example) = &behavior.example {
            push(&mut prompt, format_args!("EXAMPLE:\n{example}\n\n"))?;
        }

        push(&mut prompt, format_args!("USER: \"{}\"\n{}:", context.text, identity.name))?;
        Ok(prompt)
    }

    fn push_intent_section(
        &self,
        prompt: &mut String,
        context: &PromptContext<'_>,
    ) -> Result<(), ApplicationError> {
        let mandated = self.mandated_reply(context);
        match (context.intent, mandated) {
            (IntentKind::PolicyQuestion, Some(answer)) if context.grounding.is_some() => push(
                prompt,
                format_args!(
                    "CRITICAL: YOU MUST USE THIS EXACT ANSWER\n\nEXACT ANSWER TO COPY:\n\"{answer}\"\n\n\
                     RULES:\n\
                     1. Copy the exact text above including the [PolicyID]\n\
                     2. Do not add any other text, questions, or explanations\n\
                     3. Do not continue the conversation\n\
                     4. Do not make up any information\n\
                     5. Stop after providing the answer\n\n"
                ),
            ),
            (IntentKind::PolicyQuestion, _) => push(
                prompt,
                format_args!(
                    "CRITICAL: NO POLICY INFORMATION AVAILABLE\nRespond with exactly:\n\"{POLICY_FALLBACK}\"\n\n"
                ),
            ),
            (IntentKind::OrderStatus | IntentKind::ProductSearch, Some(reply)) => push(
                prompt,
                format_args!(
                    "CRITICAL: RESPOND WITH EXACTLY THIS TEXT, NO ADDITIONAL CONTENT:\n\"{reply}\"\n\n\
                     DO NOT:\n\
                     - Add any text before or after\n\
                     - Format as JSON or tables\n\
                     - Ask questions\n\
                     - Continue the conversation\n\n"
                ),
            ),
            (IntentKind::OrderStatus, None) => push(
                prompt,
                format_args!("No order data is available. Respond with exactly:\n\"{ORDER_FALLBACK}\"\n\n"),
            ),
            (IntentKind::ProductSearch, None) => {
                prompt.push_str(
                    "No product data is available. Ask which items the customer is looking for.\n\n",
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn push(prompt: &mut String, arguments: std::fmt::Arguments<'_>) -> Result<(), ApplicationError> {
    prompt
        .write_fmt(arguments)
        .map_err(|error| ApplicationError::Processing(format!("prompt assembly failed: {error}")))
}
