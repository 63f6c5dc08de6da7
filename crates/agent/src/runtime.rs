//! Per-message orchestration: classify, look up, ground, answer, scrub.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use shopdesk_core::domain::intent::{Classification, IntentKind};
use shopdesk_core::domain::knowledge::{KnowledgeBase, PolicyId};
use shopdesk_core::domain::profile::AssistantProfile;
use shopdesk_core::errors::ApplicationError;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conversation::{ExtractedParameters, ParameterExtractor};
use crate::guardrails::{normalize_citations, validate_citations, CitationReport, ResponseSanitizer};
use crate::intent::IntentClassifier;
use crate::knowledge::KnowledgeMatcher;
use crate::llm::{GenerationOptions, GenerationRequest, LlmClient};
use crate::memory::{ConversationMemory, ConversationTurn};
use crate::prompt::{PromptBuilder, PromptContext};
use crate::stats::{RuntimeStats, StatsSnapshot};
use crate::templates::CannedReplies;
use crate::tools::{
    CallBudget, FunctionCallResult, FunctionRegistry, DEFAULT_SEARCH_LIMIT, GET_CUSTOMER_ORDERS,
    GET_ORDER_STATUS, SEARCH_PRODUCTS,
};

/// Who is asking. Both ids are optional; anonymous users get no memory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageContext {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMetadata {
    pub processing_time_ms: u64,
    pub user_identified: bool,
    pub used_generation: bool,
    pub confidence: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub intent: IntentKind,
    pub response: String,
    pub citations: CitationReport,
    pub relevant_policies: Vec<PolicyId>,
    /// Names of the lookups that succeeded; failure details stay internal.
    pub functions_called: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub metadata: ReplyMetadata,
}

pub struct AgentRuntime {
    classifier: IntentClassifier,
    extractor: ParameterExtractor,
    matcher: KnowledgeMatcher,
    knowledge: KnowledgeBase,
    registry: FunctionRegistry,
    prompts: PromptBuilder,
    replies: CannedReplies,
    sanitizer: ResponseSanitizer,
    llm: Arc<dyn LlmClient>,
    options: GenerationOptions,
    memory: ConversationMemory,
    stats: Mutex<RuntimeStats>,
}

impl AgentRuntime {
    pub fn new(
        knowledge: KnowledgeBase,
        profile: AssistantProfile,
        registry: FunctionRegistry,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let name = profile.identity.name.clone();
        Self {
            classifier: IntentClassifier::new(),
            extractor: ParameterExtractor::new(),
            matcher: KnowledgeMatcher::default(),
            knowledge,
            registry,
            prompts: PromptBuilder::new(profile),
            replies: CannedReplies::new(name.clone()),
            sanitizer: ResponseSanitizer::for_identity(&name),
            llm,
            options: GenerationOptions::default(),
            memory: ConversationMemory::default(),
            stats: Mutex::new(RuntimeStats::default()),
        }
    }

    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: ResponseSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn profile(&self) -> &AssistantProfile {
        self.prompts.profile()
    }

    pub async fn conversation(&self, user_id: &str) -> Vec<ConversationTurn> {
        self.memory.history(user_id).await
    }

    pub async fn stats_snapshot(&self) -> StatsSnapshot {
        let memory_size = self.memory.user_count().await;
        self.stats.lock().await.snapshot(memory_size)
    }

    /// Answers one message. Never fails: unexpected errors become a generic
    /// apology under the `error` intent.
    pub async fn process_message(&self, text: &str, context: &MessageContext) -> AssistantReply {
        let started = Instant::now();
        let correlation_id = Uuid::new_v4().to_string();

        match self.respond(text, context, &correlation_id, started).await {
            Ok(reply) => reply,
            Err(failure) => {
                error!(
                    event_name = "assistant.message.failed",
                    correlation_id = %correlation_id,
                    error = %failure,
                    "message processing failed"
                );
                self.stats.lock().await.record_error();
                let interface = failure.into_interface(correlation_id.clone());
                AssistantReply {
                    intent: IntentKind::Error,
                    response: interface.user_message().to_string(),
                    citations: CitationReport { is_valid: true, ..CitationReport::default() },
                    relevant_policies: Vec::new(),
                    functions_called: Vec::new(),
                    timestamp: Utc::now(),
                    correlation_id,
                    metadata: ReplyMetadata {
                        processing_time_ms: elapsed_ms(started),
                        user_identified: context.user_id.is_some(),
                        used_generation: false,
                        confidence: 0.0,
                    },
                }
            }
        }
    }

    async fn respond(
        &self,
        text: &str,
        context: &MessageContext,
        correlation_id: &str,
        started: Instant,
    ) -> Result<AssistantReply, ApplicationError> {
        let classification = self.classifier.classify(text);
        self.stats.lock().await.record_query(classification.intent);
        info!(
            event_name = "assistant.intent.classified",
            correlation_id = %correlation_id,
            intent = %classification.intent,
            confidence = classification.confidence,
            "intent classified"
        );

        let call_results = self.run_functions(&classification, text, context, correlation_id).await;

        let grounding = self.matcher.find_best_match(text, self.knowledge.entries());
        let any_success = call_results.iter().any(|result| result.success);

        let used_generation = classification.intent.requires_generation() || any_success;
        let answer = if used_generation {
            self.stats.lock().await.record_generation();
            let prompt_context = PromptContext {
                text,
                intent: classification.intent,
                grounding: grounding.map(|found| found.entry),
                results: &call_results,
            };
            self.generate(&prompt_context, correlation_id).await?
        } else {
            self.stats.lock().await.record_direct();
            self.replies.direct(classification.intent, text)
        };

        let response = normalize_citations(&answer, &self.knowledge);
        let citations = validate_citations(&response, &self.knowledge);
        if !citations.is_valid {
            warn!(
                event_name = "assistant.citations.invalid",
                correlation_id = %correlation_id,
                invalid = ?citations.invalid_citations,
                "response still carries unknown citations"
            );
        }

        if let Some(user_id) = context.user_id.as_deref() {
            let turn = ConversationTurn {
                user: text.to_string(),
                assistant: response.clone(),
                timestamp: Utc::now(),
            };
            self.memory.record(user_id, turn).await;
        }

        let reply = AssistantReply {
            intent: classification.intent,
            response,
            citations,
            relevant_policies: grounding.map(|found| found.entry.id.clone()).into_iter().collect(),
            functions_called: call_results
                .iter()
                .filter(|result| result.success)
                .map(|result| result.function_name.clone())
                .collect(),
            timestamp: Utc::now(),
            correlation_id: correlation_id.to_string(),
            metadata: ReplyMetadata {
                processing_time_ms: elapsed_ms(started),
                user_identified: context.user_id.is_some(),
                used_generation,
                confidence: classification.confidence,
            },
        };

        info!(
            event_name = "assistant.message.processed",
            correlation_id = %correlation_id,
            intent = %reply.intent,
            used_generation = reply.metadata.used_generation,
            function_calls = call_results.len(),
            processing_time_ms = reply.metadata.processing_time_ms,
            "message processed"
        );
        Ok(reply)
    }

    async fn run_functions(
        &self,
        classification: &Classification,
        text: &str,
        context: &MessageContext,
        correlation_id: &str,
    ) -> Vec<FunctionCallResult> {
        if !classification.intent.uses_functions() {
            return Vec::new();
        }

        let parameters = self.extractor.extract(classification.intent, text);
        let planned = plan_calls(&parameters, context);
        let mut budget = CallBudget::default();
        let mut results = Vec::with_capacity(planned.len());

        for (name, arguments) in planned {
            if let Err(exhausted) = budget.try_spend() {
                debug!(
                    event_name = "assistant.function.budget_exhausted",
                    correlation_id = %correlation_id,
                    limit = exhausted.limit,
                    skipped = name,
                    "function call budget reached"
                );
                break;
            }

            let result = self.registry.execute(name, arguments).await;
            info!(
                event_name = "assistant.function.executed",
                correlation_id = %correlation_id,
                function = name,
                success = result.success,
                "function executed"
            );
            self.stats.lock().await.record_function(name, result.success);
            results.push(result);
        }
        results
    }

    async fn generate(
        &self,
        context: &PromptContext<'_>,
        correlation_id: &str,
    ) -> Result<String, ApplicationError> {
        let prompt = self.prompts.build(context)?;
        let mandated = self.prompts.mandated_reply(context);
        let fallback =
            mandated.unwrap_or_else(|| self.replies.fallback(context.intent, context.text));

        let request = GenerationRequest { prompt, options: self.options.clone() };
        match self.llm.complete(&request).await {
            Ok(generated) if !generated.trim().is_empty() => {
                Ok(self.sanitizer.sanitize(&generated, &fallback))
            }
            Ok(_) => {
                warn!(
                    event_name = "assistant.generation.empty",
                    correlation_id = %correlation_id,
                    "generation returned no text, using fallback"
                );
                self.stats.lock().await.record_fallback();
                Ok(fallback)
            }
            Err(failure) => {
                warn!(
                    event_name = "assistant.generation.failed",
                    correlation_id = %correlation_id,
                    error = %failure,
                    "generation unavailable, using fallback"
                );
                self.stats.lock().await.record_fallback();
                Ok(fallback)
            }
        }
    }
}

/// Recent orders fetched when a customer asks about their order history.
const PLANNED_ORDER_HISTORY_LIMIT: usize = 5;

/// Candidate lookups in priority order; the budget decides how many run.
fn plan_calls(
    parameters: &ExtractedParameters,
    context: &MessageContext,
) -> Vec<(&'static str, serde_json::Value)> {
    let mut planned = Vec::new();

    let customer_id = context.customer_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    if let (true, Some(customer_id)) = (parameters.wants_order_history, customer_id) {
        planned.push((
            GET_CUSTOMER_ORDERS,
            json!({ "customerId": customer_id, "limit": PLANNED_ORDER_HISTORY_LIMIT }),
        ));
    }
    if let Some(order_id) = &parameters.order_id {
        planned.push((GET_ORDER_STATUS, json!({ "orderId": order_id })));
    }
    if let (true, Some(query)) = (parameters.wants_product_search, &parameters.search_query) {
        planned.push((SEARCH_PRODUCTS, json!({ "query": query, "limit": DEFAULT_SEARCH_LIMIT })));
    }
    planned
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use shopdesk_core::domain::intent::IntentKind;
    use shopdesk_core::domain::knowledge::{KnowledgeBase, KnowledgeBaseEntry, PolicyId};
    use shopdesk_core::domain::profile::AssistantProfile;

    use super::{plan_calls, AgentRuntime, MessageContext};
    use crate::conversation::ExtractedParameters;
    use crate::llm::{GenerationError, GenerationRequest, LlmClient};
    use crate::templates::ORDER_FALLBACK;
    use crate::tools::tests::FakeBackend;
    use crate::tools::{FunctionRegistry, GET_CUSTOMER_ORDERS, GET_ORDER_STATUS, SEARCH_PRODUCTS};

    /// Returns `reply` when set, otherwise times out. Keeps every prompt.
    #[derive(Default)]
    struct ScriptedLlm {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(request.prompt.clone());
            }
            self.reply.clone().ok_or(GenerationError::Timeout)
        }
    }

    fn knowledge() -> KnowledgeBase {
        KnowledgeBase::new(vec![KnowledgeBaseEntry {
            id: PolicyId("Policy1.1".to_string()),
            category: "returns".to_string(),
            question: "What is your return policy?".to_string(),
            answer: "We accept returns within 30 days of delivery with the original receipt."
                .to_string(),
            keywords: vec!["return".to_string()],
        }])
    }

    fn runtime(llm: Arc<ScriptedLlm>) -> (AgentRuntime, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        let registry = FunctionRegistry::with_commerce_backend(backend.clone());
        (AgentRuntime::new(knowledge(), AssistantProfile::default(), registry, llm), backend)
    }

    #[tokio::test]
    async fn chitchat_is_answered_without_generation() {
        let llm = Arc::new(ScriptedLlm::default());
        let (runtime, backend) = runtime(llm.clone());

        let reply = runtime.process_message("Hello!", &MessageContext::default()).await;
        assert_eq!(reply.intent, IntentKind::Chitchat);
        assert!(reply.response.starts_with("Hello! I'm Lin"));
        assert!(!reply.metadata.used_generation);
        assert!(!reply.metadata.user_identified);
        assert!(reply.functions_called.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(llm.prompts.lock().map(|prompts| prompts.is_empty()).unwrap_or(false));

        let stats = runtime.stats_snapshot().await;
        assert_eq!(stats.stats.direct_responses, 1);
        assert_eq!(stats.conversation_memory_size, 0);
    }

    #[tokio::test]
    async fn generated_policy_answers_are_sanitized_and_cited() {
        let llm = Arc::new(ScriptedLlm {
            reply: Some(
                "Answer: We accept returns within 30 days of delivery with the original receipt. [Policy1.1] [Policy7.7]\nUser: thanks!"
                    .to_string(),
            ),
            ..ScriptedLlm::default()
        });
        let (runtime, _) = runtime(llm);

        let reply = runtime
            .process_message("What is your return policy?", &MessageContext::default())
            .await;
        assert_eq!(reply.intent, IntentKind::PolicyQuestion);
        assert!(reply.metadata.used_generation);
        assert_eq!(
            reply.response,
            "We accept returns within 30 days of delivery with the original receipt. [Policy1.1]"
        );
        assert!(reply.citations.is_valid);
        assert_eq!(reply.citations.valid_citations, vec!["Policy1.1".to_string()]);
        assert_eq!(reply.relevant_policies, vec![PolicyId("Policy1.1".to_string())]);
    }

    #[tokio::test]
    async fn generation_failure_falls_back_to_the_mandated_answer() {
        let (runtime, _) = runtime(Arc::new(ScriptedLlm::default()));

        let reply = runtime
            .process_message("What is your return policy?", &MessageContext::default())
            .await;
        assert!(reply.metadata.used_generation, "generation mode was chosen");
        assert_eq!(
            reply.response,
            "We accept returns within 30 days of delivery with the original receipt. [Policy1.1]"
        );

        let stats = runtime.stats_snapshot().await;
        assert_eq!(stats.stats.generation_calls, 1);
        assert_eq!(stats.stats.fallback_responses, 1);
        assert_eq!(stats.generation_usage_percent + stats.direct_usage_percent, 100.0);
    }

    #[tokio::test]
    async fn order_status_without_data_uses_the_order_fallback() {
        let (runtime, backend) = runtime(Arc::new(ScriptedLlm::default()));

        let reply = runtime.process_message("Where is my order?", &MessageContext::default()).await;
        assert_eq!(reply.intent, IntentKind::OrderStatus);
        assert_eq!(reply.response, ORDER_FALLBACK);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn order_lookups_respect_the_call_budget() {
        let llm = Arc::new(ScriptedLlm::default());
        let (runtime, backend) = runtime(llm);
        let context = MessageContext {
            user_id: Some("user_7".to_string()),
            customer_id: Some("cust_01".to_string()),
        };

        let reply = runtime
            .process_message(
                "Show my recent orders and track order ord_1699999999_abc123xyz9",
                &context,
            )
            .await;

        assert_eq!(reply.functions_called, vec![GET_CUSTOMER_ORDERS, GET_ORDER_STATUS]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(reply.response.starts_with("You have 12 orders. Recent: ord_0 (SHIPPED)"));
        assert!(reply.metadata.user_identified);
        assert_eq!(runtime.conversation("user_7").await.len(), 1);
    }

    #[tokio::test]
    async fn failed_lookups_are_not_reported_to_the_customer() {
        let (runtime, backend) = runtime(Arc::new(ScriptedLlm::default()));

        let reply = runtime
            .process_message(
                "Where is my order ord_1699999999_missing00?",
                &MessageContext::default(),
            )
            .await;
        assert_eq!(reply.intent, IntentKind::OrderStatus);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(reply.functions_called.is_empty());
        assert_eq!(reply.response, ORDER_FALLBACK);

        let stats = runtime.stats_snapshot().await;
        assert_eq!(stats.stats.failed_function_calls, 1);
    }

    #[tokio::test]
    async fn unexpected_failures_become_the_technical_difficulties_reply() {
        let knowledge = KnowledgeBase::new(vec![KnowledgeBaseEntry {
            id: PolicyId("Policy3.1".to_string()),
            category: "returns".to_string(),
            question: "Can I exchange an item?".to_string(),
            answer: "   ".to_string(),
            keywords: Vec::new(),
        }]);
        let registry = FunctionRegistry::with_commerce_backend(Arc::new(FakeBackend::default()));
        let runtime = AgentRuntime::new(
            knowledge,
            AssistantProfile::default(),
            registry,
            Arc::new(ScriptedLlm::default()),
        );
        let context = MessageContext { user_id: Some("user_9".to_string()), customer_id: None };

        let reply = runtime.process_message("Can I exchange an item?", &context).await;
        assert_eq!(reply.intent, IntentKind::Error);
        assert_eq!(
            reply.response,
            "I apologize, but I'm experiencing technical difficulties. Please try again in a moment."
        );
        assert!(reply.relevant_policies.is_empty());
        assert!(reply.functions_called.is_empty());
        assert_eq!(reply.metadata.confidence, 0.0);
        assert!(runtime.conversation("user_9").await.is_empty());

        let stats = runtime.stats_snapshot().await;
        assert_eq!(stats.stats.errors, 1);
        assert_eq!(stats.stats.intent_count(IntentKind::Error), 1);
        assert_eq!(stats.stats.fallback_responses, 1);
    }

    #[test]
    fn plan_orders_history_then_status_then_search() {
        let parameters = ExtractedParameters {
            order_id: Some("ord_1699999999_abc123xyz9".to_string()),
            search_query: Some("dresses".to_string()),
            wants_order_history: true,
            wants_product_search: true,
            ..ExtractedParameters::default()
        };
        let context =
            MessageContext { user_id: None, customer_id: Some("cust_01".to_string()) };

        let planned = plan_calls(&parameters, &context);
        assert_eq!(planned[0].1["limit"], 5);
        let names = planned
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec![GET_CUSTOMER_ORDERS, GET_ORDER_STATUS, SEARCH_PRODUCTS]);

        let anonymous = plan_calls(&parameters, &MessageContext::default());
        assert_eq!(anonymous.len(), 2, "order history needs a customer id");
    }
}
