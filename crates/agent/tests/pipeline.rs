use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use shopdesk_agent::backend::{BackendError, CommerceBackend, ProductQuery};
use shopdesk_agent::guardrails::validate_citations;
use shopdesk_agent::llm::{GenerationError, GenerationRequest, LlmClient};
use shopdesk_agent::templates::ORDER_FALLBACK;
use shopdesk_agent::tools::FunctionRegistry;
use shopdesk_agent::{AgentRuntime, MessageContext};
use shopdesk_core::domain::commerce::{
    CustomerId, OrderId, OrderSummary, ProductHit, ProductSearchResult, SearchPagination,
};
use shopdesk_core::domain::intent::IntentKind;
use shopdesk_core::domain::knowledge::{KnowledgeBase, KnowledgeBaseEntry, PolicyId};
use shopdesk_core::domain::profile::AssistantProfile;
use tokio::task::JoinSet;

const RETURN_ANSWER: &str = "We accept returns within 30 days of delivery for unworn items.";

#[derive(Default)]
struct StoreBackend {
    calls: AtomicUsize,
    orders_time_out: bool,
}

fn order(id: &str, status: &str) -> OrderSummary {
    OrderSummary {
        order_id: OrderId(id.to_string()),
        status: status.to_string(),
        total: 59.0,
        items: Vec::new(),
        estimated_delivery: None,
        carrier: Some("UPS".to_string()),
        created_at: None,
        customer_id: Some(CustomerId("cust_42".to_string())),
    }
}

#[async_trait]
impl CommerceBackend for StoreBackend {
    async fn order_by_id(&self, order_id: &OrderId) -> Result<OrderSummary, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.orders_time_out {
            return Err(BackendError::Timeout);
        }
        Ok(order(&order_id.0, "SHIPPED"))
    }

    async fn search_products(
        &self,
        query: &ProductQuery,
    ) -> Result<ProductSearchResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProductSearchResult {
            search_query: query.text.clone(),
            results: vec![ProductHit {
                id: "prod_1".to_string(),
                name: "Linen Summer Dress".to_string(),
                description: "Breathable linen".to_string(),
                price: 49.5,
                category: Some("dresses".to_string()),
                in_stock: true,
                stock: 25,
                tags: Vec::new(),
                image_url: None,
            }],
            pagination: SearchPagination {
                total_results: 1,
                current_page: 1,
                total_pages: 1,
                has_more: false,
            },
        })
    }

    async fn orders_for_customer(
        &self,
        _customer_id: &CustomerId,
    ) -> Result<Vec<OrderSummary>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![order("ord_a", "PENDING"), order("ord_b", "DELIVERED")])
    }
}

/// Echoes a fixed reply, or behaves like an unreachable service.
struct FixedLlm(Option<&'static str>);

#[async_trait]
impl LlmClient for FixedLlm {
    async fn complete(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        self.0.map(str::to_string).ok_or(GenerationError::Transport("connection refused".to_string()))
    }
}

fn knowledge() -> KnowledgeBase {
    KnowledgeBase::new(vec![
        KnowledgeBaseEntry {
            id: PolicyId("Policy1.1".to_string()),
            category: "returns".to_string(),
            question: "What is your return policy?".to_string(),
            answer: RETURN_ANSWER.to_string(),
            keywords: vec!["return".to_string(), "refund".to_string()],
        },
        KnowledgeBaseEntry {
            id: PolicyId("Policy2.1".to_string()),
            category: "shipping".to_string(),
            question: "How long does shipping take?".to_string(),
            answer: "Standard shipping takes 3-5 business days.".to_string(),
            keywords: vec!["shipping".to_string()],
        },
    ])
}

fn runtime(backend: Arc<StoreBackend>, llm: FixedLlm) -> AgentRuntime {
    AgentRuntime::new(
        knowledge(),
        AssistantProfile::default(),
        FunctionRegistry::with_commerce_backend(backend),
        Arc::new(llm),
    )
}

#[tokio::test]
async fn greeting_gets_a_direct_reply() {
    let runtime = runtime(Arc::new(StoreBackend::default()), FixedLlm(None));
    let reply = runtime.process_message("Hello!", &MessageContext::default()).await;

    assert_eq!(reply.intent, IntentKind::Chitchat);
    assert!(reply.response.contains("Lin"));
    assert!(reply.citations.is_valid);
    assert_eq!(reply.citations.total_citations, 0);
}

#[tokio::test]
async fn return_policy_question_is_answered_from_the_knowledge_base() {
    let runtime = runtime(Arc::new(StoreBackend::default()), FixedLlm(None));
    let reply = runtime
        .process_message("What is your return policy?", &MessageContext::default())
        .await;

    assert_eq!(reply.intent, IntentKind::PolicyQuestion);
    assert!(reply.response.contains(RETURN_ANSWER), "{}", reply.response);
    assert!(reply.response.ends_with("[Policy1.1]"));
    assert_eq!(reply.citations.valid_citations, vec!["Policy1.1".to_string()]);
    assert_eq!(reply.relevant_policies, vec![PolicyId("Policy1.1".to_string())]);
}

#[tokio::test]
async fn invented_policy_ids_never_reach_the_customer() {
    let runtime = runtime(
        Arc::new(StoreBackend::default()),
        FixedLlm(Some("We accept returns within 30 days of delivery for unworn items. [Policy9.9]")),
    );
    let reply = runtime
        .process_message("What is your return policy?", &MessageContext::default())
        .await;

    assert!(reply.metadata.used_generation);
    assert!(!reply.response.contains("Policy9.9"), "{}", reply.response);
    assert!(reply.citations.is_valid);

    let raw = validate_citations("See [Policy9.9] and [Policy1.1]", runtime.knowledge_base());
    assert!(!raw.is_valid);
    assert_eq!(raw.invalid_citations, vec!["Policy9.9".to_string()]);
    assert_eq!(raw.total_citations, 2);
}

#[tokio::test]
async fn order_lookup_timeout_degrades_to_a_well_formed_reply() {
    let backend = Arc::new(StoreBackend { orders_time_out: true, ..StoreBackend::default() });
    let runtime = runtime(backend.clone(), FixedLlm(None));

    let reply = runtime
        .process_message(
            "Where is my order ord_1699999999_abc123xyz9?",
            &MessageContext { user_id: Some("u1".to_string()), customer_id: None },
        )
        .await;

    assert_eq!(reply.intent, IntentKind::OrderStatus);
    assert!(reply.functions_called.is_empty(), "failed lookups stay internal");
    let wire = serde_json::to_value(&reply).expect("serialize reply");
    assert_eq!(wire["functionsCalled"], serde_json::json!([]));
    assert!(!wire.to_string().contains("timed out"));
    assert_eq!(runtime.stats_snapshot().await.stats.failed_function_calls, 1);
    assert_eq!(reply.response, ORDER_FALLBACK);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.conversation("u1").await.len(), 1);
}

#[tokio::test]
async fn product_search_lists_backend_results_when_generation_is_down() {
    let runtime = runtime(Arc::new(StoreBackend::default()), FixedLlm(None));
    let reply = runtime
        .process_message("Can you show me summer dresses?", &MessageContext::default())
        .await;

    assert_eq!(reply.intent, IntentKind::ProductSearch);
    assert_eq!(
        reply.response,
        "I found 1 product(s):\n\n• Linen Summer Dress - $49.50 (In Stock) - Breathable linen"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_messages_each_stay_within_the_call_budget() {
    let backend = Arc::new(StoreBackend::default());
    let runtime = Arc::new(runtime(backend.clone(), FixedLlm(None)));
    let mut tasks = JoinSet::new();

    for index in 0..8 {
        let runtime = Arc::clone(&runtime);
        tasks.spawn(async move {
            let context = MessageContext {
                user_id: Some(format!("user_{index}")),
                customer_id: Some("cust_42".to_string()),
            };
            runtime
                .process_message(
                    "Show me my recent orders and track order ord_1699999999_abc123xyz9 and find dresses",
                    &context,
                )
                .await
        });
    }

    let mut replies = 0;
    while let Some(joined) = tasks.join_next().await {
        let reply = joined.expect("task");
        assert!(reply.functions_called.len() <= 2);
        replies += 1;
    }

    assert_eq!(replies, 8);
    assert!(backend.calls.load(Ordering::SeqCst) <= 16);
    let stats = runtime.stats_snapshot().await;
    assert_eq!(stats.stats.total_queries, 8);
    assert_eq!(stats.conversation_memory_size, 8);
}
