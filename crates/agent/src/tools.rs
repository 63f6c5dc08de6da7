//! Named backend lookups the assistant may invoke while answering.
//!
//! [`FunctionRegistry::execute`] never returns an error: unknown names,
//! invalid arguments, and handler failures all come back as a failed
//! [`FunctionCallResult`] so one bad lookup cannot abort a conversation.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use shopdesk_core::domain::commerce::{CustomerId, CustomerOrders, OrderId};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{CommerceBackend, ProductQuery};

pub const GET_ORDER_STATUS: &str = "getOrderStatus";
pub const SEARCH_PRODUCTS: &str = "searchProducts";
pub const GET_CUSTOMER_ORDERS: &str = "getCustomerOrders";

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_CUSTOMER_ORDER_LIMIT: usize = 10;

/// Upper bound on lookups performed for a single message.
pub const MAX_CALLS_PER_MESSAGE: usize = 2;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterSchema {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterSchema>,
}

impl FunctionSchema {
    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterSchema> {
        self.parameters.iter().filter(|parameter| parameter.required)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionErrorKind {
    UnknownFunction,
    InvalidArguments,
    HandlerFailed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallResult {
    pub function_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FunctionErrorKind>,
}

impl FunctionCallResult {
    pub fn success(function_name: impl Into<String>, data: Value) -> Self {
        Self {
            function_name: function_name.into(),
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(
        function_name: impl Into<String>,
        kind: FunctionErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            success: false,
            data: None,
            error: Some(message.into()),
            error_kind: Some(kind),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> FunctionSchema;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct FunctionRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl FunctionRegistry {
    /// Registry with the three commerce lookups bound to `backend`.
    pub fn with_commerce_backend(backend: Arc<dyn CommerceBackend>) -> Self {
        let mut registry = Self::default();
        registry.register(OrderStatusTool { backend: Arc::clone(&backend) });
        registry.register(ProductSearchTool { backend: Arc::clone(&backend) });
        registry.register(CustomerOrdersTool { backend });
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.schema().name.to_string(), Box::new(tool));
    }

    pub fn schemas(&self) -> Vec<FunctionSchema> {
        self.tools.values().map(|tool| tool.schema()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn execute(&self, name: &str, arguments: Value) -> FunctionCallResult {
        let Some(tool) = self.tools.get(name) else {
            warn!(event_name = "assistant.function.unknown", function = %name, "unknown function");
            return FunctionCallResult::failure(
                name,
                FunctionErrorKind::UnknownFunction,
                format!("Function {name} not found"),
            );
        };

        if let Err(message) = check_arguments(&tool.schema(), &arguments) {
            warn!(
                event_name = "assistant.function.invalid_arguments",
                function = %name,
                error = %message,
                "function arguments rejected"
            );
            return FunctionCallResult::failure(name, FunctionErrorKind::InvalidArguments, message);
        }

        match tool.execute(arguments).await {
            Ok(data) => {
                debug!(event_name = "assistant.function.succeeded", function = %name, "function executed");
                FunctionCallResult::success(name, data)
            }
            Err(error) => {
                let message = format!("{error:#}");
                warn!(
                    event_name = "assistant.function.failed",
                    function = %name,
                    error = %message,
                    "function handler failed"
                );
                FunctionCallResult::failure(name, FunctionErrorKind::HandlerFailed, message)
            }
        }
    }
}

fn check_arguments(schema: &FunctionSchema, arguments: &Value) -> Result<(), String> {
    let Some(object) = arguments.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };
    for parameter in schema.required_parameters() {
        if is_missing(object, parameter.name) {
            return Err(format!("missing required parameter `{}`", parameter.name));
        }
    }
    Ok(())
}

fn is_missing(object: &Map<String, Value>, name: &str) -> bool {
    match object.get(name) {
        None | Some(Value::Null) => true,
        Some(Value::String(value)) => value.trim().is_empty(),
        Some(_) => false,
    }
}

fn string_argument(input: &Value, name: &str) -> Result<String> {
    input
        .get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("`{name}` must be a non-empty string"))
}

fn limit_argument(input: &Value, default: usize) -> usize {
    input
        .get("limit")
        .and_then(Value::as_u64)
        .and_then(|limit| usize::try_from(limit).ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(default)
}

/// Per-message counter enforcing [`MAX_CALLS_PER_MESSAGE`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallBudget {
    limit: usize,
    used: usize,
}

/// Returned when the per-message budget is spent. This is a normal stop
/// condition, not a failure.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("function call budget of {limit} exhausted")]
pub struct BudgetExhausted {
    pub limit: usize,
}

impl Default for CallBudget {
    fn default() -> Self {
        Self::new(MAX_CALLS_PER_MESSAGE)
    }
}

impl CallBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn try_spend(&mut self) -> Result<(), BudgetExhausted> {
        if self.used >= self.limit {
            return Err(BudgetExhausted { limit: self.limit });
        }
        self.used += 1;
        Ok(())
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.used
    }
}

struct OrderStatusTool {
    backend: Arc<dyn CommerceBackend>,
}

#[async_trait]
impl Tool for OrderStatusTool {
    fn schema(&self) -> FunctionSchema {
        FunctionSchema {
            name: GET_ORDER_STATUS,
            description: "Get the current status and details of an order by order ID",
            parameters: vec![ParameterSchema {
                name: "orderId",
                kind: "string",
                description: "The order ID to look up",
                required: true,
                default: None,
            }],
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let order_id = OrderId(string_argument(&input, "orderId")?);
        let order = self
            .backend
            .order_by_id(&order_id)
            .await
            .with_context(|| format!("order lookup failed for `{}`", order_id.0))?;
        Ok(serde_json::to_value(order)?)
    }
}

struct ProductSearchTool {
    backend: Arc<dyn CommerceBackend>,
}

#[async_trait]
impl Tool for ProductSearchTool {
    fn schema(&self) -> FunctionSchema {
        FunctionSchema {
            name: SEARCH_PRODUCTS,
            description: "Search for products by query, category, or tags",
            parameters: vec![
                ParameterSchema {
                    name: "query",
                    kind: "string",
                    description: "Search query for product name, description, or category",
                    required: true,
                    default: None,
                },
                ParameterSchema {
                    name: "limit",
                    kind: "number",
                    description: "Maximum number of results to return",
                    required: false,
                    default: Some(json!(DEFAULT_SEARCH_LIMIT)),
                },
                ParameterSchema {
                    name: "category",
                    kind: "string",
                    description: "Filter by specific category",
                    required: false,
                    default: None,
                },
            ],
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = ProductQuery {
            text: string_argument(&input, "query")?,
            limit: limit_argument(&input, DEFAULT_SEARCH_LIMIT),
            category: string_argument(&input, "category").ok(),
        };
        let result = self
            .backend
            .search_products(&query)
            .await
            .with_context(|| format!("product search failed for `{}`", query.text))?;
        Ok(serde_json::to_value(result)?)
    }
}

struct CustomerOrdersTool {
    backend: Arc<dyn CommerceBackend>,
}

#[async_trait]
impl Tool for CustomerOrdersTool {
    fn schema(&self) -> FunctionSchema {
        FunctionSchema {
            name: GET_CUSTOMER_ORDERS,
            description: "Get all orders for a specific customer by customer ID",
            parameters: vec![
                ParameterSchema {
                    name: "customerId",
                    kind: "string",
                    description: "Customer ID to get orders for",
                    required: true,
                    default: None,
                },
                ParameterSchema {
                    name: "limit",
                    kind: "number",
                    description: "Maximum number of orders to return",
                    required: false,
                    default: Some(json!(DEFAULT_CUSTOMER_ORDER_LIMIT)),
                },
            ],
        }
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let customer_id = CustomerId(string_argument(&input, "customerId")?);
        let limit = limit_argument(&input, DEFAULT_CUSTOMER_ORDER_LIMIT);
        let orders = self
            .backend
            .orders_for_customer(&customer_id)
            .await
            .with_context(|| format!("order history lookup failed for `{}`", customer_id.0))?;
        Ok(serde_json::to_value(CustomerOrders::from_orders(customer_id, orders, limit))?)
    }
}
