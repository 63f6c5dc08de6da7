//! Read-only access to the store's order and catalog API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shopdesk_core::config::BackendConfig;
use shopdesk_core::domain::commerce::{
    CustomerId, OrderId, OrderLineItem, OrderSummary, ProductHit, ProductSearchResult,
    SearchPagination,
};
use thiserror::Error;
use tracing::debug;

pub const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductQuery {
    pub text: String,
    pub limit: usize,
    pub category: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{resource} `{id}` was not found")]
    NotFound { resource: &'static str, id: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("commerce backend timed out")]
    Timeout,
    #[error("commerce backend returned status {status} for {path}")]
    Status { status: u16, path: String },
    #[error("commerce backend transport error: {0}")]
    Transport(String),
    #[error("commerce backend payload could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[async_trait]
pub trait CommerceBackend: Send + Sync {
    async fn order_by_id(&self, order_id: &OrderId) -> Result<OrderSummary, BackendError>;

    async fn search_products(&self, query: &ProductQuery)
        -> Result<ProductSearchResult, BackendError>;

    /// All orders for a customer, newest first.
    async fn orders_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<OrderSummary>, BackendError>;
}

#[derive(Clone, Debug)]
pub struct HttpCommerceBackend {
    client: Client,
    base_url: String,
}

impl HttpCommerceBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| BackendError::Transport(error.to_string()))?;

        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        not_found: Option<(&'static str, &str)>,
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(event_name = "assistant.backend.request", path = %path, "calling commerce backend");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            if let Some((resource, id)) = not_found {
                return Err(BackendError::NotFound { resource, id: id.to_string() });
            }
        }
        if !status.is_success() {
            return Err(BackendError::Status { status: status.as_u16(), path: path.to_string() });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|error| BackendError::Decode(error.to_string()))
    }
}

#[async_trait]
impl CommerceBackend for HttpCommerceBackend {
    async fn order_by_id(&self, order_id: &OrderId) -> Result<OrderSummary, BackendError> {
        ensure_path_safe(&order_id.0)?;
        let path = format!("/api/orders/{}", order_id.0);
        let order: ApiOrder = self.get_json(&path, &[], Some(("order", &order_id.0))).await?;
        Ok(order.into())
    }

    async fn search_products(
        &self,
        query: &ProductQuery,
    ) -> Result<ProductSearchResult, BackendError> {
        let limit = query.limit.clamp(1, MAX_SEARCH_LIMIT);
        let mut params = vec![("search", query.text.clone()), ("limit", limit.to_string())];
        if let Some(category) = &query.category {
            params.push(("tag", category.clone()));
        }

        let page: ApiProductPage = self.get_json("/api/products", &params, None).await?;
        Ok(page.into_search_result(&query.text))
    }

    async fn orders_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<OrderSummary>, BackendError> {
        let orders: Vec<ApiOrder> = self
            .get_json("/api/orders", &[("customerId", customer_id.0.clone())], None)
            .await?;
        Ok(orders.into_iter().map(OrderSummary::from).collect())
    }
}

fn ensure_path_safe(id: &str) -> Result<(), BackendError> {
    let valid = !id.is_empty()
        && id.chars().all(|character| character.is_ascii_alphanumeric() || "_-".contains(character));
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidRequest(format!("order id `{id}` contains unsupported characters")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiOrder {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    total: f64,
    #[serde(default)]
    items: Vec<ApiOrderItem>,
    estimated_delivery: Option<DateTime<Utc>>,
    carrier: Option<String>,
    created_at: Option<DateTime<Utc>>,
    customer_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiOrderItem {
    product_id: String,
    name: String,
    price: f64,
    quantity: u32,
}

impl From<ApiOrder> for OrderSummary {
    fn from(order: ApiOrder) -> Self {
        Self {
            order_id: OrderId(order.id),
            status: order.status,
            total: order.total,
            items: order
                .items
                .into_iter()
                .map(|item| OrderLineItem {
                    product_id: item.product_id,
                    name: item.name,
                    price: item.price,
                    quantity: item.quantity,
                })
                .collect(),
            estimated_delivery: order.estimated_delivery,
            carrier: order.carrier,
            created_at: order.created_at,
            customer_id: order.customer_id.map(CustomerId),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProduct {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    price: f64,
    category: Option<String>,
    #[serde(default)]
    stock: u32,
    #[serde(default)]
    tags: Vec<String>,
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPagination {
    page: u64,
    total: u64,
    pages: u64,
}

#[derive(Debug, Deserialize)]
struct ApiProductPage {
    items: Vec<ApiProduct>,
    pagination: ApiPagination,
}

impl ApiProductPage {
    fn into_search_result(self, search_query: &str) -> ProductSearchResult {
        let results = self
            .items
            .into_iter()
            .map(|product| ProductHit {
                id: product.id,
                name: product.name,
                description: product.description,
                price: product.price,
                category: product.category,
                in_stock: product.stock > 0,
                stock: product.stock,
                tags: product.tags,
                image_url: product.image_url,
            })
            .collect();

        ProductSearchResult {
            search_query: search_query.to_string(),
            results,
            pagination: SearchPagination {
                total_results: self.pagination.total,
                current_page: self.pagination.page,
                total_pages: self.pagination.pages,
                has_more: self.pagination.page < self.pagination.pages,
            },
        }
    }
}
