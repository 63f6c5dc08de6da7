use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub status: String,
    pub total: f64,
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub carrier: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub customer_id: Option<CustomerId>,
}

impl OrderSummary {
    /// The single sentence an order-status reply must consist of.
    pub fn status_sentence(&self) -> String {
        let delivery = self
            .estimated_delivery
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "to be confirmed".to_string());
        let carrier = self.carrier.as_deref().unwrap_or("our carrier");
        format!(
            "Your order {} is {}. Total: {}. Estimated delivery: {} via {}.",
            self.order_id.0,
            self.status,
            format_price(self.total),
            delivery,
            carrier
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrders {
    pub customer_id: CustomerId,
    pub orders: Vec<OrderSummary>,
    pub total_orders: usize,
    pub limited_orders: usize,
    pub message: String,
}

impl CustomerOrders {
    /// Keeps the first `limit` orders and records how many were available.
    pub fn from_orders(customer_id: CustomerId, orders: Vec<OrderSummary>, limit: usize) -> Self {
        let total_orders = orders.len();
        let orders = orders.into_iter().take(limit).collect::<Vec<_>>();
        let limited_orders = orders.len();
        let message = if total_orders == 0 {
            "No orders found for this customer".to_string()
        } else {
            format!("Found {total_orders} orders (showing {limited_orders})")
        };

        Self { customer_id, orders, total_orders, limited_orders, message }
    }

    pub fn summary_sentence(&self) -> String {
        let recent = self
            .orders
            .iter()
            .take(3)
            .map(|order| {
                format!("{} ({}) - {}", order.order_id.0, order.status, format_price(order.total))
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "You have {} orders. Recent: {}. Use specific order IDs for detailed status.",
            self.total_orders, recent
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductHit {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub category: Option<String>,
    pub in_stock: bool,
    pub stock: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_url: Option<String>,
}

impl ProductHit {
    pub fn stock_label(&self) -> String {
        match self.stock {
            0 => "Out of Stock".to_string(),
            1..=10 => format!("Low Stock: Only {} left", self.stock),
            _ => "In Stock".to_string(),
        }
    }

    pub fn list_line(&self) -> String {
        format!(
            "• {} - {} ({}) - {}",
            self.name,
            format_price(self.price),
            self.stock_label(),
            self.description
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPagination {
    pub total_results: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearchResult {
    pub search_query: String,
    pub results: Vec<ProductHit>,
    pub pagination: SearchPagination,
}

pub fn format_price(amount: f64) -> String {
    format!("${amount:.2}")
}
