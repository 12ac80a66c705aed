use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ToolError;

// Money is carried as integer cents end to end; the JSON surface speaks
// dollars. Conversions happen only at the edges.

pub fn dollars_to_cents(amount: f64) -> Result<i64, ToolError> {
    if !amount.is_finite() {
        return Err(ToolError::validation("amount must be a finite number"));
    }
    if amount < 0.0 {
        return Err(ToolError::validation("amount must not be negative"));
    }
    let cents = (amount * 100.0).round();
    if cents > 1e15 {
        return Err(ToolError::validation("amount is out of range"));
    }
    Ok(cents as i64)
}

pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn format_dollars(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

pub fn cents_as_dollars<S: Serializer>(cents: &i64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(cents_to_dollars(*cents))
}

#[derive(Debug, Clone, Serialize)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub author: String,
    #[serde(rename = "price", serialize_with = "cents_as_dollars")]
    pub price_cents: i64,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLine {
    pub isbn: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemDetail {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub quantity: i64,
    #[serde(rename = "unit_price", serialize_with = "cents_as_dollars")]
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub order_id: i64,
    pub customer_id: i64,
    pub customer_name: String,
    pub status: OrderStatus,
    #[serde(rename = "total", serialize_with = "cents_as_dollars")]
    pub total_cents: i64,
    pub items: Vec<OrderItemDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub id: i64,
    pub customer_id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub status: OrderStatus,
    #[serde(rename = "total", serialize_with = "cents_as_dollars")]
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestockOutcome {
    pub isbn: String,
    pub title: String,
    pub previous_stock: i64,
    pub new_stock: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceChange {
    pub isbn: String,
    pub title: String,
    #[serde(rename = "old_price", serialize_with = "cents_as_dollars")]
    pub old_price_cents: i64,
    #[serde(rename = "new_price", serialize_with = "cents_as_dollars")]
    pub new_price_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LowStockEntry {
    pub isbn: String,
    pub title: String,
    pub stock: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InventorySummary {
    pub titles: i64,
    pub total_stock: i64,
    #[serde(rename = "total_value", serialize_with = "cents_as_dollars")]
    pub total_value_cents: i64,
    #[serde(rename = "average_price", serialize_with = "cents_as_dollars")]
    pub average_price_cents: i64,
    pub low_stock_threshold: i64,
    pub low_stock: Vec<LowStockEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub min_stock: Option<i64>,
}
