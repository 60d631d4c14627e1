// Storefront collaborator: order records, lookup and prompt-ready formatting


pub mod shopify;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::SupportError;

pub use shopify::ShopifyClient;

/// Connection details for one tenant's store
#[derive(Clone, PartialEq, Eq)]
pub struct StorefrontCredentials {
    base_url: String,
    access_token: String,
}

impl StorefrontCredentials {
    /// Accepts `acme`, `acme.myshopify.com` or a full URL
    #[inline]
    pub fn new(shop_domain: &str, access_token: &str) -> Self {
        let domain = shop_domain.trim().trim_end_matches('/');
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else if domain.contains('.') {
            format!("https://{domain}")
        } else {
            format!("https://{domain}.myshopify.com")
        };

        Self {
            base_url,
            access_token: access_token.trim().to_string(),
        }
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[inline]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for StorefrontCredentials {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontCredentials")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    #[serde(default)]
    pub status: Option<String>,
    /// Carrier-reported state such as `in_transit` or `delivered`
    #[serde(default)]
    pub shipment_status: Option<String>,
    #[serde(default)]
    pub tracking_company: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    /// Display name, e.g. `#1001`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    #[serde(default)]
    pub total_price: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub fulfillments: Vec<Fulfillment>,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

/// What a customer or agent typed to identify orders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderQuery {
    /// Order number without the leading `#`
    Number(String),
    Email(String),
}

impl OrderQuery {
    /// Parse `#1234`, `1234`, `order 1234` or an email address
    #[inline]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.contains('@') {
            let (local, domain) = trimmed.split_once('@')?;
            return (!local.is_empty() && domain.contains('.') && !trimmed.contains(' '))
                .then(|| Self::Email(trimmed.to_lowercase()));
        }

        let lowered = trimmed.to_lowercase();
        let number = lowered
            .strip_prefix("order")
            .unwrap_or(&lowered)
            .trim_start_matches([' ', ':', '#'])
            .trim_start_matches("number")
            .trim_start_matches([' ', ':', '#'])
            .trim();

        (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit()))
            .then(|| Self::Number(number.to_string()))
    }
}

impl std::fmt::Display for OrderQuery {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(number) => write!(f, "#{number}"),
            Self::Email(email) => f.write_str(email),
        }
    }
}

/// Fetches orders from a tenant's store
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn find_orders(
        &self,
        credentials: &StorefrontCredentials,
        query: &OrderQuery,
    ) -> crate::Result<Vec<Order>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLookupResult {
    pub found: bool,
    pub orders: Vec<Order>,
    pub formatted_text: String,
}

/// Order lookup used by reply generation and exposed for manual searches
#[derive(Clone)]
pub struct OrderLookup {
    source: Arc<dyn OrderSource>,
}

impl OrderLookup {
    #[inline]
    pub fn new(source: Arc<dyn OrderSource>) -> Self {
        Self { source }
    }

    #[inline]
    pub async fn lookup(
        &self,
        credentials: &StorefrontCredentials,
        search_query: &str,
    ) -> crate::Result<OrderLookupResult> {
        let query = OrderQuery::parse(search_query).ok_or_else(|| {
            SupportError::Validation(format!(
                "'{}' is not an order number or email address",
                search_query.trim()
            ))
        })?;

        let orders = self.source.find_orders(credentials, &query).await?;
        debug!("Order lookup for {} found {} orders", query, orders.len());

        Ok(OrderLookupResult {
            found: !orders.is_empty(),
            formatted_text: format_orders(&orders),
            orders,
        })
    }
}

/// Render orders as a compact block for the prompt or the terminal
#[inline]
pub fn format_orders(orders: &[Order]) -> String {
    orders.iter().map(format_order).join("\n\n")
}

fn format_order(order: &Order) -> String {
    let mut text = format!("Order {}", order.name);
    if let Some(created) = order.created_at {
        let _ = write!(text, " (placed {})", created.format("%Y-%m-%d"));
    }

    if order.cancelled_at.is_some() {
        text.push_str("\n  Status: cancelled");
    }

    let _ = write!(
        text,
        "\n  Payment: {} | Fulfillment: {}",
        order.financial_status.as_deref().unwrap_or("unknown"),
        order.fulfillment_status.as_deref().unwrap_or("unfulfilled")
    );

    if !order.line_items.is_empty() {
        let items = order
            .line_items
            .iter()
            .map(|item| format!("{} x {}", item.quantity, item.title))
            .join(", ");
        let _ = write!(text, "\n  Items: {items}");
    }

    if let Some(total) = &order.total_price {
        let _ = write!(
            text,
            "\n  Total: {} {}",
            total,
            order.currency.as_deref().unwrap_or_default()
        );
        text.truncate(text.trim_end().len());
    }

    if let Some(address) = &order.shipping_address {
        let destination = [address.city.as_deref(), address.country.as_deref()]
            .into_iter()
            .flatten()
            .join(", ");
        if !destination.is_empty() {
            let _ = write!(text, "\n  Ships to: {destination}");
        }
    }

    for fulfillment in &order.fulfillments {
        let state = fulfillment
            .shipment_status
            .as_deref()
            .or(fulfillment.status.as_deref())
            .unwrap_or("pending");
        let _ = write!(text, "\n  Shipment: {state}");
        if let Some(carrier) = &fulfillment.tracking_company {
            let _ = write!(text, " via {carrier}");
        }
        if let Some(number) = &fulfillment.tracking_number {
            let _ = write!(text, ", tracking {number}");
        }
        if let Some(url) = &fulfillment.tracking_url {
            let _ = write!(text, " ({url})");
        }
    }

    text
}
