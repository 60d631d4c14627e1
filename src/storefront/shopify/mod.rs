#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{Order, OrderQuery, OrderSource, StorefrontCredentials};
use crate::SupportError;
use crate::config::StorefrontConfig;

/// Shopify Admin REST client
#[derive(Debug, Clone)]
pub struct ShopifyClient {
    agent: ureq::Agent,
    api_version: String,
    max_orders: u32,
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    orders: Vec<Order>,
}

impl ShopifyClient {
    #[inline]
    pub fn new(config: &StorefrontConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Self {
            agent,
            api_version: config.api_version.clone(),
            max_orders: config.max_orders_per_lookup.max(1),
        }
    }

    fn orders_url(&self, credentials: &StorefrontCredentials, query: &OrderQuery) -> Result<Url> {
        let mut url = Url::parse(credentials.base_url())
            .and_then(|base| base.join(&format!("/admin/api/{}/orders.json", self.api_version)))
            .with_context(|| format!("Invalid storefront URL: {}", credentials.base_url()))?;

        {
            let mut pairs = url.query_pairs_mut();
            match query {
                OrderQuery::Number(number) => pairs.append_pair("name", &format!("#{number}")),
                OrderQuery::Email(email) => pairs.append_pair("email", email),
            };
            pairs
                .append_pair("status", "any")
                .append_pair("limit", &self.max_orders.to_string());
        }

        Ok(url)
    }

    fn fetch_orders(&self, credentials: &StorefrontCredentials, query: &OrderQuery) -> Result<Vec<Order>> {
        let url = self.orders_url(credentials, query)?;
        debug!("Looking up orders for {} at {}", query, url.path());

        let body = self
            .agent
            .get(url.as_str())
            .header("X-Shopify-Access-Token", credentials.access_token())
            .header("Accept", "application/json")
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => anyhow!("Storefront returned HTTP {}", status),
                other => anyhow!("Failed to reach storefront: {}", other),
            })?;

        let response: OrdersResponse =
            serde_json::from_str(&body).context("Failed to parse orders response")?;

        // Shopify's name filter is a prefix match; #10 must not return #1000
        let orders = match query {
            OrderQuery::Number(number) => response
                .orders
                .into_iter()
                .filter(|o| o.name.trim_start_matches('#') == number.as_str())
                .collect(),
            OrderQuery::Email(_) => response.orders,
        };

        Ok(orders)
    }
}

#[async_trait]
impl OrderSource for ShopifyClient {
    #[inline]
    async fn find_orders(
        &self,
        credentials: &StorefrontCredentials,
        query: &OrderQuery,
    ) -> crate::Result<Vec<Order>> {
        let client = self.clone();
        let credentials = credentials.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || client.fetch_orders(&credentials, &query))
            .await
            .map_err(|e| SupportError::Storefront(format!("storefront task failed: {e}")))?
            .map_err(|e| SupportError::Storefront(format!("{e:#}")))
    }
}
