//! Payment collaborator: Stripe Checkout over its REST API.

use async_trait::async_trait;
use serde_json::Value;

use super::{
    CheckoutSummary, CreatedCheckout, NewCheckout, PaymentVerifier, UpstreamError,
};
use crate::config::StripeConfig;

const SERVICE: &str = "payment";

pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        }
    }

    async fn read_json(resp: reqwest::Response) -> Result<Value, UpstreamError> {
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if (200..300).contains(&status) {
            return Ok(body);
        }
        // Stripe error bodies carry { error: { message } }.
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or("request rejected")
            .to_string();
        Err(UpstreamError::Api {
            service: SERVICE,
            status,
            message,
        })
    }
}

#[async_trait]
impl PaymentVerifier for StripeClient {
    async fn retrieve_checkout(&self, cs_id: &str) -> Result<CheckoutSummary, UpstreamError> {
        let url = format!("{}/v1/checkout/sessions/{cs_id}", self.api_base);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .query(&[("expand[]", "line_items.data.price")])
            .send()
            .await
            .map_err(|e| UpstreamError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let body = Self::read_json(resp).await?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| UpstreamError::Shape {
                service: SERVICE,
                message: "checkout session has no id".into(),
            })?
            .to_string();

        let line_item_prices = body["line_items"]["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|li| li["price"]["id"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CheckoutSummary {
            id,
            status: body["status"].as_str().map(str::to_string),
            payment_status: body["payment_status"].as_str().map(str::to_string),
            amount_total: body["amount_total"].as_i64(),
            currency: body["currency"].as_str().map(str::to_string),
            line_item_prices,
        })
    }

    async fn create_checkout(&self, new: NewCheckout) -> Result<CreatedCheckout, UpstreamError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let form = [
            ("mode", "payment".to_string()),
            ("line_items[0][price]", new.price_id),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", new.success_url),
            ("cancel_url", new.cancel_url),
            ("expires_at", new.expires_at.to_string()),
            ("allow_promotion_codes", "true".to_string()),
        ];

        let mut req = self.http.post(&url).bearer_auth(&self.secret_key).form(&form);
        if let Some(key) = new.idempotency_key {
            req = req.header("Idempotency-Key", key);
        }

        let resp = req.send().await.map_err(|e| UpstreamError::Transport {
            service: SERVICE,
            message: e.to_string(),
        })?;

        let body = Self::read_json(resp).await?;
        let id = body["id"]
            .as_str()
            .ok_or_else(|| UpstreamError::Shape {
                service: SERVICE,
                message: "created checkout has no id".into(),
            })?
            .to_string();

        Ok(CreatedCheckout {
            id,
            url: body["url"].as_str().map(str::to_string),
            expires_at: body["expires_at"].as_i64(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
