//! Identity/entitlement collaborator: Supabase auth + PostgREST rights table.
//!
//! Rights rows are one schema: `user_id`, `product`, `status`, `revoked_at`.
//! A right is usable when `status = "active"` and `revoked_at` is null.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{IdentityProvider, RightRow, UpstreamError, UserIdentity};
use crate::config::IdentityConfig;

const SERVICE: &str = "identity";

pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    service_role_key: String,
    rights_table: String,
}

impl SupabaseClient {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.service_role_key.clone(),
            rights_table: config.rights_table.clone(),
        }
    }

    fn rights_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.rights_table)
    }

    fn transport(e: reqwest::Error) -> UpstreamError {
        UpstreamError::Transport {
            service: SERVICE,
            message: e.to_string(),
        }
    }

    fn api(status: u16, body: &Value) -> UpstreamError {
        let message = body["message"]
            .as_str()
            .or_else(|| body["msg"].as_str())
            .unwrap_or("request rejected")
            .to_string();
        UpstreamError::Api {
            service: SERVICE,
            status,
            message,
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn resolve_user(&self, bearer: &str) -> Result<Option<UserIdentity>, UpstreamError> {
        let resp = self
            .http
            .get(format!("{}/auth/v1/user", self.url))
            .header("apikey", &self.service_role_key)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(Self::transport)?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);

        // A rejected credential is an expected outcome, not a fault.
        if matches!(status, 401 | 403 | 404) {
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            return Err(Self::api(status, &body));
        }

        match body["id"].as_str() {
            Some(id) if !id.is_empty() => Ok(Some(UserIdentity {
                id: id.to_string(),
                email: body["email"].as_str().map(str::to_string),
            })),
            _ => Ok(None),
        }
    }

    async fn has_right(&self, user_id: &str, product_key: &str) -> Result<bool, UpstreamError> {
        let resp = self
            .http
            .get(self.rights_url())
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("product", format!("eq.{product_key}")),
                ("select", "user_id,product,status,revoked_at".to_string()),
            ])
            .send()
            .await
            .map_err(Self::transport)?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(Self::api(status, &body));
        }

        let rows = body.as_array().ok_or_else(|| UpstreamError::Shape {
            service: SERVICE,
            message: "rights query did not return an array".into(),
        })?;

        Ok(rows.iter().any(|row| {
            row["status"].as_str() == Some("active") && row["revoked_at"].is_null()
        }))
    }

    async fn grant_right(
        &self,
        user_id: &str,
        product_key: &str,
    ) -> Result<RightRow, UpstreamError> {
        // Upsert: reactivates a previously revoked right. Needs a unique
        // constraint on (user_id, product) server-side.
        let resp = self
            .http
            .post(self.rights_url())
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&json!([{
                "user_id": user_id,
                "product": product_key,
                "status": "active",
                "revoked_at": null,
            }]))
            .send()
            .await
            .map_err(Self::transport)?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(Self::api(status, &body));
        }

        let row = body
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| UpstreamError::Shape {
                service: SERVICE,
                message: "upsert returned no representation".into(),
            })?;

        Ok(RightRow {
            user_id: row["user_id"].as_str().unwrap_or(user_id).to_string(),
            product: row["product"].as_str().unwrap_or(product_key).to_string(),
            status: row["status"].as_str().unwrap_or("active").to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
