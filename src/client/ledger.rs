//! Ledger capability and the signing-gateway adapter.
//!
//! The pipeline only talks to `dyn Ledger`. `GatewayLedger` forwards calls as
//! JSON to an HTTP gateway that holds the signing key and submits extrinsics;
//! it does not retry, so a failed submission surfaces to the caller as-is.

use crate::checkpoint::BatchKind;
use crate::models::{ConfigError, GiftdropError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;
use tracing::{debug, info};

/// One call inside a batched submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum LedgerCall {
    /// Mint `instance_id` of `class_id` to `owner`
    Mint {
        class_id: String,
        instance_id: u64,
        owner: String,
    },
    /// Point an instance at its metadata document
    SetMetadata {
        class_id: String,
        instance_id: u64,
        cid: String,
    },
    /// Transfer `amount` base units to `dest`
    Transfer {
        dest: String,
        #[serde(serialize_with = "amount_as_string")]
        amount: u128,
    },
}

fn amount_as_string<S: Serializer>(
    amount: &u128,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&amount.to_string())
}

/// Operations the workflow needs from the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether a class with this id already exists.
    async fn class_exists(&self, class_id: &str) -> Result<bool>;

    /// Create a class owned by the gateway account.
    async fn create_class(&self, class_id: &str, dry_run: bool) -> Result<()>;

    /// Set the class metadata CID.
    async fn set_class_metadata(&self, class_id: &str, cid: &str, dry_run: bool) -> Result<()>;

    /// Smallest balance an account may hold, in base units.
    async fn minimum_deposit(&self) -> Result<u128>;

    /// Submit `calls` as one batch; succeeds only when every call did.
    async fn submit_batch(
        &self,
        kind: BatchKind,
        calls: &[LedgerCall],
        dry_run: bool,
    ) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateClassRequest<'a> {
    class_id: &'a str,
    dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetMetadataRequest<'a> {
    cid: &'a str,
    dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    kind: BatchKind,
    calls: &'a [LedgerCall],
    dry_run: bool,
}

/// Gateway reply to a submission.
#[derive(Debug, Deserialize)]
struct SubmissionResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConstantResponse {
    value: serde_json::Value,
}

/// JSON-over-HTTP client for a ledger signing gateway.
pub struct GatewayLedger {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GatewayLedger {
    /// Create a new gateway client.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GiftdropError::Internal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                ConfigError::Invalid {
                    field: "network.apiKey".to_string(),
                    reason: "not a valid HTTP header value".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn submit<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        path: &str,
        body: &T,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| GiftdropError::external(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GiftdropError::external(
                operation,
                format!("gateway returned {status}: {text}"),
            ));
        }

        let reply: SubmissionResponse = response
            .json()
            .await
            .map_err(|e| {
                GiftdropError::external(operation, format!("invalid gateway reply: {e}"))
            })?;

        if !reply.success {
            return Err(GiftdropError::external(
                operation,
                reply.error.unwrap_or_else(|| "rejected by ledger".to_string()),
            ));
        }

        debug!(operation, hash = ?reply.hash, "Submission included");
        Ok(())
    }
}

#[async_trait]
impl Ledger for GatewayLedger {
    async fn class_exists(&self, class_id: &str) -> Result<bool> {
        let operation = "Class lookup";
        let url = format!("{}/classes/{}", self.base_url, class_id);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| GiftdropError::external(operation, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(GiftdropError::external(
                operation,
                format!("gateway returned {status}"),
            )),
        }
    }

    async fn create_class(&self, class_id: &str, dry_run: bool) -> Result<()> {
        info!(class_id, dry_run, "Creating class");
        self.submit(
            "Class creation",
            "/classes",
            &CreateClassRequest { class_id, dry_run },
        )
        .await
    }

    async fn set_class_metadata(&self, class_id: &str, cid: &str, dry_run: bool) -> Result<()> {
        info!(class_id, cid, dry_run, "Setting class metadata");
        self.submit(
            "Class metadata",
            &format!("/classes/{class_id}/metadata"),
            &SetMetadataRequest { cid, dry_run },
        )
        .await
    }

    async fn minimum_deposit(&self) -> Result<u128> {
        let operation = "Minimum deposit query";
        let url = format!("{}/constants/minimum-deposit", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| GiftdropError::external(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GiftdropError::external(
                operation,
                format!("gateway returned {status}"),
            ));
        }

        let body: ConstantResponse = response
            .json()
            .await
            .map_err(|e| GiftdropError::external(operation, format!("invalid reply: {e}")))?;

        parse_units(&body.value).ok_or_else(|| {
            GiftdropError::external(operation, format!("not an amount: {}", body.value))
        })
    }

    async fn submit_batch(
        &self,
        kind: BatchKind,
        calls: &[LedgerCall],
        dry_run: bool,
    ) -> Result<()> {
        debug!(%kind, calls = calls.len(), dry_run, "Submitting batch");
        self.submit(
            &format!("Submitting {kind} batch"),
            "/batches",
            &BatchRequest {
                kind,
                calls,
                dry_run,
            },
        )
        .await
    }
}

/// Accept amounts as JSON strings or integers.
fn parse_units(value: &serde_json::Value) -> Option<u128> {
    match value {
        serde_json::Value::String(s) => s.trim().parse().ok(),
        serde_json::Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_serialization() {
        let call = LedgerCall::Transfer {
            dest: "0xabc".to_string(),
            amount: 340_282_366_920_938_463_463_374_607_431_768_211_455,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["call"], "transfer");
        assert_eq!(json["amount"], "340282366920938463463374607431768211455");

        let call = LedgerCall::Mint {
            class_id: "3".to_string(),
            instance_id: 9,
            owner: "0xdef".to_string(),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["call"], "mint");
        assert_eq!(json["instance_id"], 9);
    }

    #[test]
    fn test_batch_request_shape() {
        let calls = vec![LedgerCall::SetMetadata {
            class_id: "1".to_string(),
            instance_id: 0,
            cid: "bafy".to_string(),
        }];
        let json = serde_json::to_value(BatchRequest {
            kind: BatchKind::Metadata,
            calls: &calls,
            dry_run: true,
        })
        .unwrap();
        assert_eq!(json["kind"], "metadata");
        assert_eq!(json["dryRun"], true);
        assert_eq!(json["calls"][0]["call"], "set_metadata");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_units(&serde_json::json!("1000")), Some(1000));
        assert_eq!(parse_units(&serde_json::json!(42)), Some(42));
        assert_eq!(parse_units(&serde_json::json!(-1)), None);
        assert_eq!(parse_units(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let ledger = GatewayLedger::new("http://localhost:8080/", None, 5).unwrap();
        assert_eq!(ledger.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_api_key_becomes_bearer_header() {
        let ledger = GatewayLedger::new("http://localhost", Some("k3y".to_string()), 5).unwrap();
        let headers = ledger.headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer k3y");

        let anonymous = GatewayLedger::new("http://localhost", None, 5).unwrap();
        assert!(anonymous.headers().unwrap().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_unusable_api_key_is_config_error() {
        let ledger =
            GatewayLedger::new("http://localhost", Some("bad\nkey".to_string()), 5).unwrap();
        assert!(matches!(ledger.headers(), Err(GiftdropError::Config(_))));
    }
}
