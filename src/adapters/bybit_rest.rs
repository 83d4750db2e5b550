//! Bybit v5 REST adapter.
//!
//! Signs with the hex HMAC scheme: POST bodies are signed as compact JSON,
//! GET requests as their query string. Success is `retCode == 0` in the
//! response body; HTTP 200 alone is not enough.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::config::BybitConfig;
use crate::domain::{OrderOutcome, OrderSide, OutcomeClass};
use crate::error::{RelayError, Result};
use crate::exchange::{ExchangeAdapter, ExchangeKind};
use crate::signing::{next_timestamp_ms, BybitSigner};

const ORDER_CREATE_PATH: &str = "/v5/order/create";
const POSITION_LIST_PATH: &str = "/v5/position/list";

/// retCodes that will not heal on retry: parameter errors and credential
/// or signature mismatches. Everything else non-zero is treated as
/// transient and left to the retry loop.
const PERMANENT_RET_CODES: &[i64] = &[10001, 10003, 10004, 10005];

#[derive(Clone)]
pub struct BybitClient {
    http: Client,
    base_url: String,
    signer: BybitSigner,
}

impl BybitClient {
    pub fn new(cfg: &BybitConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tvrelay-bybit-adapter/0.1")
            .build()
            .map_err(|e| {
                RelayError::Internal(format!("failed to build Bybit HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: cfg.rest_url.trim_end_matches('/').to_string(),
            signer: BybitSigner::new(
                cfg.api_key.clone(),
                cfg.api_secret.clone(),
                cfg.recv_window_ms,
            ),
        })
    }

    fn classify(status: StatusCode, body: &str) -> OutcomeClass {
        if status.is_server_error() || status.as_u16() == 429 {
            return OutcomeClass::Transient;
        }
        let Ok(parsed) = serde_json::from_str::<Value>(body) else {
            return OutcomeClass::Transient;
        };
        match parsed.get("retCode").and_then(Value::as_i64) {
            Some(0) if status.is_success() => OutcomeClass::Filled,
            Some(code) if PERMANENT_RET_CODES.contains(&code) => OutcomeClass::Rejected,
            _ => OutcomeClass::Transient,
        }
    }

    fn position_size_open(entry: &Value) -> bool {
        entry
            .get("size")
            .and_then(Value::as_str)
            .and_then(|s| Decimal::from_str_exact(s.trim()).ok())
            .is_some_and(|size| size > Decimal::ZERO)
    }
}

#[async_trait]
impl ExchangeAdapter for BybitClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bybit
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderOutcome> {
        // serde_json orders object keys lexicographically; the string built
        // here is both the signed payload and the transmitted body.
        let body = serde_json::json!({
            "category": "linear",
            "symbol": symbol,
            "side": side.as_capitalized(),
            "orderType": "Market",
            "qty": quantity.to_string(),
            "timeInForce": "IOC",
            "reduceOnly": true,
        })
        .to_string();

        let timestamp = next_timestamp_ms();
        let headers = self.signer.headers(timestamp, &body)?;

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, ORDER_CREATE_PATH))
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let raw_body = resp.text().await?;
        debug!(%status, body = %raw_body, "bybit order response");

        Ok(OrderOutcome {
            http_status: status.as_u16(),
            class: Self::classify(status, &raw_body),
            raw_body,
        })
    }

    async fn query_position_open(&self, symbol: &str) -> Result<bool> {
        let query = format!("category=linear&symbol={}", symbol);

        let timestamp = next_timestamp_ms();
        let headers = self.signer.headers(timestamp, &query)?;

        let resp = self
            .http
            .get(format!(
                "{}{}?{}",
                self.base_url, POSITION_LIST_PATH, query
            ))
            .headers(headers)
            .send()
            .await?;

        let status = resp.status();
        let raw_body = resp.text().await?;

        if !status.is_success() {
            return Err(RelayError::MalformedResponse(format!(
                "bybit position query failed: status={} body={}",
                status, raw_body
            )));
        }

        let parsed: Value = serde_json::from_str(&raw_body)?;
        match parsed.get("retCode").and_then(Value::as_i64) {
            Some(0) => {
                // No entry, or every entry at size zero, means flat.
                let open = parsed
                    .pointer("/result/list")
                    .and_then(Value::as_array)
                    .is_some_and(|list| list.iter().any(Self::position_size_open));
                Ok(open)
            }
            other => Err(RelayError::MalformedResponse(format!(
                "bybit position query retCode={:?} body={}",
                other, raw_body
            ))),
        }
    }
}
