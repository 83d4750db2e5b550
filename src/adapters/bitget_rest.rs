//! Bitget v2 mix (USDT-futures) REST adapter.
//!
//! Signs with the base64 HMAC scheme over `timestamp ∥ METHOD ∥ path ∥
//! body`. POST bodies are compact JSON with keys sorted; GET requests carry
//! a sorted query string on the signed path. Success is `code == "00000"`
//! in the response body.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::BitgetConfig;
use crate::domain::{OrderOutcome, OrderSide, OutcomeClass};
use crate::error::{RelayError, Result};
use crate::exchange::{ExchangeAdapter, ExchangeKind};
use crate::signing::{next_timestamp_ms, BitgetSigner};

const PLACE_ORDER_PATH: &str = "/api/v2/mix/order/place-order";
const SINGLE_POSITION_PATH: &str = "/api/v2/mix/position/single-position";

const SUCCESS_CODE: &str = "00000";

/// "No position to close" — the market already matches intent, so a close
/// attempt that lands on it is transient: the next verification pass exits
/// the loop.
const NO_POSITION_CODE: &str = "22002";

/// Codes that will not heal on retry: credential, signature, passphrase
/// and parameter errors.
const PERMANENT_CODES: &[&str] = &["40001", "40002", "40006", "40009", "40012", "40034"];

#[derive(Clone)]
pub struct BitgetClient {
    http: Client,
    base_url: String,
    signer: BitgetSigner,
}

impl BitgetClient {
    pub fn new(cfg: &BitgetConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("tvrelay-bitget-adapter/0.1")
            .build()
            .map_err(|e| {
                RelayError::Internal(format!("failed to build Bitget HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: cfg.rest_url.trim_end_matches('/').to_string(),
            signer: BitgetSigner::new(
                cfg.api_key.clone(),
                cfg.api_secret.clone(),
                cfg.passphrase.clone(),
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
        match parsed.get("code").and_then(Value::as_str) {
            Some(SUCCESS_CODE) if status.is_success() => OutcomeClass::Filled,
            Some(NO_POSITION_CODE) => OutcomeClass::Transient,
            Some(code) if PERMANENT_CODES.contains(&code) => OutcomeClass::Rejected,
            _ => OutcomeClass::Transient,
        }
    }

    fn position_entry_open(entry: &Value) -> bool {
        ["total", "available"].iter().any(|key| {
            entry
                .get(*key)
                .and_then(Value::as_str)
                .and_then(|s| Decimal::from_str_exact(s.trim()).ok())
                .is_some_and(|size| size > Decimal::ZERO)
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BitgetClient {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Bitget
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderOutcome> {
        // A fresh clientOid per attempt keeps exchange-side idempotent
        // de-duplication from swallowing a retry. serde_json orders object
        // keys lexicographically; this string is both the signed payload
        // and the transmitted body.
        let body = serde_json::json!({
            "symbol": symbol,
            "marginCoin": "USDT",
            "marginMode": "isolated",
            "side": side.as_str(),
            "orderType": "market",
            "size": quantity.to_string(),
            "productType": "USDT-FUTURES",
            "reduceOnly": "YES",
            "tradeSide": "close",
            "clientOid": Uuid::new_v4().to_string(),
        })
        .to_string();

        let timestamp = next_timestamp_ms();
        let headers = self
            .signer
            .headers(timestamp, "POST", PLACE_ORDER_PATH, &body)?;

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, PLACE_ORDER_PATH))
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let raw_body = resp.text().await?;
        debug!(%status, body = %raw_body, "bitget order response");

        Ok(OrderOutcome {
            http_status: status.as_u16(),
            class: Self::classify(status, &raw_body),
            raw_body,
        })
    }

    async fn query_position_open(&self, symbol: &str) -> Result<bool> {
        // Keys sorted lexicographically; the signed path and the request
        // path must be byte-identical.
        let query = format!(
            "marginCoin=USDT&productType=USDT-FUTURES&symbol={}",
            symbol
        );
        let request_path = format!("{}?{}", SINGLE_POSITION_PATH, query);

        let timestamp = next_timestamp_ms();
        let headers = self.signer.headers(timestamp, "GET", &request_path, "")?;

        let resp = self
            .http
            .get(format!("{}{}", self.base_url, request_path))
            .headers(headers)
            .send()
            .await?;

        let status = resp.status();
        let raw_body = resp.text().await?;

        let parsed: Value = serde_json::from_str(&raw_body).map_err(|_| {
            RelayError::MalformedResponse(format!(
                "bitget position query returned non-JSON: status={} body={}",
                status, raw_body
            ))
        })?;

        match parsed.get("code").and_then(Value::as_str) {
            Some(SUCCESS_CODE) => {
                let open = parsed
                    .get("data")
                    .and_then(Value::as_array)
                    .is_some_and(|list| list.iter().any(Self::position_entry_open));
                Ok(open)
            }
            // "No position" is an answer, not a failure.
            Some(NO_POSITION_CODE) => Ok(false),
            other => Err(RelayError::MalformedResponse(format!(
                "bitget position query code={:?} body={}",
                other, raw_body
            ))),
        }
    }
}
