use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::state::AppState;
use crate::domain::{OrderIntent, OrderSide};
use crate::error::{RelayError, Result};
use crate::exchange::parse_exchange_kind;
use crate::services::PositionCloser;

/// Inbound alert payload. The shared key is consumed here and never
/// forwarded into the core.
#[derive(Debug, Deserialize)]
pub struct WebhookAlert {
    pub key: String,
    pub exchange: String,
    pub symbol: String,
    pub qty: String,
    pub side: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

fn validate_alert(alert: &WebhookAlert) -> Result<OrderIntent> {
    let exchange = parse_exchange_kind(&alert.exchange)?;

    let side: OrderSide = alert
        .side
        .parse()
        .map_err(|e: &str| RelayError::Validation(e.to_string()))?;

    let symbol = alert.symbol.trim();
    if symbol.is_empty() {
        return Err(RelayError::Validation("symbol must not be empty".to_string()));
    }

    let quantity = Decimal::from_str_exact(alert.qty.trim())
        .map_err(|e| RelayError::Validation(format!("invalid qty: {}", e)))?;
    if quantity <= Decimal::ZERO {
        return Err(RelayError::Validation("qty must be positive".to_string()));
    }

    Ok(OrderIntent {
        exchange,
        symbol: symbol.to_string(),
        side,
        quantity,
    })
}

/// POST /webhook -- authenticate the alert, validate it, dispatch the
/// close loop onto a background task, and answer immediately.
pub async fn webhook_handler(
    State(state): State<AppState>,
    body: String,
) -> (StatusCode, Json<Value>) {
    let alert: WebhookAlert = match serde_json::from_str(&body) {
        Ok(alert) => alert,
        Err(e) => {
            warn!(error = %e, "alert refused: malformed payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": "invalid payload"})),
            );
        }
    };

    if alert.key != state.config.server.webhook_key {
        warn!("alert refused: wrong key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Unauthorized"})),
        );
    }

    let intent = match validate_alert(&alert) {
        Ok(intent) => intent,
        Err(e) => {
            warn!(error = %e, "alert refused: validation failed");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": e.to_string()})),
            );
        }
    };

    let Some(adapter) = state.adapters.get(&intent.exchange) else {
        warn!(exchange = %intent.exchange, "alert refused: exchange not configured");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": format!("exchange '{}' is not configured", intent.exchange)})),
        );
    };

    info!(
        exchange = %intent.exchange,
        symbol = %intent.symbol,
        side = %intent.side,
        qty = %intent.quantity,
        "alert accepted; dispatching close loop"
    );

    let closer = PositionCloser::new(
        adapter.clone(),
        state.notifier.clone(),
        state.config.retry.clone(),
        state.shutdown.clone(),
    );
    tokio::spawn(async move {
        let report = closer.run(intent).await;
        info!(
            exchange = %report.intent.exchange,
            symbol = %report.intent.symbol,
            resolution = ?report.resolution,
            attempts = report.attempts,
            "close loop finished"
        );
    });

    (
        StatusCode::OK,
        Json(json!({"message": "Webhook received successfully"})),
    )
}

/// GET /health -- lightweight liveness probe
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn alert(key: &str, exchange: &str, symbol: &str, qty: &str, side: &str) -> WebhookAlert {
        WebhookAlert {
            key: key.to_string(),
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            qty: qty.to_string(),
            side: side.to_string(),
        }
    }

    #[test]
    fn validate_builds_intent_from_well_formed_alert() {
        let intent = validate_alert(&alert("k", "bybit", "BTCUSDT", "0.5", "sell"))
            .expect("alert should validate");
        assert_eq!(intent.symbol, "BTCUSDT");
        assert_eq!(intent.side, OrderSide::Sell);
        assert_eq!(intent.quantity, dec!(0.5));
    }

    #[test]
    fn validate_rejects_unknown_exchange() {
        assert!(validate_alert(&alert("k", "binance", "BTCUSDT", "1", "buy")).is_err());
    }

    #[test]
    fn validate_rejects_bad_side_qty_and_symbol() {
        assert!(validate_alert(&alert("k", "bybit", "BTCUSDT", "1", "hold")).is_err());
        assert!(validate_alert(&alert("k", "bybit", "BTCUSDT", "ten", "buy")).is_err());
        assert!(validate_alert(&alert("k", "bybit", "BTCUSDT", "-1", "buy")).is_err());
        assert!(validate_alert(&alert("k", "bybit", "  ", "1", "buy")).is_err());
    }
}
