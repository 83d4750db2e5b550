use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::ExchangeKind;

/// Direction of the closing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// Bybit v5 wants capitalized sides
    pub fn as_capitalized(&self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            _ => Err("invalid side; expected buy|sell"),
        }
    }
}

/// A validated close request. Immutable once built at the webhook boundary;
/// the shared key never travels past that boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub exchange: ExchangeKind,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
}

/// How an exchange answered a close attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    /// The exchange's own success marker was present in the body
    Filled,
    /// Network trouble, 5xx, rate limit, or "position not found" mid-close
    Transient,
    /// A well-formed rejection that will not heal on retry
    Rejected,
}

/// Normalized exchange response for one close attempt.
///
/// `Filled` requires the exchange-specific success code embedded in the
/// body; HTTP 200 alone is never sufficient.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub http_status: u16,
    pub raw_body: String,
    pub class: OutcomeClass,
}

impl OrderOutcome {
    pub fn is_filled(&self) -> bool {
        self.class == OutcomeClass::Filled
    }
}

/// Operator-facing message emitted by the retry loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    pub subject: String,
    pub body: String,
    /// Attempt count that triggered this event, when attempt-bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_attempt: Option<u64>,
}

/// Terminal state of one retry-loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseResolution {
    /// Position verified closed or close order accepted
    Confirmed,
    /// Consecutive rejections or a configured cap ended the loop
    GaveUp,
    /// Shutdown was requested mid-loop
    Cancelled,
}

/// Outcome report handed back to the caller when the loop terminates
#[derive(Debug, Clone)]
pub struct CloseReport {
    pub intent: OrderIntent,
    pub resolution: CloseResolution,
    pub attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("BUY".parse::<OrderSide>().expect("should parse"), OrderSide::Buy);
        assert_eq!("sell".parse::<OrderSide>().expect("should parse"), OrderSide::Sell);
        assert!("hold".parse::<OrderSide>().is_err());
    }

    #[test]
    fn side_formats_per_exchange() {
        assert_eq!(OrderSide::Buy.as_capitalized(), "Buy");
        assert_eq!(OrderSide::Sell.as_str(), "sell");
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
    }
}
