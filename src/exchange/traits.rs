use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{OrderOutcome, OrderSide};
use crate::error::{RelayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Bybit,
    Bitget,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bybit => "bybit",
            Self::Bitget => "bitget",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bybit" => Ok(Self::Bybit),
            "bitget" => Ok(Self::Bitget),
            _ => Err("invalid exchange; expected bybit|bitget"),
        }
    }
}

pub fn parse_exchange_kind(raw: &str) -> Result<ExchangeKind> {
    ExchangeKind::from_str(raw).map_err(|e| RelayError::Validation(e.to_string()))
}

/// One derivatives exchange seen through the relay's two operations.
///
/// Every call signs with a fresh timestamp; implementations that need a
/// client order id generate a new one per call so exchange-side
/// de-duplication cannot swallow a retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Submit a reduce-only market order closing existing exposure.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderOutcome>;

    /// Signed read of live position state. An exchange-specific "no
    /// position" answer maps to `Ok(false)`, not to an error.
    async fn query_position_open(&self, symbol: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exchange_kind_accepts_both_exchanges() {
        assert_eq!(
            parse_exchange_kind("bybit").expect("bybit should parse"),
            ExchangeKind::Bybit
        );
        assert_eq!(
            parse_exchange_kind(" Bitget ").expect("bitget should parse"),
            ExchangeKind::Bitget
        );
    }

    #[test]
    fn parse_exchange_kind_rejects_unknown_value() {
        assert!(parse_exchange_kind("binance").is_err());
    }
}
