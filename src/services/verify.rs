use std::sync::Arc;

use tracing::warn;

use crate::exchange::ExchangeAdapter;

/// Checks live position state before each close attempt.
///
/// Fails open: when the adapter cannot answer, the position is reported as
/// still open and the loop keeps retrying. Retries are reduce-only and
/// safe; declaring a position closed on bad data is not.
pub struct PositionVerifier {
    adapter: Arc<dyn ExchangeAdapter>,
}

impl PositionVerifier {
    pub fn new(adapter: Arc<dyn ExchangeAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn is_open(&self, symbol: &str) -> bool {
        match self.adapter.query_position_open(symbol).await {
            Ok(open) => open,
            Err(e) => {
                warn!(symbol, error = %e, "position check failed; assuming still open");
                true
            }
        }
    }
}
