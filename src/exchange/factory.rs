use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::adapters::{BitgetClient, BybitClient};
use crate::config::{AppConfig, BitgetConfig, BybitConfig};
use crate::error::{RelayError, Result};

use super::{ExchangeAdapter, ExchangeKind};

fn bybit_config_from_env() -> Option<BybitConfig> {
    let api_key = std::env::var("BYBIT_API_KEY").ok()?;
    let api_secret = std::env::var("BYBIT_API_SECRET").ok()?;
    Some(BybitConfig {
        rest_url: std::env::var("BYBIT_REST_URL")
            .unwrap_or_else(|_| "https://api.bybit.com".to_string()),
        api_key,
        api_secret,
        recv_window_ms: 5000,
    })
}

fn bitget_config_from_env() -> Option<BitgetConfig> {
    let api_key = std::env::var("BITGET_API_KEY").ok()?;
    let api_secret = std::env::var("BITGET_API_SECRET").ok()?;
    let passphrase = std::env::var("BITGET_PASSPHRASE").ok()?;
    Some(BitgetConfig {
        rest_url: std::env::var("BITGET_REST_URL")
            .unwrap_or_else(|_| "https://api.bitget.com".to_string()),
        api_key,
        api_secret,
        passphrase,
    })
}

/// Build the runtime adapter registry from `AppConfig`, selected once at
/// the boundary and shared read-only by every webhook invocation.
///
/// Config-file credentials win; environment variables fill in an exchange
/// the file leaves out entirely.
pub fn build_adapter_registry(
    app_config: &AppConfig,
) -> Result<HashMap<ExchangeKind, Arc<dyn ExchangeAdapter>>> {
    let mut registry: HashMap<ExchangeKind, Arc<dyn ExchangeAdapter>> = HashMap::new();

    let bybit = app_config.bybit.clone().or_else(bybit_config_from_env);
    if let Some(cfg) = bybit {
        let client = BybitClient::new(&cfg)?;
        registry.insert(ExchangeKind::Bybit, Arc::new(client));
        info!(exchange = "bybit", "exchange adapter registered");
    }

    let bitget = app_config.bitget.clone().or_else(bitget_config_from_env);
    if let Some(cfg) = bitget {
        let client = BitgetClient::new(&cfg)?;
        registry.insert(ExchangeKind::Bitget, Arc::new(client));
        info!(exchange = "bitget", "exchange adapter registered");
    }

    if registry.is_empty() {
        return Err(RelayError::Validation(
            "no exchange credentials configured; set [bybit] or [bitget] in config or the \
             BYBIT_*/BITGET_* environment variables"
                .to_string(),
        ));
    }

    Ok(registry)
}
