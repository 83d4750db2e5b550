use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::exchange::{ExchangeAdapter, ExchangeKind};
use crate::services::NotificationSink;

/// Shared application state for webhook handlers.
///
/// Everything here is read-only after startup; concurrent webhook
/// invocations share nothing else.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration built once at startup
    pub config: Arc<AppConfig>,

    /// Adapter registry keyed by exchange identifier, selected once at the
    /// boundary
    pub adapters: HashMap<ExchangeKind, Arc<dyn ExchangeAdapter>>,

    /// Operator notification channel
    pub notifier: Arc<dyn NotificationSink>,

    /// Flips on SIGINT/SIGTERM; observed by every retry-loop iteration
    pub shutdown: watch::Receiver<bool>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        adapters: HashMap<ExchangeKind, Arc<dyn ExchangeAdapter>>,
        notifier: Arc<dyn NotificationSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            adapters,
            notifier,
            shutdown,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.start_time).num_seconds().max(0) as u64
    }
}
