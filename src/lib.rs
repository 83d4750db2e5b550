pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod services;
pub mod signing;

pub use adapters::{BitgetClient, BybitClient, TelegramNotifier};
pub use api::{create_router, AppState};
pub use config::AppConfig;
pub use domain::{
    CloseReport, CloseResolution, NotificationEvent, OrderIntent, OrderOutcome, OrderSide,
    OutcomeClass,
};
pub use error::{RelayError, Result};
pub use exchange::{build_adapter_registry, ExchangeAdapter, ExchangeKind};
pub use services::{NotificationSink, NullSink, PositionCloser, PositionVerifier};
