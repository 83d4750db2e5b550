pub mod factory;
pub mod traits;

pub use factory::build_adapter_registry;
pub use traits::{parse_exchange_kind, ExchangeAdapter, ExchangeKind};

#[cfg(test)]
pub use traits::MockExchangeAdapter;
