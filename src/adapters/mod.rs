pub mod bitget_rest;
pub mod bybit_rest;
pub mod telegram;

pub use bitget_rest::BitgetClient;
pub use bybit_rest::BybitClient;
pub use telegram::TelegramNotifier;
