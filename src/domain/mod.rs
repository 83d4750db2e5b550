pub mod order;

pub use order::{
    CloseReport, CloseResolution, NotificationEvent, OrderIntent, OrderOutcome, OrderSide,
    OutcomeClass,
};
