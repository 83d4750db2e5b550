pub mod closer;
pub mod notify;
pub mod verify;

pub use closer::PositionCloser;
pub use notify::{NotificationSink, NullSink};
pub use verify::PositionVerifier;
