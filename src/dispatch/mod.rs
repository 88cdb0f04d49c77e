pub mod dispatcher;
pub mod progress;

pub use dispatcher::{DeliverySink, Dispatcher, SETTLE_DELAY};
pub use progress::{DispatchConfig, DispatchOutcome, Progress, StopReason};
