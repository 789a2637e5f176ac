pub mod clock;
pub mod errors;

pub type Result<T, E = errors::WithBacktrace> = core::result::Result<T, E>;

pub use clock::{Clock, ManualClock, SystemClock};
