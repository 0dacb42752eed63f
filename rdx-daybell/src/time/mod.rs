//! Time sources, the virtual clock and the tick driver.
//!
//! - [`TimeSource`] yields real wall-clock milliseconds; tests swap in a
//!   [`ManualTimeSource`].
//! - [`VirtualClock`] layers jumps, speed multipliers and time loops on top of
//!   a source.
//! - [`SystemTicker`] is the periodic task that drives re-evaluation.

mod clock;
mod source;
mod ticker;

pub use clock::{LoopState, VirtualClock, MIN_LOOP_DURATION_SECS};
pub use source::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use ticker::{SystemTicker, TickEvent};
