//! # Daybell
//!
//! An event-driven school-day progress engine for Rust.
//!
//! Daybell turns a fixed timetable of lessons into phases and segments, and
//! answers "how far along are we?" for the current segment, phase, day, week,
//! term and school year. It is designed to be a library that a presentation
//! layer drives, without knowing anything about how the result is rendered.
//!
//! ## Core Concepts
//!
//! - **Schedule**: Lessons the user has not excluded are grouped into phases
//!   wherever the gap between them is small, then cut into lesson and break
//!   segments.
//! - **VirtualClock**: Real time with developer adjustments layered on top:
//!   jumps, speed multipliers and a time loop that replays the school day.
//! - **Event-Driven**: On every tick the engine evaluates every scope and
//!   publishes a `ProgressEvent`. Segment and phase transitions ring a
//!   `BellEvent`.
//! - **Configuration-Driven**: The timetable, calendar, timezone and stored
//!   settings are loaded at startup into a `DaybellConfig`, often from a file.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use daybell::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a default configuration.
//!     let config = DaybellConfig::default();
//!
//!     // 2. Create the engine.
//!     let engine = DaybellEngine::new(config)?;
//!
//!     // 3. Subscribe to an event stream before starting the engine.
//!     let mut bells = engine.subscribe_bell_events();
//!     tokio::spawn(async move {
//!         while let Ok(bell) = bells.recv().await {
//!             println!("Bell: {:?}", bell);
//!         }
//!     });
//!
//!     // 4. Register listeners.
//!     let _listener_id = engine
//!         .on_conditional(
//!             |progress| progress.day.percent() >= 50.0,
//!             |_| println!("Halfway through the day!"),
//!             true,
//!         )
//!         .await;
//!
//!     // 5. Run the engine. It will shut down on Ctrl+C.
//!     engine.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Daybell";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod progress;
pub mod schedule;
pub mod segment;
pub mod time;

/// A prelude module for easy importing of the most common Daybell types.
pub mod prelude {
    pub use crate::common::{LessonId, ListenerId, MinuteOfDay, Scope};
    pub use crate::config::{ClockResolution, DaybellConfig, Settings};
    pub use crate::engine::DaybellEngine;
    pub use crate::error::DaybellError;
    pub use crate::events::{BellEvent, Command, ConditionalEvent, ProgressEvent, SystemEvent};
    pub use crate::progress::{Progress, ScopeWindow};
    pub use crate::schedule::Lesson;
    pub use crate::segment::{Schedule, SegmentKind, TimeSegment};
}
