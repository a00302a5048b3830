//! pcr-ics-core library.
//!
//! Turns a snapshot of the game database into a versioned iCalendar artifact.
//!
//! # Conventions
//!
//! - **Errors**: every failure type is a `thiserror` enum exposing
//!   `code()` -> [`error::ErrorCode`].
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).
//! - **Time**: all instants are `DateTime<Utc>` with whole-second precision;
//!   local wall times only exist at the adapter and config boundary.

pub mod clamp;
pub mod config;
pub mod error;
pub mod ics;
pub mod identity;
pub mod lock;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod snapshot;
pub mod source;
