//! Interlock and cascade engine for a linear material-handling line.
//!
//! The [`state_machine::Engine`] owns the line: unit modes, countdown
//! timers, group mode and run flags. A presentation layer reads
//! [`state_machine::Snapshot`]s and sends operator commands; an external
//! clock calls `tick` once per second. [`driver::LineDriver`] is a ready
//! made tokio loop doing exactly that.

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod state_machine;
pub mod topology;
pub mod ui;

pub use error::{LinhaError, Rejection};
