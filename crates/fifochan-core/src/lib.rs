//! Core library for fifochan
//!
//! Exchanges exactly one text payload between two processes over a named
//! pipe. See [`PipeChannel`] for the read and write semantics.

pub mod error;
pub mod fifo;

pub use error::{PipeError, Result};
pub use fifo::{timeout_from_secs, Direction, PipeChannel, DEFAULT_PERMISSIONS};
