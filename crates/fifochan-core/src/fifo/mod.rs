//! Named pipe (FIFO) channel
//!
//! A channel owns one FIFO path and one direction. Reads block until a
//! writer has opened and closed the pipe; writes run in a killable worker
//! process so they can be bounded by a wall-clock timeout.

mod channel;
mod direction;
mod worker;

pub use channel::{timeout_from_secs, PipeChannel, DEFAULT_PERMISSIONS};
pub use direction::Direction;
