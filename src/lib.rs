//! fifochan: hand one block of text from one process to another through a
//! named pipe.
//!
//! The channel itself lives in `fifochan-core`; this crate adds the command
//! line front-end and its settings.

pub mod commands;
pub mod config;
