//! Execution of CLI subcommands against a named pipe

use anyhow::{Context, Result};
use std::io::{Read, Write};

use fifochan_core::{timeout_from_secs, Direction, PipeChannel, PipeError};

use crate::config::{Command, Settings};

/// Run one subcommand
///
/// `input` supplies the payload for `write` when none is given on the
/// command line; `output` receives the payload for `read`.
pub fn run(
    command: &Command,
    settings: &Settings,
    input: &mut dyn Read,
    output: &mut dyn Write,
) -> Result<()> {
    match command {
        Command::Read { path } => {
            let channel =
                PipeChannel::with_permissions(path, Direction::Read, settings.fifo_permissions)
                    .with_context(|| format!("Failed to open named pipe: {:?}", path))?;

            let payload = channel
                .read_bytes()
                .with_context(|| format!("Failed to read from named pipe: {:?}", path))?;

            output.write_all(&payload)?;
            output.flush()?;
        }
        Command::Write { path, data, .. } => {
            let channel =
                PipeChannel::with_permissions(path, Direction::Write, settings.fifo_permissions)
                    .with_context(|| format!("Failed to open named pipe: {:?}", path))?;

            let payload = match data {
                Some(text) => text.clone().into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    input
                        .read_to_end(&mut buf)
                        .context("Failed to read payload from stdin")?;
                    buf
                }
            };

            let timeout = timeout_from_secs(settings.write_timeout_secs);
            tracing::debug!(
                "Writing {} bytes to {:?} (timeout: {:?})",
                payload.len(),
                path,
                timeout
            );

            channel
                .write_bytes(&payload, timeout)
                .with_context(|| format!("Failed to write to named pipe: {:?}", path))?;
        }
    }

    Ok(())
}

/// Whether an error chain ends in a write timeout
pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.downcast_ref::<PipeError>()
        .is_some_and(PipeError::is_timeout)
}
