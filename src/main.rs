use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fifochan::commands;
use fifochan::config::{Config, Settings};

/// Exit code when a write gave up waiting for a reader
const EXIT_TIMEOUT: u8 = 2;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if commands::is_timeout(&e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_TIMEOUT)
        }
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Config) -> Result<()> {
    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(cli);
    settings.validate();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    commands::run(&cli.command, &settings, &mut stdin.lock(), &mut stdout.lock())
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("fifochan=debug,fifochan_core=debug")
    } else {
        EnvFilter::new("fifochan=info,fifochan_core=info")
    };

    // stdout carries the payload
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
