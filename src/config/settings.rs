use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "One-shot text transfer over a named pipe")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Wait for a writer and print the payload it sends
    Read {
        /// Path of the named pipe (created if missing)
        path: PathBuf,
    },
    /// Send one payload to the next reader of the named pipe
    Write {
        /// Path of the named pipe (created if missing)
        path: PathBuf,

        /// Payload to send; read from stdin when omitted
        data: Option<String>,

        /// Give up after this many seconds (negative waits forever)
        #[arg(short, long, allow_negative_numbers = true)]
        timeout: Option<f64>,
    },
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Default write timeout in seconds; negative waits forever
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: f64,

    /// Permission bits for newly created named pipes (before umask)
    #[serde(default = "default_fifo_permissions")]
    pub fifo_permissions: u32,
}

fn default_write_timeout() -> f64 {
    -1.0
}

fn default_fifo_permissions() -> u32 {
    fifochan_core::DEFAULT_PERMISSIONS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            write_timeout_secs: default_write_timeout(),
            fifo_permissions: default_fifo_permissions(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::load_file(p);
            }
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("fifochan/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/fifochan/config.toml")),
            dirs::home_dir().map(|p| p.join(".fifochan.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::load_file(path);
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Command::Write {
            timeout: Some(timeout),
            ..
        } = &cli.command
        {
            self.write_timeout_secs = *timeout;
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        if self.write_timeout_secs.is_nan() {
            self.write_timeout_secs = default_write_timeout();
        }
        self.fifo_permissions &= 0o777;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.write_timeout_secs, -1.0);
        assert_eq!(settings.fifo_permissions, 0o666);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            write_timeout_secs = 2.5
            fifo_permissions = 0o600
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.write_timeout_secs, 2.5);
        assert_eq!(settings.fifo_permissions, 0o600);
    }

    #[test]
    fn test_parse_empty_toml_uses_defaults() {
        let settings: Settings = toml::from_str("").expect("Should parse TOML");
        assert_eq!(settings.write_timeout_secs, -1.0);
        assert_eq!(settings.fifo_permissions, 0o666);
    }

    #[test]
    fn test_load_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "write_timeout_secs = 3\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.write_timeout_secs, 3.0);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "write_timeout_secs = \"soon\"\n").unwrap();

        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_merge_cli_timeout() {
        let cli = Config::parse_from(["fifochan", "write", "/tmp/p", "hi", "-t", "-1"]);
        let mut settings = Settings {
            write_timeout_secs: 5.0,
            ..Settings::default()
        };
        settings.merge_cli(&cli);
        assert_eq!(settings.write_timeout_secs, -1.0);
    }

    #[test]
    fn test_merge_cli_without_timeout_keeps_setting() {
        let cli = Config::parse_from(["fifochan", "write", "/tmp/p"]);
        let mut settings = Settings {
            write_timeout_secs: 5.0,
            ..Settings::default()
        };
        settings.merge_cli(&cli);
        assert_eq!(settings.write_timeout_secs, 5.0);
    }

    #[test]
    fn test_validate() {
        let mut settings = Settings {
            write_timeout_secs: f64::NAN,
            fifo_permissions: 0o100644,
        };
        settings.validate();
        assert_eq!(settings.write_timeout_secs, -1.0);
        assert_eq!(settings.fifo_permissions, 0o644);
    }
}
