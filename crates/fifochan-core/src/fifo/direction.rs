use std::fmt;
use std::str::FromStr;

use crate::error::PipeError;

/// Fixed role of a channel; named pipes are unidirectional per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Read-only end
    Read,
    /// Write-only end
    Write,
}

impl Direction {
    /// Verb phrase used in error messages ("read from" / "write to")
    pub(crate) fn operation(&self) -> &'static str {
        match self {
            Direction::Read => "read from",
            Direction::Write => "write to",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

impl FromStr for Direction {
    type Err = PipeError;

    /// Accepts `r`/`read` and `w`/`write`, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r" | "read" => Ok(Direction::Read),
            "w" | "write" => Ok(Direction::Write),
            _ => Err(PipeError::InvalidDirection {
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepted_modes() {
        assert_eq!("r".parse::<Direction>().unwrap(), Direction::Read);
        assert_eq!("read".parse::<Direction>().unwrap(), Direction::Read);
        assert_eq!("W".parse::<Direction>().unwrap(), Direction::Write);
        assert_eq!("Write".parse::<Direction>().unwrap(), Direction::Write);
    }

    #[test]
    fn test_parse_rejects_unknown_modes() {
        for bad in ["", "rw", "a", "r+", "wr", " r"] {
            match bad.parse::<Direction>() {
                Err(PipeError::InvalidDirection { value }) => assert_eq!(value, bad),
                other => panic!("Expected InvalidDirection for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Direction::Read.to_string(), "read");
        assert_eq!(Direction::Write.to_string(), "write");
    }
}
