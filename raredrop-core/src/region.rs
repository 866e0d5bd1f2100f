//! Region classification of raw country codes.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Coarse server partition derived from an object's `Country` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Region {
    Cn,
    Eu,
    Other(i32),
}

impl Region {
    /// Country codes 0 and 3 are Chinese, 1 is European, everything else is `R{code}`.
    pub fn classify(country: i32) -> Self {
        match country {
            0 | 3 => Region::Cn,
            1 => Region::Eu,
            other => Region::Other(other),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Cn => f.write_str("CN"),
            Region::Eu => f.write_str("EU"),
            Region::Other(code) => write!(f, "R{}", code),
        }
    }
}

impl FromStr for Region {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CN" => Ok(Region::Cn),
            "EU" => Ok(Region::Eu),
            _ => s
                .strip_prefix('R')
                .and_then(|code| code.parse().ok())
                .map(Region::Other)
                .ok_or(()),
        }
    }
}
