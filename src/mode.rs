//! Sampling mode as a typed enum.
//!
//! The lowercase wire strings `cpu`, `wall` and `object` appear inside dump
//! artifact names (`stackprof-cpu-….dump`) and must stay stable — downstream
//! tooling parses them back out of the filename.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A known sampling strategy.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Sample on CPU time consumed. The default.
    #[default]
    Cpu,
    /// Sample on wall-clock time.
    Wall,
    /// Sample on object allocation.
    Object,
}

impl Mode {
    /// Returns the lowercase wire representation (e.g. `"cpu"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu    => "cpu",
            Self::Wall   => "wall",
            Self::Object => "object",
        }
    }
}

/// Parses a lowercase mode string (e.g. `"wall"`). Case-sensitive.
impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu"    => Ok(Self::Cpu),
            "wall"   => Ok(Self::Wall),
            "object" => Ok(Self::Object),
            _        => Err(()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
