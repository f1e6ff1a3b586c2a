use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::LUT_SIZE;
use crate::error::ScopeError;

/// Display look-up table attached to one channel of the output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lut {
    Grays,
    Red,
    Green,
    Blue,
    Magenta,
    Cyan,
    Yellow,
}

impl Lut {
    /// Default channel colours, in C-axis order.
    pub const DEFAULT: [Lut; 4] = [Lut::Red, Lut::Green, Lut::Blue, Lut::Magenta];

    /// Which of the (red, green, blue) components ramp up.
    fn components(self) -> [bool; 3] {
        match self {
            Self::Grays => [true, true, true],
            Self::Red => [true, false, false],
            Self::Green => [false, true, false],
            Self::Blue => [false, false, true],
            Self::Magenta => [true, false, true],
            Self::Cyan => [false, true, true],
            Self::Yellow => [true, true, false],
        }
    }

    /// Red, green and blue ramps, 256 entries each, concatenated.
    pub fn table(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 * LUT_SIZE);
        for on in self.components() {
            out.extend((0..LUT_SIZE).map(|i| if on { i as u8 } else { 0 }));
        }
        out
    }
}

impl fmt::Display for Lut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Grays => "grays",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
            Self::Yellow => "yellow",
        };
        f.write_str(name)
    }
}

impl FromStr for Lut {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grays" | "gray" | "grey" => Ok(Self::Grays),
            "red" => Ok(Self::Red),
            "green" => Ok(Self::Green),
            "blue" => Ok(Self::Blue),
            "magenta" => Ok(Self::Magenta),
            "cyan" => Ok(Self::Cyan),
            "yellow" => Ok(Self::Yellow),
            other => Err(ScopeError::Config(format!("unknown LUT: {other}"))),
        }
    }
}
