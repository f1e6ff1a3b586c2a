//! Filename grammars and the coordinate extractor.
//!
//! Each instrument family encodes its acquisition coordinate in the file
//! name. The conventions live in one declarative table per instrument
//! ([`GrammarSpec`]); [`FilenameGrammar`] compiles a table once and is the
//! only place that turns names into [`AcquisitionCoordinate`]s.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::consts::{OLYMPUS_EXCLUDED_MARKERS, OLYMPUS_FOLDER_SUFFIX};
use crate::error::{Result, ScopeError};

/// Microscope family that produced an acquisition folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    /// Bruker multiphoton: one 2-D plane per file, `Cycle`/`Ch` tokens.
    Bruker,
    /// Olympus FluoView: one 2-D plane per file, `C`/`Z`/`T` tokens.
    Olympus,
    /// Flamingo dual-illumination light-sheet: one z-stack per file.
    Flamingo,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bruker => write!(f, "Bruker"),
            Self::Olympus => write!(f, "Olympus"),
            Self::Flamingo => write!(f, "Flamingo"),
        }
    }
}

impl Instrument {
    /// Guess the instrument from the folder name and its file names.
    pub fn detect(folder_name: &str, filenames: &[String]) -> Result<Self> {
        if folder_name.contains(".oif") {
            return Ok(Self::Olympus);
        }
        let flamingo = FilenameGrammar::new(Self::Flamingo)?;
        let is_flamingo = filenames
            .iter()
            .any(|name| flamingo.is_candidate(name) && flamingo.extract(name).is_ok());
        Ok(if is_flamingo { Self::Flamingo } else { Self::Bruker })
    }

    /// Whether every file already holds a full z-stack.
    pub fn stores_stacks(self) -> bool {
        matches!(self, Self::Flamingo)
    }

    /// Folder name with instrument-specific suffixes removed.
    pub fn output_stem(self, folder_name: &str) -> String {
        match self {
            Self::Olympus => folder_name
                .strip_suffix(OLYMPUS_FOLDER_SUFFIX)
                .unwrap_or(folder_name)
                .to_string(),
            _ => folder_name.to_string(),
        }
    }
}

/// Position of one source file in the acquisition.
///
/// `None` means the acquisition has no such axis; `Some(0)` is index zero
/// along an axis that exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AcquisitionCoordinate {
    pub channel: Option<u32>,
    pub timepoint: Option<u32>,
    pub zplane: Option<u32>,
    pub illumination_side: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinateField {
    Channel,
    Timepoint,
    ZPlane,
    IlluminationSide,
}

impl fmt::Display for CoordinateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Timepoint => write!(f, "timepoint"),
            Self::ZPlane => write!(f, "z-plane"),
            Self::IlluminationSide => write!(f, "illumination side"),
        }
    }
}

/// One field of the grammar: the first capture group of `pattern` is the
/// decimal index.
struct TokenRule {
    field: CoordinateField,
    pattern: &'static str,
}

/// Declarative per-instrument naming convention.
struct GrammarSpec {
    prefix: &'static str,
    suffix: &'static str,
    excluded: &'static [&'static str],
    rules: &'static [TokenRule],
    /// Declared number of planes stored in the file, when the name carries it.
    plane_count: Option<&'static str>,
}

// TSeries-06132024-1200-001_Cycle00001_Ch2_000003.ome.tif
const BRUKER: GrammarSpec = GrammarSpec {
    prefix: "",
    suffix: ".tif",
    excluded: &[],
    rules: &[
        TokenRule {
            field: CoordinateField::Channel,
            pattern: r"_Ch(\d+)_\d+(?:\.ome)?\.tif$",
        },
        TokenRule {
            field: CoordinateField::Timepoint,
            pattern: r"_Cycle(\d+)_Ch\d+_",
        },
        TokenRule {
            field: CoordinateField::ZPlane,
            pattern: r"_Ch\d+_(\d+)(?:\.ome)?\.tif$",
        },
    ],
    plane_count: None,
};

// s_C001Z003T010.tif
const OLYMPUS: GrammarSpec = GrammarSpec {
    prefix: "s",
    suffix: ".tif",
    excluded: &OLYMPUS_EXCLUDED_MARKERS,
    rules: &[
        TokenRule {
            field: CoordinateField::Channel,
            pattern: r"(?:_|\d)C(\d{3})",
        },
        TokenRule {
            field: CoordinateField::Timepoint,
            pattern: r"(?:_|\d)T(\d{3})",
        },
        TokenRule {
            field: CoordinateField::ZPlane,
            pattern: r"(?:_|\d)Z(\d{3})",
        },
    ],
    plane_count: None,
};

// S000_t000002_V000_R0000_X000_Y000_C01_I1_D0_P00366.tif
const FLAMINGO: GrammarSpec = GrammarSpec {
    prefix: "S",
    suffix: ".tif",
    excluded: &[],
    rules: &[
        TokenRule {
            field: CoordinateField::Channel,
            pattern: r"(?:^|_)C(\d+)(?:_|\.)",
        },
        TokenRule {
            field: CoordinateField::Timepoint,
            pattern: r"(?:^|_)t(\d+)(?:_|\.)",
        },
        TokenRule {
            field: CoordinateField::IlluminationSide,
            pattern: r"(?:^|_)I(\d+)(?:_|\.)",
        },
    ],
    plane_count: Some(r"(?:^|_)P(\d+)(?:_|\.)"),
};

impl Instrument {
    fn grammar_spec(self) -> &'static GrammarSpec {
        match self {
            Self::Bruker => &BRUKER,
            Self::Olympus => &OLYMPUS,
            Self::Flamingo => &FLAMINGO,
        }
    }
}

/// Compiled filename grammar for one instrument.
pub struct FilenameGrammar {
    instrument: Instrument,
    spec: &'static GrammarSpec,
    rules: Vec<(CoordinateField, Regex)>,
    plane_count: Option<Regex>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| ScopeError::Internal(format!("invalid grammar pattern {pattern}: {e}")))
}

impl FilenameGrammar {
    pub fn new(instrument: Instrument) -> Result<Self> {
        let spec = instrument.grammar_spec();
        let rules = spec
            .rules
            .iter()
            .map(|rule| Ok((rule.field, compile(rule.pattern)?)))
            .collect::<Result<Vec<_>>>()?;
        let plane_count = spec.plane_count.map(compile).transpose()?;
        Ok(Self {
            instrument,
            spec,
            rules,
            plane_count,
        })
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    /// Whether `filename` is an image file this instrument writes planes to.
    pub fn is_candidate(&self, filename: &str) -> bool {
        filename.starts_with(self.spec.prefix)
            && filename.ends_with(self.spec.suffix)
            && !self.spec.excluded.iter().any(|m| filename.contains(m))
    }

    /// Parse the acquisition coordinate out of `filename`.
    ///
    /// Absent timepoint/z/illumination tokens resolve to `None`; an absent
    /// channel token is an error because the file cannot be grouped.
    pub fn extract(&self, filename: &str) -> Result<AcquisitionCoordinate> {
        let mut coord = AcquisitionCoordinate::default();
        for (field, re) in &self.rules {
            let value = capture_index(re, filename, *field)?;
            match field {
                CoordinateField::Channel => coord.channel = value,
                CoordinateField::Timepoint => coord.timepoint = value,
                CoordinateField::ZPlane => coord.zplane = value,
                CoordinateField::IlluminationSide => coord.illumination_side = value,
            }
        }
        if coord.channel.is_none() {
            return Err(ScopeError::MissingChannelToken {
                filename: filename.to_string(),
            });
        }
        Ok(coord)
    }

    /// Number of planes the file name declares, if the grammar has one.
    pub fn declared_plane_count(&self, filename: &str) -> Option<u32> {
        let re = self.plane_count.as_ref()?;
        re.captures(filename)?.get(1)?.as_str().parse().ok()
    }
}

fn capture_index(re: &Regex, filename: &str, field: CoordinateField) -> Result<Option<u32>> {
    let Some(digits) = re.captures(filename).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    digits.as_str().parse::<u32>().map(Some).map_err(|e| {
        ScopeError::InconsistentGrouping(format!(
            "{field} token {:?} in {filename} is not a valid index: {e}",
            digits.as_str()
        ))
    })
}
