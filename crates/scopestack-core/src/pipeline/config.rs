use serde::{Deserialize, Serialize};

use crate::consts::{BOOKKEEPING_PREFIX, PROCESSED_DIR_NAME};
use crate::coords::Instrument;
use crate::error::{Result, ScopeError};
use crate::io::lut::Lut;
use crate::stack::projection::Projection;

/// Operator parameters for a conversion run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub instrument: InstrumentChoice,
    pub projection: Projection,
    /// Data is single-plane (needed for Bruker, whose names cannot tell).
    pub single_plane: bool,
    pub extract_metadata: bool,
    /// Explicit C-axis order by channel id. Ascending ids when absent.
    pub channel_order: Option<Vec<u32>>,
    /// Display LUTs in C-axis order.
    pub luts: Vec<Lut>,
    /// Move converted source folders into the archive directory.
    pub archive_sources: bool,
    pub output_dir_name: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentChoice::Auto,
            projection: Projection::None,
            single_plane: false,
            extract_metadata: true,
            channel_order: None,
            luts: Lut::DEFAULT.to_vec(),
            archive_sources: false,
            output_dir_name: PROCESSED_DIR_NAME.to_string(),
        }
    }
}

impl ConversionConfig {
    pub fn validate(&self) -> Result<()> {
        let name = self.output_dir_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(ScopeError::Config(format!(
                "output_dir_name must be a plain directory name, got {name:?}"
            )));
        }
        if !name.starts_with(BOOKKEEPING_PREFIX) {
            return Err(ScopeError::Config(format!(
                "output_dir_name must start with '{BOOKKEEPING_PREFIX}' so it is not taken for an acquisition"
            )));
        }
        if let Some(order) = &self.channel_order {
            for (i, id) in order.iter().enumerate() {
                if order[..i].contains(id) {
                    return Err(ScopeError::Config(format!(
                        "channel {id} appears twice in channel_order"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Instrument selection: fixed, or detected per folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentChoice {
    #[default]
    Auto,
    Bruker,
    Olympus,
    Flamingo,
}

impl InstrumentChoice {
    pub fn resolve(self, folder_name: &str, filenames: &[String]) -> Result<Instrument> {
        match self {
            Self::Auto => Instrument::detect(folder_name, filenames),
            Self::Bruker => Ok(Instrument::Bruker),
            Self::Olympus => Ok(Instrument::Olympus),
            Self::Flamingo => Ok(Instrument::Flamingo),
        }
    }
}

impl std::str::FromStr for InstrumentChoice {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "bruker" => Ok(Self::Bruker),
            "olympus" => Ok(Self::Olympus),
            "flamingo" => Ok(Self::Flamingo),
            other => Err(ScopeError::Config(format!("unknown instrument: {other}"))),
        }
    }
}
