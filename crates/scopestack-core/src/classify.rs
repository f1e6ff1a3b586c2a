//! Acquisition type classification.
//!
//! One decision per folder, made from file names (and the page count of the
//! first file), before any pixel data is read. The result keys the axis
//! layout lookup in [`crate::assemble`].

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::consts::{BRUKER_CYCLE_TOKEN_FROM_END, BRUKER_FIRST_CYCLE};
use crate::coords::Instrument;
use crate::error::{Result, ScopeError};
use crate::organize::SourceFile;
use crate::stack::projection::Projection;

/// Canonical acquisition shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcquisitionType {
    SinglePlaneSingleFrame,
    SinglePlaneMultiFrame,
    MultiPlaneSingleTimepoint,
    MultiPlaneMultiTimepoint,
}

impl AcquisitionType {
    pub fn is_multi_plane(self) -> bool {
        matches!(
            self,
            Self::MultiPlaneSingleTimepoint | Self::MultiPlaneMultiTimepoint
        )
    }

    /// Projection that actually applies: single-plane data has no Z to reduce.
    pub fn effective_projection(self, requested: Projection) -> Projection {
        if self.is_multi_plane() {
            requested
        } else {
            Projection::None
        }
    }
}

impl fmt::Display for AcquisitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePlaneSingleFrame => write!(f, "single-plane single-frame"),
            Self::SinglePlaneMultiFrame => write!(f, "single-plane multi-frame"),
            Self::MultiPlaneSingleTimepoint => write!(f, "multi-plane single-timepoint"),
            Self::MultiPlaneMultiTimepoint => write!(f, "multi-plane multi-timepoint"),
        }
    }
}

/// Operator inputs that influence classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClassifyRequest {
    pub projection: Projection,
    /// Operator declares the data single-plane (Bruker cannot tell from names).
    pub single_plane: bool,
}

/// Classifier verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub acquisition: AcquisitionType,
    pub projection: Projection,
}

/// What the classifier gets to look at.
pub struct FolderListing<'a> {
    pub instrument: Instrument,
    pub sources: &'a [SourceFile],
    /// Pages in the first file (1 for plain 2-D planes).
    pub planes_per_file: usize,
}

pub fn classify(listing: &FolderListing<'_>, request: ClassifyRequest) -> Result<Classification> {
    if listing.sources.is_empty() {
        return Err(ScopeError::MissingInput("no image files to classify".into()));
    }
    check_homogeneous(listing.sources)?;

    let acquisition = match listing.instrument {
        Instrument::Bruker => classify_bruker(listing, request.single_plane)?,
        Instrument::Olympus => classify_olympus(listing, request.single_plane)?,
        Instrument::Flamingo => classify_flamingo(listing, request.single_plane)?,
    };
    let projection = acquisition.effective_projection(request.projection);
    debug!(%acquisition, %projection, "Classified acquisition");
    Ok(Classification {
        acquisition,
        projection,
    })
}

/// All files must expose the same set of coordinate fields.
fn check_homogeneous(sources: &[SourceFile]) -> Result<()> {
    let shape = |s: &SourceFile| {
        (
            s.coord.timepoint.is_some(),
            s.coord.zplane.is_some(),
            s.coord.illumination_side.is_some(),
        )
    };
    let first = &sources[0];
    if let Some(odd) = sources.iter().find(|s| shape(s) != shape(first)) {
        return Err(ScopeError::InconsistentGrouping(format!(
            "{} and {} carry different coordinate tokens",
            first.name, odd.name
        )));
    }
    Ok(())
}

fn max_files_per_channel(sources: &[SourceFile]) -> usize {
    let mut counts = std::collections::BTreeMap::new();
    for s in sources {
        *counts.entry(s.coord.channel).or_insert(0usize) += 1;
    }
    counts.into_values().max().unwrap_or(0)
}

fn distinct_timepoints(sources: &[SourceFile]) -> usize {
    sources
        .iter()
        .map(|s| s.coord.timepoint)
        .collect::<BTreeSet<_>>()
        .len()
}

fn single_plane_kind(listing: &FolderListing<'_>, frames: usize) -> AcquisitionType {
    if frames <= 1 && listing.planes_per_file <= 1 {
        AcquisitionType::SinglePlaneSingleFrame
    } else {
        AcquisitionType::SinglePlaneMultiFrame
    }
}

/// Bruker names cannot distinguish "one cycle of many planes" from "many
/// cycles of one plane each" without help, so the operator flags
/// single-plane data and the cycle token of the lexicographically last file
/// decides the rest.
///
/// Known fragility: gapped or non-monotonic cycle numbering can fool the
/// last-file check. Contradictions that can be detected raise instead of
/// misclassifying.
fn classify_bruker(listing: &FolderListing<'_>, single_plane: bool) -> Result<AcquisitionType> {
    if single_plane {
        return Ok(single_plane_kind(
            listing,
            max_files_per_channel(listing.sources),
        ));
    }

    let mut names: Vec<&str> = listing.sources.iter().map(|s| s.name.as_str()).collect();
    names.sort_unstable();
    let last = names
        .last()
        .ok_or_else(|| ScopeError::MissingInput("no Bruker image files".into()))?;

    let tokens: Vec<&str> = last.split('_').collect();
    let sentinel = tokens
        .len()
        .checked_sub(BRUKER_CYCLE_TOKEN_FROM_END)
        .map(|i| tokens[i])
        .filter(|t| is_cycle_token(t))
        .ok_or_else(|| {
            ScopeError::AmbiguousClassification(format!(
                "last file {last} has no Cycle token at the expected position"
            ))
        })?;

    if sentinel == BRUKER_FIRST_CYCLE {
        if let Some(later) = listing
            .sources
            .iter()
            .find(|s| s.coord.timepoint.is_some_and(|t| t > 1))
        {
            return Err(ScopeError::AmbiguousClassification(format!(
                "last file {last} is in the first cycle but {} is in a later one",
                later.name
            )));
        }
        Ok(AcquisitionType::MultiPlaneSingleTimepoint)
    } else {
        Ok(AcquisitionType::MultiPlaneMultiTimepoint)
    }
}

fn is_cycle_token(token: &str) -> bool {
    token
        .strip_prefix("Cycle")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Olympus names carry T and Z tokens only when the axis exists.
fn classify_olympus(listing: &FolderListing<'_>, single_plane: bool) -> Result<AcquisitionType> {
    let first = &listing.sources[0].coord;
    let has_z = first.zplane.is_some();
    let has_t = first.timepoint.is_some();

    if single_plane && has_z {
        return Err(ScopeError::AmbiguousClassification(
            "declared single-plane but files carry z-plane tokens".into(),
        ));
    }

    Ok(match (has_z, has_t) {
        (true, true) => AcquisitionType::MultiPlaneMultiTimepoint,
        (true, false) => AcquisitionType::MultiPlaneSingleTimepoint,
        (false, _) => single_plane_kind(listing, max_files_per_channel(listing.sources)),
    })
}

/// Flamingo files are whole z-stacks; depth decides plane count and the
/// `t` tokens decide the timepoint count.
fn classify_flamingo(listing: &FolderListing<'_>, single_plane: bool) -> Result<AcquisitionType> {
    let timepoints = distinct_timepoints(listing.sources);
    let multi_plane = listing.planes_per_file > 1;

    if single_plane && multi_plane {
        return Err(ScopeError::AmbiguousClassification(format!(
            "declared single-plane but stacks hold {} planes",
            listing.planes_per_file
        )));
    }

    Ok(match (multi_plane, timepoints > 1) {
        (true, true) => AcquisitionType::MultiPlaneMultiTimepoint,
        (true, false) => AcquisitionType::MultiPlaneSingleTimepoint,
        (false, true) => AcquisitionType::SinglePlaneMultiFrame,
        (false, false) => AcquisitionType::SinglePlaneSingleFrame,
    })
}
