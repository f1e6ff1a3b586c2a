use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::coords::{AcquisitionCoordinate, FilenameGrammar};
use crate::error::{Result, ScopeError};

/// Channel identifier as carried in the filenames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// One image file of an acquisition and its parsed coordinate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub coord: AcquisitionCoordinate,
}

impl SourceFile {
    /// Stacking order within a channel: timepoint, then z-plane, then
    /// illumination side, then name as a final tie-break.
    fn sort_key(&self) -> (Option<u32>, Option<u32>, Option<u32>, &str) {
        (
            self.coord.timepoint,
            self.coord.zplane,
            self.coord.illumination_side,
            self.name.as_str(),
        )
    }
}

/// Parse every candidate name in `names` (relative to `folder`).
pub fn extract_sources(
    grammar: &FilenameGrammar,
    folder: &std::path::Path,
    names: &[String],
) -> Result<Vec<SourceFile>> {
    names
        .iter()
        .filter(|name| grammar.is_candidate(name))
        .map(|name| {
            Ok(SourceFile {
                path: folder.join(name),
                name: name.clone(),
                coord: grammar.extract(name)?,
            })
        })
        .collect()
}

/// Files of one acquisition grouped by channel, each group in stacking order.
#[derive(Clone, Debug, Default)]
pub struct ChannelGroups {
    groups: BTreeMap<ChannelId, Vec<SourceFile>>,
}

impl ChannelGroups {
    /// Group `files` by their channel field and sort each group.
    ///
    /// The order of `files` does not matter: groups are sorted by an explicit
    /// key, never by listing order.
    pub fn organize(files: Vec<SourceFile>) -> Result<Self> {
        let mut groups: BTreeMap<ChannelId, Vec<SourceFile>> = BTreeMap::new();
        for file in files {
            let channel = file
                .coord
                .channel
                .ok_or_else(|| ScopeError::MissingChannelToken {
                    filename: file.name.clone(),
                })?;
            groups.entry(ChannelId(channel)).or_default().push(file);
        }
        for files in groups.values_mut() {
            files.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        Ok(Self { groups })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.groups.len()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.groups.keys().copied().collect()
    }

    pub fn files(&self, channel: ChannelId) -> Option<&[SourceFile]> {
        self.groups.get(&channel).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &[SourceFile])> {
        self.groups.iter().map(|(id, files)| (*id, files.as_slice()))
    }

    /// All files, channel by channel.
    pub fn all_files(&self) -> impl Iterator<Item = &SourceFile> {
        self.groups.values().flatten()
    }

    pub fn files_per_channel(&self) -> Vec<(ChannelId, usize)> {
        self.groups.iter().map(|(id, f)| (*id, f.len())).collect()
    }

    /// Truncate every channel to the length of the shortest one.
    ///
    /// Returns the number of files dropped. Lossy: a channel that recorded
    /// more planes than another (e.g. an aborted acquisition) loses its tail.
    pub fn truncate_to_shortest(&mut self) -> usize {
        let Some(shortest) = self.groups.values().map(Vec::len).min() else {
            return 0;
        };
        let mut dropped = 0;
        for (id, files) in self.groups.iter_mut() {
            if files.len() > shortest {
                warn!(
                    channel = %id,
                    kept = shortest,
                    dropped = files.len() - shortest,
                    "Truncating channel to shortest group"
                );
                dropped += files.len() - shortest;
                files.truncate(shortest);
            }
        }
        dropped
    }
}

/// Resolve the global channel order used for the C axis.
///
/// Without a declaration channels are ordered by ascending id. A declared
/// order must name every channel present; declared channels that are absent
/// from this folder are skipped.
pub fn resolve_channel_order(
    groups: &ChannelGroups,
    declared: Option<&[u32]>,
) -> Result<Vec<ChannelId>> {
    let present = groups.channel_ids();
    let Some(declared) = declared else {
        return Ok(present);
    };

    let mut order = Vec::with_capacity(present.len());
    for &raw in declared {
        let id = ChannelId(raw);
        if order.contains(&id) {
            return Err(ScopeError::InconsistentGrouping(format!(
                "channel {id} declared twice in channel order"
            )));
        }
        if present.contains(&id) {
            order.push(id);
        } else {
            debug!(channel = %id, "Declared channel absent from folder");
        }
    }

    if let Some(missing) = present.iter().find(|id| !order.contains(id)) {
        return Err(ScopeError::InconsistentGrouping(format!(
            "channel {missing} is present but not in the declared channel order"
        )));
    }
    Ok(order)
}
