//! Per-channel array building: load, merge, project, and lay out each
//! channel in the source layout the assembler expects.

use std::collections::BTreeSet;

use ndarray::{ArrayD, ArrayView3, Axis};
use tracing::{debug, warn};

use crate::assemble::{layout_for, SourceLayout};
use crate::classify::AcquisitionType;
use crate::coords::FilenameGrammar;
use crate::error::{Result, ScopeError};
use crate::io::plane_io::{load_concatenated, load_stack};
use crate::organize::{ChannelGroups, ChannelId, SourceFile};
use crate::pipeline::types::{CancelToken, PipelineStage, ProgressReporter};
use crate::plane::{Pixel, PlaneStack};
use crate::stack::illumination::merge_illumination_sides;
use crate::stack::projection::{project, Projection};

/// Channels in source layout, ready for assembly.
pub(crate) struct BuiltChannels<P> {
    pub channels: Vec<(ChannelId, ArrayD<P>)>,
    pub illumination_merges: usize,
    pub dropped_files: usize,
}

/// Everything the builders need besides the files.
pub(crate) struct BuildPlan<'a> {
    pub acquisition: AcquisitionType,
    pub projection: Projection,
    pub order: &'a [ChannelId],
    pub cancel: &'a CancelToken,
    pub reporter: &'a dyn ProgressReporter,
}

impl BuildPlan<'_> {
    fn source_layout(&self) -> SourceLayout {
        layout_for(self.acquisition, self.projection).0
    }
}

/// Turn per-timepoint (Z, Y, X) groups of one channel into its source
/// layout array.
fn combine<P: Pixel>(
    channel: ChannelId,
    groups: Vec<PlaneStack<P>>,
    layout: SourceLayout,
) -> Result<ArrayD<P>> {
    let single = |mut groups: Vec<PlaneStack<P>>| {
        if groups.len() != 1 {
            return Err(ScopeError::InconsistentGrouping(format!(
                "channel {channel}: expected one timepoint, found {}",
                groups.len()
            )));
        }
        Ok(groups.swap_remove(0))
    };

    match layout {
        SourceLayout::Yx => Ok(single(groups)?.index_axis_move(Axis(0), 0).into_dyn()),
        SourceLayout::Zyx => Ok(single(groups)?.into_dyn()),
        SourceLayout::Tyx => {
            let views: Vec<ArrayView3<'_, P>> = groups.iter().map(|g| g.view()).collect();
            ndarray::concatenate(Axis(0), &views)
                .map(|a| a.into_dyn())
                .map_err(|e| shape_error(channel, e))
        }
        SourceLayout::Tzyx => {
            let views: Vec<ArrayView3<'_, P>> = groups.iter().map(|g| g.view()).collect();
            ndarray::stack(Axis(0), &views)
                .map(|a| a.into_dyn())
                .map_err(|e| shape_error(channel, e))
        }
    }
}

fn shape_error(channel: ChannelId, e: ndarray::ShapeError) -> ScopeError {
    ScopeError::InconsistentGrouping(format!("channel {channel}: timepoints differ in shape: {e}"))
}

/// Split a sorted channel file list into runs of equal timepoint.
fn timepoint_runs(files: &[SourceFile]) -> Vec<&[SourceFile]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=files.len() {
        if i == files.len() || files[i].coord.timepoint != files[start].coord.timepoint {
            runs.push(&files[start..i]);
            start = i;
        }
    }
    runs
}

/// Keep only complete timepoints. A short last timepoint (an interrupted
/// acquisition) is dropped; a short one elsewhere is an error.
fn complete_runs<'f>(
    channel: ChannelId,
    mut runs: Vec<&'f [SourceFile]>,
) -> Result<(Vec<&'f [SourceFile]>, usize)> {
    let Some(expected) = runs.first().map(|r| r.len()) else {
        return Ok((runs, 0));
    };
    let mut dropped = 0;
    if runs.len() > 1 {
        if let Some(last) = runs.last().filter(|r| r.len() < expected) {
            warn!(
                channel = %channel,
                planes = last.len(),
                expected,
                "Dropping incomplete trailing timepoint"
            );
            dropped = last.len();
            runs.pop();
        }
    }
    if let Some(bad) = runs.iter().find(|r| r.len() != expected) {
        return Err(ScopeError::InconsistentGrouping(format!(
            "channel {channel}: timepoint starting at {} has {} planes, expected {expected}",
            bad[0].name,
            bad.len()
        )));
    }
    Ok((runs, dropped))
}

/// Builder for instruments that write one plane (or one series) per file.
pub(crate) fn build_plane_series<P: Pixel>(
    groups: &ChannelGroups,
    plan: &BuildPlan<'_>,
) -> Result<BuiltChannels<P>> {
    let layout = plan.source_layout();
    let mut channels = Vec::with_capacity(plan.order.len());
    let mut dropped_files = 0;

    plan.reporter
        .begin_stage(PipelineStage::Loading, Some(plan.order.len()));
    for (done, &id) in plan.order.iter().enumerate() {
        plan.cancel.check()?;
        let files = groups
            .files(id)
            .ok_or_else(|| ScopeError::Internal(format!("channel {id} vanished")))?;

        let stacks = if plan.acquisition.is_multi_plane() {
            let (runs, dropped) = complete_runs(id, timepoint_runs(files))?;
            dropped_files += dropped;
            runs.into_iter()
                .map(|run| project(load_concatenated::<P>(run)?, plan.projection))
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![load_concatenated::<P>(files)?]
        };

        debug!(channel = %id, files = files.len(), timepoints = stacks.len(), "Loaded channel");
        channels.push((id, combine(id, stacks, layout)?));
        plan.reporter.advance(done + 1);
    }

    Ok(BuiltChannels {
        channels,
        illumination_merges: 0,
        dropped_files,
    })
}

fn ordered_files<'g>(
    groups: &'g ChannelGroups,
    order: &'g [ChannelId],
) -> impl Iterator<Item = &'g SourceFile> + 'g {
    order.iter().filter_map(move |&id| groups.files(id)).flatten()
}

fn timepoint_label(t: Option<u32>) -> String {
    t.map_or_else(|| "-".to_string(), |t| t.to_string())
}

/// Timepoints whose every channel carries the full illumination side set.
///
/// The full set is every side seen anywhere in the folder. A trailing
/// timepoint missing a side is dropped whole, across all channels; a gap
/// anywhere else is an `InconsistentGrouping` error. Returns the kept
/// timepoints and the number of files dropped.
fn complete_side_sets(
    groups: &ChannelGroups,
    order: &[ChannelId],
) -> Result<(Vec<Option<u32>>, usize)> {
    let expected: Vec<Option<u32>> = ordered_files(groups, order)
        .map(|f| f.coord.illumination_side)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let sides_at = |id: ChannelId, t: Option<u32>| -> Vec<Option<u32>> {
        let mut sides: Vec<Option<u32>> = groups
            .files(id)
            .unwrap_or_default()
            .iter()
            .filter(|f| f.coord.timepoint == t)
            .map(|f| f.coord.illumination_side)
            .collect();
        sides.sort();
        sides
    };
    let incomplete = |t: Option<u32>| {
        order
            .iter()
            .copied()
            .find(|&id| sides_at(id, t) != expected)
    };

    let mut timepoints: Vec<Option<u32>> = ordered_files(groups, order)
        .map(|f| f.coord.timepoint)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut dropped = 0;
    let trailing = timepoints.last().copied().filter(|_| timepoints.len() > 1);
    if let Some(last) = trailing {
        if let Some(id) = incomplete(last) {
            dropped = ordered_files(groups, order)
                .filter(|f| f.coord.timepoint == last)
                .count();
            warn!(
                channel = %id,
                timepoint = %timepoint_label(last),
                files = dropped,
                "Dropping trailing timepoint with missing illumination sides"
            );
            timepoints.pop();
        }
    }

    if let Some((t, id)) = timepoints
        .iter()
        .find_map(|&t| incomplete(t).map(|id| (t, id)))
    {
        return Err(ScopeError::InconsistentGrouping(format!(
            "channel {id} at timepoint {}: illumination sides {:?}, expected {:?}",
            timepoint_label(t),
            sides_at(id, t),
            expected
        )));
    }
    Ok((timepoints, dropped))
}

/// Builder for light-sheet stacks with several illumination sides.
///
/// Loops timepoint then channel; each (timepoint, channel) pair gets its
/// side stacks projected (if requested) and merged exactly once.
pub(crate) fn build_illumination_merged<P: Pixel>(
    groups: &ChannelGroups,
    grammar: &FilenameGrammar,
    plan: &BuildPlan<'_>,
) -> Result<BuiltChannels<P>> {
    let layout = plan.source_layout();
    let (timepoints, dropped_files) = complete_side_sets(groups, plan.order)?;

    let mut per_channel: Vec<Vec<PlaneStack<P>>> = vec![Vec::new(); plan.order.len()];
    let mut merges = 0;

    plan.reporter.begin_stage(
        PipelineStage::Merging,
        Some(timepoints.len() * plan.order.len()),
    );
    for &t in &timepoints {
        for (slot, &id) in plan.order.iter().enumerate() {
            plan.cancel.check()?;
            let stacks = groups
                .files(id)
                .unwrap_or_default()
                .iter()
                .filter(|f| f.coord.timepoint == t)
                .map(|f| {
                    let stack = load_stack::<P>(&f.path)?;
                    check_declared_depth(grammar, f, stack.len_of(Axis(0)));
                    project(stack, plan.projection)
                })
                .collect::<Result<Vec<_>>>()?;

            per_channel[slot].push(merge_illumination_sides(stacks)?);
            merges += 1;
            plan.reporter.advance(merges);
        }
    }
    debug!(merges, dropped_files, "Merged illumination sides");

    let channels = plan
        .order
        .iter()
        .zip(per_channel)
        .map(|(&id, stacks)| Ok((id, combine(id, stacks, layout)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(BuiltChannels {
        channels,
        illumination_merges: merges,
        dropped_files,
    })
}

fn check_declared_depth(grammar: &FilenameGrammar, file: &SourceFile, depth: usize) {
    if let Some(declared) = grammar.declared_plane_count(&file.name) {
        if declared as usize != depth {
            warn!(
                file = %file.name,
                declared,
                depth,
                "Plane count in file name does not match stack depth"
            );
        }
    }
}
