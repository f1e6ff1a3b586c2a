//! Axis assembly: per-channel stacks to a canonical hyperstack.
//!
//! The source layout of each channel array and the target axis order are a
//! fixed function of the acquisition type and projection ([`layout_for`]).
//! Shape alone cannot tell "1 timepoint of N planes" from "N timepoints of
//! 1 plane", so nothing here looks at sizes to pick a permutation.

use std::fmt;

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use tracing::debug;

use crate::classify::AcquisitionType;
use crate::error::{Result, ScopeError};
use crate::organize::ChannelId;
use crate::plane::{Pixel, PixelType};
use crate::stack::projection::Projection;

/// Canonical output axis order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisOrder {
    Zcyx,
    Tzcyx,
    Tcyx,
}

impl AxisOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zcyx => "ZCYX",
            Self::Tzcyx => "TZCYX",
            Self::Tcyx => "TCYX",
        }
    }

    pub fn ndim(self) -> usize {
        self.as_str().len()
    }

    /// Position of `axis` ('T', 'Z', 'C', 'Y' or 'X'), if present.
    pub fn position(self, axis: char) -> Option<usize> {
        self.as_str().chars().position(|c| c == axis)
    }
}

impl fmt::Display for AxisOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axes of one channel's array before assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceLayout {
    Yx,
    Zyx,
    Tyx,
    Tzyx,
}

impl SourceLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yx => "YX",
            Self::Zyx => "ZYX",
            Self::Tyx => "TYX",
            Self::Tzyx => "TZYX",
        }
    }

    pub fn ndim(self) -> usize {
        self.as_str().len()
    }
}

/// Per-channel source layout and output axis order for an acquisition.
///
/// Projection is ignored for single-plane types.
pub fn layout_for(acquisition: AcquisitionType, projection: Projection) -> (SourceLayout, AxisOrder) {
    use AcquisitionType::*;
    match (acquisition, acquisition.effective_projection(projection).is_projected()) {
        (SinglePlaneSingleFrame, _) => (SourceLayout::Zyx, AxisOrder::Zcyx),
        (SinglePlaneMultiFrame, _) => (SourceLayout::Tyx, AxisOrder::Tzcyx),
        (MultiPlaneSingleTimepoint, false) => (SourceLayout::Zyx, AxisOrder::Tzcyx),
        (MultiPlaneMultiTimepoint, false) => (SourceLayout::Tzyx, AxisOrder::Tzcyx),
        (MultiPlaneSingleTimepoint, true) => (SourceLayout::Yx, AxisOrder::Tcyx),
        (MultiPlaneMultiTimepoint, true) => (SourceLayout::Tyx, AxisOrder::Tcyx),
    }
}

/// Finished N-D array in canonical axis order.
#[derive(Clone, Debug)]
pub struct Hyperstack<P> {
    pub data: ArrayD<P>,
    pub axes: AxisOrder,
    /// Channel ids in C-axis order.
    pub channels: Vec<ChannelId>,
    pub acquisition: AcquisitionType,
    pub projection: Projection,
}

impl<P: Pixel> Hyperstack<P> {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Length of `axis`, 1 when the axis is absent.
    pub fn axis_len(&self, axis: char) -> usize {
        self.axes.position(axis).map_or(1, |i| self.data.shape()[i])
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * P::PIXEL_TYPE.bytes()
    }
}

/// Hyperstack of either supported pixel type.
#[derive(Clone, Debug)]
pub enum AnyHyperstack {
    U8(Hyperstack<u8>),
    U16(Hyperstack<u16>),
}

macro_rules! with_hyperstack {
    ($self:expr, $h:ident => $body:expr) => {
        match $self {
            AnyHyperstack::U8($h) => $body,
            AnyHyperstack::U16($h) => $body,
        }
    };
}

impl AnyHyperstack {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            Self::U8(_) => PixelType::U8,
            Self::U16(_) => PixelType::U16,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_hyperstack!(self, h => h.shape())
    }

    pub fn axes(&self) -> AxisOrder {
        with_hyperstack!(self, h => h.axes)
    }

    pub fn axis_len(&self, axis: char) -> usize {
        with_hyperstack!(self, h => h.axis_len(axis))
    }

    pub fn channels(&self) -> &[ChannelId] {
        with_hyperstack!(self, h => h.channels.as_slice())
    }

    pub fn acquisition(&self) -> AcquisitionType {
        with_hyperstack!(self, h => h.acquisition)
    }

    pub fn byte_len(&self) -> usize {
        with_hyperstack!(self, h => h.byte_len())
    }
}

impl From<Hyperstack<u8>> for AnyHyperstack {
    fn from(h: Hyperstack<u8>) -> Self {
        Self::U8(h)
    }
}

impl From<Hyperstack<u16>> for AnyHyperstack {
    fn from(h: Hyperstack<u16>) -> Self {
        Self::U16(h)
    }
}

/// Stack per-channel arrays along a new C axis and reorder to the canonical
/// layout for `acquisition`.
///
/// `channels` must already be in global channel order. Every array must have
/// the source layout from [`layout_for`] and the same shape.
pub fn assemble<P: Pixel>(
    channels: Vec<(ChannelId, ArrayD<P>)>,
    acquisition: AcquisitionType,
    projection: Projection,
) -> Result<Hyperstack<P>> {
    let (source, target) = layout_for(acquisition, projection);
    let (reference_id, reference) = channels.first().ok_or(ScopeError::EmptySequence)?;

    for (id, array) in &channels {
        if array.ndim() != source.ndim() {
            return Err(ScopeError::Internal(format!(
                "channel {id} has {} axes, {} layout needs {}",
                array.ndim(),
                source.as_str(),
                source.ndim()
            )));
        }
        if array.shape() != reference.shape() {
            return Err(ScopeError::ChannelShapeMismatch {
                reference: reference_id.to_string(),
                expected_shape: reference.shape().to_vec(),
                channel: id.to_string(),
                shape: array.shape().to_vec(),
            });
        }
    }

    let views: Vec<ArrayViewD<'_, P>> = channels.iter().map(|(_, a)| a.view()).collect();
    let mut stacked = ndarray::stack(Axis(0), &views)
        .map_err(|e| ScopeError::Internal(format!("channel stacking failed: {e}")))?;

    let mut labels: Vec<char> = std::iter::once('C').chain(source.as_str().chars()).collect();
    for axis in target.as_str().chars() {
        if !labels.contains(&axis) {
            let at = labels.len();
            stacked = stacked.insert_axis(Axis(at));
            labels.push(axis);
        }
    }

    let perm: Vec<usize> = target
        .as_str()
        .chars()
        .map(|axis| labels.iter().position(|&l| l == axis))
        .collect::<Option<_>>()
        .ok_or_else(|| ScopeError::Internal(format!("cannot map {labels:?} onto {target}")))?;

    let data = stacked
        .permuted_axes(IxDyn(&perm))
        .as_standard_layout()
        .into_owned();

    debug!(axes = %target, shape = ?data.shape(), "Assembled hyperstack");
    Ok(Hyperstack {
        data,
        axes: target,
        channels: channels.into_iter().map(|(id, _)| id).collect(),
        acquisition,
        projection,
    })
}

/// Inverse of [`assemble`]: recover the per-channel arrays in their source
/// layout.
pub fn disassemble<P: Pixel>(hyperstack: &Hyperstack<P>) -> Result<Vec<(ChannelId, ArrayD<P>)>> {
    let (source, target) = layout_for(hyperstack.acquisition, hyperstack.projection);
    let wanted: Vec<char> = std::iter::once('C').chain(source.as_str().chars()).collect();
    let inserted: Vec<char> = target
        .as_str()
        .chars()
        .filter(|c| !wanted.contains(c))
        .collect();

    let perm: Vec<usize> = wanted
        .iter()
        .chain(inserted.iter())
        .map(|&axis| target.position(axis))
        .collect::<Option<_>>()
        .ok_or_else(|| ScopeError::Internal(format!("cannot map {target} onto {wanted:?}")))?;

    let mut view = hyperstack.data.view().permuted_axes(IxDyn(&perm));
    for _ in &inserted {
        let last = view.ndim() - 1;
        view = view.index_axis_move(Axis(last), 0);
    }

    Ok(hyperstack
        .channels
        .iter()
        .zip(view.outer_iter())
        .map(|(id, channel)| (*id, channel.to_owned()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_layout_matches_target_rank() {
        use AcquisitionType::*;
        for acq in [
            SinglePlaneSingleFrame,
            SinglePlaneMultiFrame,
            MultiPlaneSingleTimepoint,
            MultiPlaneMultiTimepoint,
        ] {
            for proj in [Projection::None, Projection::Max, Projection::Mean] {
                let (source, target) = layout_for(acq, proj);
                // C is added, absent target axes are inserted with size 1.
                assert!(source.ndim() + 1 <= target.ndim());
            }
        }
    }
}
