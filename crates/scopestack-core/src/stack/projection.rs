use std::fmt;

use ndarray::{Array2, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, ScopeError};
use crate::plane::{Pixel, PlaneStack};

/// Z-axis reduction applied to multi-plane acquisitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    #[default]
    None,
    Max,
    #[serde(rename = "avg", alias = "mean")]
    Mean,
}

impl Projection {
    /// Resolve the operator's two independent flags. Max wins when both are set.
    pub fn from_flags(max: bool, avg: bool) -> Self {
        match (max, avg) {
            (true, true) => {
                warn!("Both max and avg projection requested, using max");
                Self::Max
            }
            (true, false) => Self::Max,
            (false, true) => Self::Mean,
            (false, false) => Self::None,
        }
    }

    /// Prefix of the output file name.
    pub fn output_prefix(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Max => "MAX_",
            Self::Mean => "AVG_",
        }
    }

    pub fn is_projected(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Max => write!(f, "max"),
            Self::Mean => write!(f, "avg"),
        }
    }
}

/// Reduce a (Z, Y, X) stack along Z.
///
/// `None` returns the stack untouched. `Max` and `Mean` return a stack of
/// depth 1; a stack that already has depth 1 is returned as is.
pub fn project<P: Pixel>(stack: PlaneStack<P>, mode: Projection) -> Result<PlaneStack<P>> {
    if stack.len_of(Axis(0)) == 0 {
        return Err(ScopeError::EmptySequence);
    }
    if stack.len_of(Axis(0)) == 1 {
        return Ok(stack);
    }
    let plane = match mode {
        Projection::None => return Ok(stack),
        Projection::Max => max_projection(stack.view()),
        Projection::Mean => mean_projection(stack.view()),
    };
    Ok(plane.insert_axis(Axis(0)))
}

/// Elementwise maximum over Z. Output dtype equals input dtype.
pub fn max_projection<P: Pixel>(stack: ArrayView3<'_, P>) -> Array2<P> {
    reduce_lanes(stack, |lane| {
        lane.iter().copied().max().unwrap_or_default()
    })
}

/// Elementwise mean over Z, rounded half up in integer arithmetic:
/// `(2 * sum + n) / (2 * n)`. Never leaves `[min, max]` of the lane.
pub fn mean_projection<P: Pixel>(stack: ArrayView3<'_, P>) -> Array2<P> {
    let n = stack.len_of(Axis(0)) as u64;
    reduce_lanes(stack, move |lane| {
        if n == 0 {
            return P::default();
        }
        let sum: u64 = lane.iter().map(|p| p.widen()).sum();
        P::narrow((2 * sum + n) / (2 * n))
    })
}

fn reduce_lanes<P, F>(stack: ArrayView3<'_, P>, reduce: F) -> Array2<P>
where
    P: Pixel,
    F: Fn(ndarray::ArrayView1<'_, P>) -> P + Sync + Send,
{
    let (_, h, w) = stack.dim();
    let mut out = Array2::<P>::default((h, w));
    let zip = Zip::from(&mut out).and(stack.lanes(Axis(0)));

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        zip.par_for_each(|o, lane| *o = reduce(lane));
    } else {
        zip.for_each(|o, lane| *o = reduce(lane));
    }
    out
}
