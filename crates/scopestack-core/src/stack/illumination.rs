use ndarray::{Axis, Zip};
use tracing::debug;

use crate::error::{Result, ScopeError};
use crate::plane::{Pixel, PlaneStack};

/// Merge the illumination-side images of one (timepoint, channel)
/// coordinate: elementwise maximum across sides, then one 90° counter-
/// clockwise rotation in the (Y, X) plane.
///
/// Each side is a (Z, Y, X) stack; projected sides have Z = 1. The side
/// order does not affect the result.
pub fn merge_illumination_sides<P: Pixel>(sides: Vec<PlaneStack<P>>) -> Result<PlaneStack<P>> {
    let merged = max_merge(sides)?;
    Ok(rotate_ccw(merged))
}

/// Elementwise maximum across same-shaped stacks.
pub fn max_merge<P: Pixel>(sides: Vec<PlaneStack<P>>) -> Result<PlaneStack<P>> {
    let mut iter = sides.into_iter();
    let mut merged = iter.next().ok_or(ScopeError::EmptySequence)?;
    for (i, side) in iter.enumerate() {
        if side.dim() != merged.dim() {
            return Err(ScopeError::InconsistentGrouping(format!(
                "illumination side {} has shape {:?}, expected {:?}",
                i + 1,
                side.shape(),
                merged.shape()
            )));
        }
        Zip::from(&mut merged)
            .and(&side)
            .for_each(|m, &s| *m = (*m).max(s));
    }
    debug!(shape = ?merged.shape(), "Merged illumination sides");
    Ok(merged)
}

/// Rotate every plane of a (Z, Y, X) stack 90° counter-clockwise.
///
/// Output plane `(y', x')` takes input `(x', W - 1 - y')`, so an input of
/// shape (Z, H, W) becomes (Z, W, H).
pub fn rotate_ccw<P: Pixel>(stack: PlaneStack<P>) -> PlaneStack<P> {
    let mut rotated = stack.permuted_axes([0, 2, 1]);
    rotated.invert_axis(Axis(1));
    rotated.as_standard_layout().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rotate_ccw_moves_top_right_to_top_left() {
        // 1 2 3          3 6
        // 4 5 6   ->     2 5
        //                1 4
        let plane = array![[[1u8, 2, 3], [4, 5, 6]]];
        let rotated = rotate_ccw(plane);
        assert_eq!(rotated, array![[[3u8, 6], [2, 5], [1, 4]]]);
    }

    #[test]
    fn test_four_rotations_are_identity() {
        let plane = array![[[1u16, 2, 3], [4, 5, 6]]];
        let mut r = plane.clone();
        for _ in 0..4 {
            r = rotate_ccw(r);
        }
        assert_eq!(r, plane);
    }
}
