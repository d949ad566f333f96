// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous helper functions that didn't fit elsewhere.

use nalgebra::{DMatrix, Scalar};
use num_traits::AsPrimitive;

use crate::misc::type_aliases::{Float, Mat2};

/// Bilinear interpolation of a matrix at floating point coordinates.
///
/// `x` is the column coordinate and `y` the row coordinate.
/// Coordinates outside of the matrix are clamped to its borders,
/// which amounts to replicating the border pixels.
/// The matrix must not be empty.
#[allow(clippy::many_single_char_names)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn interpolate<T>(x: Float, y: Float, mat: &DMatrix<T>) -> Float
where
    T: Scalar + AsPrimitive<Float>,
{
    let (nb_rows, nb_cols) = mat.shape();
    let x = x.max(0.0).min((nb_cols - 1) as Float);
    let y = y.max(0.0).min((nb_rows - 1) as Float);
    let u_0 = x.floor() as usize;
    let v_0 = y.floor() as usize;
    let u_1 = (u_0 + 1).min(nb_cols - 1);
    let v_1 = (v_0 + 1).min(nb_rows - 1);
    let vu_00: Float = mat[(v_0, u_0)].as_();
    let vu_10: Float = mat[(v_1, u_0)].as_();
    let vu_01: Float = mat[(v_0, u_1)].as_();
    let vu_11: Float = mat[(v_1, u_1)].as_();
    let a = x - u_0 as Float;
    let b = y - v_0 as Float;
    (1.0 - b) * (1.0 - a) * vu_00 + b * (1.0 - a) * vu_10 + (1.0 - b) * a * vu_01 + b * a * vu_11
}

/// Check that floating point coordinates are inside a matrix of a given shape.
#[allow(clippy::cast_precision_loss)]
pub fn in_bounds(x: Float, y: Float, (nb_rows, nb_cols): (usize, usize)) -> bool {
    x >= 0.0 && y >= 0.0 && x <= (nb_cols - 1) as Float && y <= (nb_rows - 1) as Float
}

/// Median of a set of values, reordering them in place.
/// Returns `None` for an empty slice.
pub fn median(values: &mut [Float]) -> Option<Float> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*median)
}

/// Smallest eigenvalue of a symmetric 2x2 matrix.
pub fn min_eigenvalue(mat: &Mat2) -> Float {
    let half_trace = 0.5 * (mat.m11 + mat.m22);
    let half_diff = 0.5 * (mat.m11 - mat.m22);
    half_trace - (half_diff * half_diff + mat.m12 * mat.m21).sqrt()
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    #[test]
    fn interpolate_on_integer_coordinates() {
        let mat = DMatrix::from_row_slice(2, 3, &[0_u8, 10, 20, 30, 40, 50]);
        assert_eq!(40.0, interpolate(1.0, 1.0, &mat));
        assert_eq!(20.0, interpolate(2.0, 0.0, &mat));
    }

    #[test]
    fn interpolate_between_pixels() {
        let mat = DMatrix::from_row_slice(2, 2, &[0_u8, 10, 20, 30]);
        approx::assert_relative_eq!(15.0, interpolate(0.5, 0.5, &mat));
        approx::assert_relative_eq!(5.0, interpolate(0.5, 0.0, &mat));
    }

    #[test]
    fn interpolate_clamps_outside() {
        let mat = DMatrix::from_row_slice(2, 2, &[0_u8, 10, 20, 30]);
        assert_eq!(0.0, interpolate(-3.0, -1.0, &mat));
        assert_eq!(30.0, interpolate(8.0, 5.0, &mat));
    }

    #[test]
    fn eigenvalues_of_symmetric() {
        assert_eq!(2.0, min_eigenvalue(&Mat2::new(5.0, 0.0, 0.0, 2.0)));
        approx::assert_relative_eq!(1.0, min_eigenvalue(&Mat2::new(2.0, 1.0, 1.0, 2.0)));
        assert_eq!(0.0, min_eigenvalue(&Mat2::zeros()));
    }

    #[test]
    fn median_of_values() {
        assert_eq!(None, median(&mut []));
        assert_eq!(Some(3.0), median(&mut [5.0, 1.0, 3.0]));
        assert_eq!(Some(2.0), median(&mut [2.0, 2.0, 9.0, 0.0]));
    }
}
