// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multi-resolution image pyramids.

use nalgebra::{DMatrix, Scalar};

use crate::core::gradient;
use crate::misc::type_aliases::Float;

/// Type alias to easily spot vectors that are indexed over multi-resolution levels.
pub type Levels<T> = Vec<T>;

/// Recursively generate a pyramid of matrices where each level
/// is half the previous resolution, computed with the mean of each 2x2 block.
pub fn mean_pyramid(max_levels: usize, mat: DMatrix<u8>) -> Levels<DMatrix<u8>> {
    limited_sequence(max_levels, mat, |m| {
        halve(m, |a, b, c, d| {
            let a = u16::from(a);
            let b = u16::from(b);
            let c = u16::from(c);
            let d = u16::from(d);
            ((a + b + c + d + 2) / 4) as u8
        })
    })
}

/// Recursively apply a function transforming the matrix
/// until it's not possible anymore or the max number of levels is reached.
/// Using `max_levels = 0` has the same effect than `max_levels = 1`
/// since there is always at least one matrix (the initial one).
pub fn limited_sequence<F, T>(max_levels: usize, mat: DMatrix<T>, f: F) -> Levels<DMatrix<T>>
where
    F: Fn(&DMatrix<T>) -> Option<DMatrix<T>>,
    T: Scalar,
{
    let mut pyr = vec![mat];
    while pyr.len() < max_levels {
        match pyr.last().and_then(&f) {
            Some(new_mat) => pyr.push(new_mat),
            None => break,
        }
    }
    pyr
}

/// Halve the resolution of a matrix by applying a function to each 2x2 block.
/// If one size of the matrix is < 2 then this function returns None.
/// If one size is odd, its last line/column is dropped.
///
/// The block is of the form:
///   a c
///   b d
pub fn halve<F, T, U>(mat: &DMatrix<T>, f: F) -> Option<DMatrix<U>>
where
    F: Fn(T, T, T, T) -> U,
    T: Scalar + Copy,
    U: Scalar,
{
    let (r, c) = mat.shape();
    let half_r = r / 2;
    let half_c = c / 2;
    if half_r == 0 || half_c == 0 {
        None
    } else {
        let half_mat = DMatrix::<U>::from_fn(half_r, half_c, |i, j| {
            let a = mat[(2 * i, 2 * j)];
            let b = mat[(2 * i + 1, 2 * j)];
            let c = mat[(2 * i, 2 * j + 1)];
            let d = mat[(2 * i + 1, 2 * j + 1)];
            f(a, b, c, d)
        });
        Some(half_mat)
    }
}

/// Coordinate of a full resolution position at a given pyramid level.
///
/// Pixel `i` at level `l + 1` is the mean of pixels `2i` and `2i + 1` at level `l`,
/// so its center lies at `2i + 0.5` in level `l` coordinates.
pub fn coordinate_at_level(x: Float, level: usize) -> Float {
    let scale = Float::from(1_u32 << level);
    (x + 0.5) / scale - 0.5
}

/// Image pyramid of a frame with the centered differences of each level,
/// which is everything needed to track points from this frame.
#[derive(Debug, Clone)]
pub struct Pyramid {
    /// Images, full resolution first.
    pub images: Levels<DMatrix<u8>>,
    /// Centered differences `(gx, gy)` of each level.
    pub gradients: Levels<(DMatrix<i16>, DMatrix<i16>)>,
}

impl Pyramid {
    /// Build a mean pyramid of at most `nb_levels` levels and its gradients.
    pub fn new(nb_levels: usize, img: DMatrix<u8>) -> Self {
        let images = mean_pyramid(nb_levels, img);
        let gradients = images.iter().map(gradient::centered).collect();
        Self { images, gradients }
    }

    /// Number of levels actually built.
    pub fn nb_levels(&self) -> usize {
        self.images.len()
    }

    /// Full resolution image.
    pub fn base(&self) -> &DMatrix<u8> {
        &self.images[0]
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use quickcheck_macros;

    #[test]
    fn pyramid_sizes() {
        let mat: DMatrix<u8> = DMatrix::repeat(376, 1241, 7);
        let pyr = mean_pyramid(4, mat);
        let shapes: Vec<_> = pyr.iter().map(|m| m.shape()).collect();
        assert_eq!(vec![(376, 1241), (188, 620), (94, 310), (47, 155)], shapes);
        assert!(pyr.iter().all(|m| m.iter().all(|&x| x == 7)));
    }

    #[test]
    fn pyramid_stops_on_tiny_images() {
        let mat: DMatrix<u8> = DMatrix::repeat(5, 9, 0);
        assert_eq!(3, mean_pyramid(10, mat.clone()).len());
        assert_eq!(1, mean_pyramid(0, mat).len());
    }

    #[test]
    fn halve_takes_block_means() {
        let mat = DMatrix::from_row_slice(2, 4, &[0_u8, 4, 10, 10, 8, 4, 30, 31]);
        let half = mean_pyramid(2, mat).pop().unwrap();
        assert_eq!(DMatrix::from_row_slice(1, 2, &[4_u8, 20]), half);
    }

    #[test]
    fn coordinates_follow_block_centers() {
        assert_eq!(0.0, coordinate_at_level(0.5, 1));
        assert_eq!(-0.25, coordinate_at_level(0.0, 1));
        assert_eq!(2.0, coordinate_at_level(4.5, 1));
        assert_eq!(10.0, coordinate_at_level(10.0, 0));
        assert_eq!(0.0, coordinate_at_level(1.5, 2));
    }

    #[test]
    fn pyramid_with_gradients() {
        let img = DMatrix::from_fn(32, 64, |_, c| (2 * c) as u8);
        let pyr = Pyramid::new(3, img);
        assert_eq!(3, pyr.nb_levels());
        assert_eq!((32, 64), pyr.base().shape());
        assert_eq!(4, pyr.gradients[0].0[(10, 10)]);
        assert_eq!(8, pyr.gradients[1].0[(5, 5)]);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn coordinates_compose_across_levels(x: i16, a: u8, b: u8) -> bool {
        let (a, b) = (usize::from(a % 4), usize::from(b % 4));
        let x = Float::from(x) / 10.0;
        let two_steps = coordinate_at_level(coordinate_at_level(x, a), b);
        (two_steps - coordinate_at_level(x, a + b)).abs() < 1e-9
    }
}
