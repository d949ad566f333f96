// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic images and scenes shared by unit tests.

use nalgebra::DMatrix;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::core::camera::Intrinsics;
use crate::misc::type_aliases::{Float, Iso3, Point2, Point3};

/// KITTI odometry sequence 00, left gray camera.
pub const KITTI_00: Intrinsics = Intrinsics {
    principal_point: (607.1928, 185.2157),
    focal: (718.856, 718.856),
    skew: 0.0,
};

/// Image size (rows, cols) of KITTI sequence 00.
pub const KITTI_SHAPE: (usize, usize) = (376, 1241);

/// Image with a constant value.
pub fn blank(nb_rows: usize, nb_cols: usize, value: u8) -> DMatrix<u8> {
    DMatrix::repeat(nb_rows, nb_cols, value)
}

/// Bright squares of `size` pixels on a dark background, laid on a grid of step `spacing`.
pub fn squares(nb_rows: usize, nb_cols: usize, size: usize, spacing: usize) -> DMatrix<u8> {
    let offset = (spacing - size) / 2;
    let mut img = blank(nb_rows, nb_cols, 20);
    let mut y = offset;
    while y + size <= nb_rows {
        let mut x = offset;
        while x + size <= nb_cols {
            img.view_mut((y, x), (size, size)).fill(200);
            x += spacing;
        }
        y += spacing;
    }
    img
}

/// Smooth texture, with its content moved by `shift = (dx, dy)` pixels.
#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn texture(nb_rows: usize, nb_cols: usize, shift: (Float, Float)) -> DMatrix<u8> {
    DMatrix::from_fn(nb_rows, nb_cols, |r, c| {
        let x = c as Float - shift.0;
        let y = r as Float - shift.1;
        let value = 128.0 + 40.0 * (x / 6.0).sin() + 40.0 * (y / 8.0).cos()
            + 30.0 * ((x - y) / 10.0).sin();
        value.round() as u8
    })
}

/// Two views of random 3D points.
///
/// `motion` maps first camera coordinates into second camera coordinates.
pub struct Scene {
    /// Pixel coordinates in the first view.
    pub first: Vec<Point2>,
    /// Pixel coordinates in the second view.
    pub second: Vec<Point2>,
}

/// Random points in front of both cameras, seen by the KITTI camera.
pub fn scene(seed: u64, nb_points: usize, motion: &Iso3) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut first = Vec::with_capacity(nb_points);
    let mut second = Vec::with_capacity(nb_points);
    while first.len() < nb_points {
        let p1 = Point3::new(
            rng.gen_range(-12.0..12.0),
            rng.gen_range(-3.0..3.0),
            rng.gen_range(6.0..40.0),
        );
        let p2 = motion * p1;
        if p2.z < 1.0 {
            continue;
        }
        first.push(project(&p1));
        second.push(project(&p2));
    }
    Scene { first, second }
}

/// Replace a ratio of the points by random pixels.
/// Returns the mask of replaced points.
#[allow(clippy::cast_precision_loss)]
pub fn corrupt(seed: u64, ratio: Float, points: &mut [Point2]) -> Vec<bool> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (nb_rows, nb_cols) = KITTI_SHAPE;
    points
        .iter_mut()
        .map(|p| {
            let outlier = rng.gen_bool(ratio);
            if outlier {
                *p = Point2::new(
                    rng.gen_range(0.0..nb_cols as Float),
                    rng.gen_range(0.0..nb_rows as Float),
                );
            }
            outlier
        })
        .collect()
}

fn project(point: &Point3) -> Point2 {
    let uvz = KITTI_00.project(*point);
    Point2::new(uvz.x / uvz.z, uvz.y / uvz.z)
}
