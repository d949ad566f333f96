// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Recovery of the relative motion encoded in an essential matrix.
//!
//! An essential matrix is compatible with four motions.
//! Only one of them sees the observed points in front of both cameras.

use nalgebra::Translation3;

use crate::core::epipolar::{self, ransac::Estimate, EpipolarError};
use crate::math::so3;
use crate::misc::type_aliases::{Float, Iso3, Mat3, Point2, UnitQuat, Vec3};

/// Configuration of the decomposition.
#[derive(Debug, Clone)]
pub struct Config {
    /// Triangulated points farther than this, in baseline units, do not count.
    pub max_depth: Float,
    /// The result is ambiguous if the runner-up candidate reaches this ratio of the best support.
    pub tie_ratio: Float,
    /// The result is ambiguous if the best candidate has less support than this.
    pub min_support: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: 50.0,
            tie_ratio: 0.8,
            min_support: 10,
        }
    }
}

/// One of the four motions compatible with an essential matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Rotation matrix.
    pub rotation: Mat3,
    /// Unit translation.
    pub translation: Vec3,
}

/// Motion from first camera coordinates to second camera coordinates,
/// with a unit translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeMotion {
    /// Rotation.
    pub rotation: UnitQuat,
    /// Translation direction, of unit norm.
    pub translation: Vec3,
}

impl RelativeMotion {
    /// Rigid body motion with the translation scaled.
    pub fn scaled(&self, scale: Float) -> Iso3 {
        Iso3::from_parts(Translation3::from(scale * self.translation), self.rotation)
    }
}

/// Chosen motion and its support.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// The winning motion.
    pub motion: RelativeMotion,
    /// Index of the winning candidate.
    pub candidate: usize,
    /// Number of inliers in front of both cameras for the winning candidate.
    pub support: usize,
    /// Best support among the other candidates.
    pub runner_up: usize,
    /// Low confidence in the winning candidate.
    pub ambiguous: bool,
}

/// The four candidates `(U W V^T, u3)`, `(U W V^T, -u3)`, `(U W^T V^T, u3)`, `(U W^T V^T, -u3)`.
#[rustfmt::skip]
pub fn candidates(essential: &Mat3) -> Result<[Candidate; 4], EpipolarError> {
    let (mut u, _, mut v_t) = epipolar::sorted_svd(essential)?;
    // The third singular value is zero so signs can be flipped freely.
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }
    let w = Mat3::new(
        0.0, -1.0, 0.0,
        1.0,  0.0, 0.0,
        0.0,  0.0, 1.0,
    );
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t = u.column(2).normalize();
    Ok([
        Candidate { rotation: r1, translation: t },
        Candidate { rotation: r1, translation: -t },
        Candidate { rotation: r2, translation: t },
        Candidate { rotation: r2, translation: -t },
    ])
}

/// Depths of a correspondence in the first and second cameras,
/// triangulated by least squares on `d2 * p2 = d1 * R * p1 + t`.
/// Returns `None` for parallel rays.
pub fn triangulate(candidate: &Candidate, p1: &Point2, p2: &Point2) -> Option<(Float, Float)> {
    let a = candidate.rotation * p1.to_homogeneous();
    let b = -p2.to_homogeneous();
    let t = candidate.translation;
    let (aa, ab, bb) = (a.dot(&a), a.dot(&b), b.dot(&b));
    let det = aa * bb - ab * ab;
    if det <= 1e-12 * aa * bb {
        return None;
    }
    let (at, bt) = (a.dot(&t), b.dot(&t));
    let d1 = (-bb * at + ab * bt) / det;
    let d2 = (ab * at - aa * bt) / det;
    Some((d1, d2))
}

impl Config {
    /// Decompose the essential matrix of an estimate, using its inliers.
    pub fn decompose(&self, estimate: &Estimate) -> Result<Decomposition, EpipolarError> {
        self.decompose_points(
            &estimate.essential,
            &estimate.first,
            &estimate.second,
            &estimate.inliers,
        )
    }

    /// Decompose an essential matrix, given points in normalized coordinates.
    /// Ties are resolved in favor of the first candidate.
    pub fn decompose_points(
        &self,
        essential: &Mat3,
        first: &[Point2],
        second: &[Point2],
        inliers: &[bool],
    ) -> Result<Decomposition, EpipolarError> {
        let candidates = candidates(essential)?;
        let supports = candidates.map(|c| self.support(&c, first, second, inliers));
        let mut best = 0;
        for (i, &support) in supports.iter().enumerate() {
            if support > supports[best] {
                best = i;
            }
        }
        let support = supports[best];
        let runner_up = supports
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != best)
            .map(|(_, &s)| s)
            .max()
            .unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let tie = runner_up as Float >= self.tie_ratio * support as Float;
        let ambiguous = support < self.min_support.max(1) || tie;
        let chosen = &candidates[best];
        log::debug!(
            "pose candidate {} supported by {} points (runner-up {})",
            best,
            support,
            runner_up
        );
        Ok(Decomposition {
            motion: RelativeMotion {
                rotation: so3::orthonormalize(&chosen.rotation),
                translation: chosen.translation.normalize(),
            },
            candidate: best,
            support,
            runner_up,
            ambiguous,
        })
    }

    /// Number of inliers in front of both cameras, closer than `max_depth`.
    pub fn support(
        &self,
        candidate: &Candidate,
        first: &[Point2],
        second: &[Point2],
        inliers: &[bool],
    ) -> usize {
        let visible = |d: Float| d > 0.0 && d < self.max_depth;
        first
            .iter()
            .zip(second)
            .zip(inliers)
            .filter(|&(_, &inlier)| inlier)
            .filter_map(|((p1, p2), _)| triangulate(candidate, p1, p2))
            .filter(|&(d1, d2)| visible(d1) && visible(d2))
            .count()
    }
}

// TESTS #############################################################
