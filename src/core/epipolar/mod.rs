// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Two-view epipolar geometry: essential matrix estimation and decomposition.
//!
//! Points are related by `x2^T * E * x1 = 0`, in normalized image coordinates,
//! with `E = hat(t) * R` where `(R, t)` maps first camera coordinates
//! into second camera coordinates: `X2 = R * X1 + t`.

use thiserror::Error;

use crate::misc::type_aliases::{Float, Mat3, Vec3};

pub mod decomposition;
pub mod five_point;
pub mod polynomial;
pub mod ransac;

/// Reasons why no reliable epipolar geometry could be estimated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EpipolarError {
    /// Both views must have the same number of points.
    #[error("{first} points in the first view but {second} in the second")]
    LengthMismatch {
        /// Number of points in the first view.
        first: usize,
        /// Number of points in the second view.
        second: usize,
    },
    /// Not enough point correspondences were provided.
    #[error("need at least 5 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    /// Points are coincident or collinear in one of the views.
    #[error("points of view {view} are coincident or collinear")]
    DegenerateConfiguration {
        /// 1 for the first view, 2 for the second.
        view: usize,
    },
    /// Points barely moved between the two views.
    #[error("median displacement of {median_px:.3} px is too small")]
    InsufficientParallax {
        /// Median displacement, in pixels.
        median_px: Float,
    },
    /// The best model explains too few correspondences.
    #[error("only {inliers} inliers, {required} required")]
    InsufficientInliers {
        /// Number of inliers of the best model.
        inliers: usize,
        /// Minimum number of inliers.
        required: usize,
    },
    /// No minimal sample produced an essential matrix.
    #[error("ransac failed to find any essential matrix")]
    NoModel,
    /// Singular value decomposition failed.
    #[error("svd failed in epipolar estimation")]
    SvdFailed,
}

/// Singular value decomposition `(U, S, V^T)` with decreasing singular values.
pub fn sorted_svd(mat: &Mat3) -> Result<(Mat3, Vec3, Mat3), EpipolarError> {
    let svd = mat.svd(true, true);
    let u = svd.u.ok_or(EpipolarError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(EpipolarError::SvdFailed)?;
    let s = svd.singular_values;
    let mut order = [0, 1, 2];
    order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));
    let [i, j, k] = order;
    Ok((
        Mat3::from_columns(&[u.column(i), u.column(j), u.column(k)]),
        Vec3::new(s[i], s[j], s[k]),
        Mat3::from_rows(&[v_t.row(i), v_t.row(j), v_t.row(k)]),
    ))
}

/// Closest essential matrix, with singular values `(1, 1, 0)` scaled to unit Frobenius norm.
pub fn project_essential(mat: &Mat3) -> Result<Mat3, EpipolarError> {
    let (u, _, v_t) = sorted_svd(mat)?;
    let s = Mat3::from_diagonal(&Vec3::new(1.0, 1.0, 0.0));
    Ok(u * s * v_t / Float::sqrt(2.0))
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    #[test]
    fn svd_is_sorted() {
        let mat = Mat3::from_diagonal(&Vec3::new(1.0, 5.0, 3.0));
        let (u, s, v_t) = sorted_svd(&mat).unwrap();
        approx::assert_relative_eq!(Vec3::new(5.0, 3.0, 1.0), s, epsilon = 1e-12);
        approx::assert_relative_eq!(mat, u * Mat3::from_diagonal(&s) * v_t, epsilon = 1e-12);
    }

    #[test]
    fn projection_on_essential_manifold() {
        let mat = Mat3::new(1.0, 2.0, 0.5, -1.0, 0.3, 2.0, 0.7, 0.1, -0.4);
        let e = project_essential(&mat).unwrap();
        let (_, s, _) = sorted_svd(&e).unwrap();
        approx::assert_relative_eq!(1.0, e.norm(), epsilon = 1e-12);
        approx::assert_relative_eq!(s[0], s[1], epsilon = 1e-12);
        assert!(s[2].abs() < 1e-12);
    }
}
