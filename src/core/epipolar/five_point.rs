// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Minimal solver of the essential matrix from five correspondences.
//!
//! The 5 epipolar constraints leave a 4 dimensional null space
//! `E = x * E1 + y * E2 + z * E3 + E4`.
//! The 10 cubic essential constraints are then solved with an action matrix
//! (multiplication by `z` in the quotient ring), whose real eigenvectors
//! give up to 10 solutions.

use nalgebra::{linalg::Schur, DMatrix};

use crate::core::epipolar::polynomial::{self, NB_CUBIC};
use crate::misc::type_aliases::{Float, Mat3, Point2};

/// Number of correspondences of a minimal sample.
pub const SAMPLE_SIZE: usize = 5;

/// Eigenvalues with a relative imaginary part above this are discarded.
const IMAGINARY_TOLERANCE: Float = 1e-10;

/// Coefficients of `E` (row major) in the epipolar constraint `p2^T * E * p1 = 0`.
#[rustfmt::skip]
pub fn epipolar_row(p1: &Point2, p2: &Point2) -> [Float; 9] {
    [
        p2.x * p1.x, p2.x * p1.y, p2.x,
        p2.y * p1.x, p2.y * p1.y, p2.y,
        p1.x,        p1.y,        1.0,
    ]
}

/// All essential matrices compatible with five correspondences in normalized coordinates.
///
/// Returned matrices have a unit Frobenius norm.
/// The result is empty if the sample is degenerate.
pub fn solve(first: &[Point2; SAMPLE_SIZE], second: &[Point2; SAMPLE_SIZE]) -> Vec<Mat3> {
    let basis = match null_space(first, second) {
        Some(basis) => basis,
        None => return Vec::new(),
    };

    // Gauss-Jordan elimination of the cubic monomials.
    let constraints = polynomial::essential_constraints(&basis);
    let system = DMatrix::from_fn(10, 20, |r, c| constraints[r].coefs[c]);
    let cubic = system.columns(0, NB_CUBIC).into_owned();
    let rest = system.columns(NB_CUBIC, 20 - NB_CUBIC).into_owned();
    let reduced = match cubic.lu().solve(&(-rest)) {
        Some(reduced) => reduced,
        None => return Vec::new(),
    };

    let action = action_matrix(&reduced);
    let eigenvalues = match Schur::try_new(action.clone(), Float::EPSILON, 1000) {
        Some(schur) => schur.complex_eigenvalues(),
        None => return Vec::new(),
    };

    let [e1, e2, e3, e4] = basis;
    eigenvalues
        .iter()
        .filter(|lambda| lambda.im.abs() <= IMAGINARY_TOLERANCE * (1.0 + lambda.re.abs()))
        .filter_map(|lambda| {
            let b = eigenvector(&action, lambda.re)?;
            let x = b[6] / b[9];
            let y = b[7] / b[9];
            let z = b[8] / b[9];
            let e = e1 * x + e2 * y + e3 * z + e4;
            let norm = e.norm();
            if norm.is_finite() && norm > 0.0 {
                Some(e / norm)
            } else {
                None
            }
        })
        .collect()
}

/// Four matrices spanning the null space of the 5 epipolar constraints.
fn null_space(first: &[Point2; SAMPLE_SIZE], second: &[Point2; SAMPLE_SIZE]) -> Option<[Mat3; 4]> {
    // Padded with zero rows to get the full right singular basis.
    let mut a = DMatrix::<Float>::zeros(9, 9);
    for (i, (p1, p2)) in first.iter().zip(second.iter()).enumerate() {
        for (j, coef) in epipolar_row(p1, p2).iter().enumerate() {
            a[(i, j)] = *coef;
        }
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let s = svd.singular_values;
    let mut order: Vec<usize> = (0..9).collect();
    order.sort_by(|&i, &j| s[i].total_cmp(&s[j]));
    let basis_matrix = |k: usize| Mat3::from_fn(|r, c| v_t[(order[k], 3 * r + c)]);
    Some([
        basis_matrix(0),
        basis_matrix(1),
        basis_matrix(2),
        basis_matrix(3),
    ])
}

/// Matrix `A` of the multiplication by `z`, such that `z * b = A * b`
/// for the monomial basis `b = [x^2, xy, xz, y^2, yz, z^2, x, y, z, 1]`.
///
/// `reduced` expresses each cubic monomial in the basis `b`.
fn action_matrix(reduced: &DMatrix<Float>) -> DMatrix<Float> {
    let mut action = DMatrix::zeros(10, 10);
    // z * [x^2, xy, xz, y^2, yz, z^2] = [x^2z, xyz, xz^2, y^2z, yz^2, z^3]
    for (row, &cubic) in [2, 4, 5, 7, 8, 9].iter().enumerate() {
        action.row_mut(row).copy_from(&reduced.row(cubic));
    }
    // z * [x, y, z, 1] = [xz, yz, z^2, z]
    for &(row, col) in [(6, 2), (7, 4), (8, 5), (9, 8)].iter() {
        action[(row, col)] = 1.0;
    }
    action
}

/// Eigenvector of `mat` for a real eigenvalue, normalized so that its last entry is 1.
fn eigenvector(mat: &DMatrix<Float>, eigenvalue: Float) -> Option<Vec<Float>> {
    let n = mat.nrows();
    let shifted = mat - DMatrix::<Float>::identity(n, n) * eigenvalue;
    let svd = shifted.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd.singular_values.imin();
    let v = v_t.row(smallest);
    if v[n - 1].abs() < 1e-12 {
        return None;
    }
    Some(v.iter().map(|x| x / v[n - 1]).collect())
}

// TESTS #############################################################
