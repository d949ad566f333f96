// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Polynomials of degree at most 3 in three unknowns `(x, y, z)`,
//! used to express the essential matrix constraints of the five-point solver.

use std::ops::{Add, Mul, Sub};

use crate::misc::type_aliases::{Float, Mat3};

/// Exponents `(x, y, z)` of the 20 monomials.
///
/// The 10 cubic monomials come first, followed by the basis
/// `[x^2, xy, xz, y^2, yz, z^2, x, y, z, 1]` used by the action matrix.
#[rustfmt::skip]
pub const MONOMIALS: [(u8, u8, u8); 20] = [
    (3, 0, 0), (2, 1, 0), (2, 0, 1), (1, 2, 0), (1, 1, 1),
    (1, 0, 2), (0, 3, 0), (0, 2, 1), (0, 1, 2), (0, 0, 3),
    (2, 0, 0), (1, 1, 0), (1, 0, 1), (0, 2, 0), (0, 1, 1),
    (0, 0, 2), (1, 0, 0), (0, 1, 0), (0, 0, 1), (0, 0, 0),
];

/// Number of cubic monomials, leading the coefficients.
pub const NB_CUBIC: usize = 10;

/// Position of a monomial in `MONOMIALS`.
pub fn monomial_index(exponents: (u8, u8, u8)) -> Option<usize> {
    MONOMIALS.iter().position(|&m| m == exponents)
}

/// Polynomial with coefficients ordered as `MONOMIALS`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Poly3 {
    /// Coefficients.
    pub coefs: [Float; 20],
}

impl Poly3 {
    /// Null polynomial.
    pub fn zero() -> Self {
        Self { coefs: [0.0; 20] }
    }

    /// `cx * x + cy * y + cz * z + c`.
    pub fn linear(cx: Float, cy: Float, cz: Float, c: Float) -> Self {
        let mut p = Self::zero();
        p.coefs[16] = cx;
        p.coefs[17] = cy;
        p.coefs[18] = cz;
        p.coefs[19] = c;
        p
    }

    /// Evaluate the polynomial.
    #[cfg(test)]
    fn eval(&self, x: Float, y: Float, z: Float) -> Float {
        MONOMIALS
            .iter()
            .zip(self.coefs.iter())
            .map(|(&(i, j, k), c)| {
                c * x.powi(i32::from(i)) * y.powi(i32::from(j)) * z.powi(i32::from(k))
            })
            .sum()
    }
}

impl Add for Poly3 {
    type Output = Self;
    fn add(mut self, other: Self) -> Self {
        self.coefs
            .iter_mut()
            .zip(other.coefs.iter())
            .for_each(|(a, b)| *a += b);
        self
    }
}

impl Sub for Poly3 {
    type Output = Self;
    fn sub(mut self, other: Self) -> Self {
        self.coefs
            .iter_mut()
            .zip(other.coefs.iter())
            .for_each(|(a, b)| *a -= b);
        self
    }
}

impl Mul<Float> for Poly3 {
    type Output = Self;
    fn mul(mut self, s: Float) -> Self {
        self.coefs.iter_mut().for_each(|a| *a *= s);
        self
    }
}

/// Product of polynomials, terms of degree above 3 are dropped.
/// Only used on products known to stay within degree 3.
impl Mul for Poly3 {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        let mut out = Self::zero();
        for (&(ax, ay, az), &a) in MONOMIALS.iter().zip(self.coefs.iter()) {
            if a == 0.0 {
                continue;
            }
            for (&(bx, by, bz), &b) in MONOMIALS.iter().zip(other.coefs.iter()) {
                if b == 0.0 {
                    continue;
                }
                if let Some(idx) = monomial_index((ax + bx, ay + by, az + bz)) {
                    out.coefs[idx] += a * b;
                }
            }
        }
        out
    }
}

/// 3x3 matrix of polynomials, row major.
type PolyMat3 = [[Poly3; 3]; 3];

fn mat_mul(a: &PolyMat3, b: &PolyMat3) -> PolyMat3 {
    let mut out = [[Poly3::zero(); 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, entry) in row.iter_mut().enumerate() {
            *entry = (0..3).fold(Poly3::zero(), |acc, k| acc + a[r][k] * b[k][c]);
        }
    }
    out
}

fn transpose(a: &PolyMat3) -> PolyMat3 {
    let mut out = [[Poly3::zero(); 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, entry) in row.iter_mut().enumerate() {
            *entry = a[c][r];
        }
    }
    out
}

fn determinant(a: &PolyMat3) -> Poly3 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

/// The 10 cubic constraints on `E = x * E1 + y * E2 + z * E3 + E4`:
/// `det(E) = 0` and the 9 entries of `2 * E * E^T * E - tr(E * E^T) * E = 0`.
pub fn essential_constraints(basis: &[Mat3; 4]) -> [Poly3; 10] {
    let [e1, e2, e3, e4] = basis;
    let mut e = [[Poly3::zero(); 3]; 3];
    for (r, row) in e.iter_mut().enumerate() {
        for (c, entry) in row.iter_mut().enumerate() {
            *entry = Poly3::linear(e1[(r, c)], e2[(r, c)], e3[(r, c)], e4[(r, c)]);
        }
    }
    let eet = mat_mul(&e, &transpose(&e));
    let eete = mat_mul(&eet, &e);
    let trace = eet[0][0] + eet[1][1] + eet[2][2];

    let mut constraints = [Poly3::zero(); 10];
    constraints[0] = determinant(&e);
    for r in 0..3 {
        for c in 0..3 {
            constraints[1 + 3 * r + c] = eete[r][c] * 2.0 - trace * e[r][c];
        }
    }
    constraints
}

// TESTS #############################################################
