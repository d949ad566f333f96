// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to compute gradients.

use nalgebra::DMatrix;

/// Centered differences `I(x+1) - I(x-1)` along columns and rows,
/// i.e. twice the horizontal and vertical gradients.
///
/// Borders are replicated, so on the first and last column (row)
/// the difference only spans one pixel.
/// Values are kept exact by not dividing by two.
pub fn centered(img: &DMatrix<u8>) -> (DMatrix<i16>, DMatrix<i16>) {
    (centered_x(img), centered_y(img))
}

/// Centered differences along the horizontal axis (columns).
pub fn centered_x(img: &DMatrix<u8>) -> DMatrix<i16> {
    let (nb_rows, nb_cols) = img.shape();
    DMatrix::from_fn(nb_rows, nb_cols, |r, c| {
        let right = img[(r, (c + 1).min(nb_cols - 1))];
        let left = img[(r, c.saturating_sub(1))];
        i16::from(right) - i16::from(left)
    })
}

/// Centered differences along the vertical axis (rows).
pub fn centered_y(img: &DMatrix<u8>) -> DMatrix<i16> {
    let (nb_rows, nb_cols) = img.shape();
    DMatrix::from_fn(nb_rows, nb_cols, |r, c| {
        let bottom = img[((r + 1).min(nb_rows - 1), c)];
        let top = img[(r.saturating_sub(1), c)];
        i16::from(bottom) - i16::from(top)
    })
}

// TESTS #############################################################
