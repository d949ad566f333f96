// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image and matrix types.

use image::{DynamicImage, GrayImage, Luma};
use nalgebra::DMatrix;

/// Convert an `u8` matrix into a `GrayImage`.
/// Inverse operation of `matrix_from_image`.
///
/// Performs a transposition to accomodate for the
/// column major matrix into the row major image.
#[allow(clippy::cast_possible_truncation)]
pub fn image_from_matrix(mat: &DMatrix<u8>) -> GrayImage {
    let (nb_rows, nb_cols) = mat.shape();
    let mut img_buf = GrayImage::new(nb_cols as u32, nb_rows as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        *pixel = Luma([mat[(y as usize, x as usize)]]);
    }
    img_buf
}

/// Convert a `GrayImage` into an `u8` matrix.
/// Inverse operation of `image_from_matrix`.
pub fn matrix_from_image(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Frame of any decoded image, converted to 8 bits luminance when needed.
pub fn frame_from_image(img: DynamicImage) -> DMatrix<u8> {
    match img {
        DynamicImage::ImageLuma8(gray) => matrix_from_image(gray),
        other => matrix_from_image(other.into_luma8()),
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn matrix_image_round_trip_keeps_layout() {
        let mat = DMatrix::from_fn(3, 5, |r, c| (10 * r + c) as u8);
        let img = image_from_matrix(&mat);
        assert_eq!((5, 3), img.dimensions());
        assert_eq!(Luma([21]), *img.get_pixel(1, 2));
        assert_eq!(mat, matrix_from_image(img));
    }

    #[test]
    fn color_frames_become_luminance() {
        let rgb = image::RgbImage::from_pixel(4, 2, image::Rgb([200, 200, 200]));
        let frame = frame_from_image(DynamicImage::ImageRgb8(rgb));
        assert_eq!((2, 4), frame.shape());
        assert!(frame.iter().all(|&v| (199..=200).contains(&v)));
    }
}
