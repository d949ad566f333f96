// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! FAST-9 corner detection.
//!
//! A pixel is a corner if 9 contiguous pixels of the 16 pixels Bresenham circle
//! of radius 3 around it are all brighter, or all darker,
//! than the center by more than a fixed threshold.
//! Corners are then filtered with a 3x3 non-maximum suppression on their score.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::misc::type_aliases::{Float, Point2};

/// Offsets `(dx, dy)` of the 16 pixels circle, clockwise starting on top.
#[rustfmt::skip]
const CIRCLE: [(isize, isize); 16] = [
    ( 0, -3), ( 1, -3), ( 2, -2), ( 3, -1),
    ( 3,  0), ( 3,  1), ( 2,  2), ( 1,  3),
    ( 0,  3), (-1,  3), (-2,  2), (-3,  1),
    (-3,  0), (-3, -1), (-2, -2), (-1, -3),
];

/// Number of contiguous pixels required on the circle.
const ARC_LENGTH: usize = 9;

/// Corners closer than this to the image border are never detected.
pub const BORDER: usize = 3;

/// Configuration of the corner detector.
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimal intensity difference between the center and the arc pixels.
    pub threshold: u8,
    /// Keep only the strongest corners if there are more than this.
    pub max_corners: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 10,
            max_corners: Some(3000),
        }
    }
}

/// A detected corner, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corner {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
    /// Corner strength, used for non-maximum suppression.
    pub score: u32,
}

impl Corner {
    /// Position of the corner as a floating point pixel.
    #[allow(clippy::cast_precision_loss)]
    pub fn position(&self) -> Point2 {
        Point2::new(self.x as Float, self.y as Float)
    }
}

impl Config {
    /// Detect corners, ordered from strongest to weakest.
    pub fn detect(&self, img: &DMatrix<u8>) -> Vec<Corner> {
        let scores = score_map(self.threshold, img);
        let mut corners = non_maximum_suppression(&scores);
        // Stable sort: equal scores stay in scan order.
        corners.sort_by(|a, b| b.score.cmp(&a.score));
        if let Some(max_corners) = self.max_corners {
            corners.truncate(max_corners);
        }
        corners
    }
}

/// Corner score of every pixel, zero where the segment test fails.
pub fn score_map(threshold: u8, img: &DMatrix<u8>) -> DMatrix<u32> {
    let (nb_rows, nb_cols) = img.shape();
    let mut scores = DMatrix::zeros(nb_rows, nb_cols);
    if nb_rows <= 2 * BORDER || nb_cols <= 2 * BORDER {
        return scores;
    }
    let rows: Vec<Vec<(usize, u32)>> = (BORDER..nb_rows - BORDER)
        .into_par_iter()
        .map(|y| {
            (BORDER..nb_cols - BORDER)
                .filter_map(|x| segment_score(threshold, img, x, y).map(|s| (x, s)))
                .collect()
        })
        .collect();
    for (y, row) in (BORDER..).zip(rows) {
        for (x, score) in row {
            scores[(y, x)] = score;
        }
    }
    scores
}

/// Segment test at one pixel, returning the corner score if it passes.
///
/// The score is the largest of the summed absolute differences (minus threshold)
/// over the brighter pixels and over the darker pixels of the circle.
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
pub fn segment_score(threshold: u8, img: &DMatrix<u8>, x: usize, y: usize) -> Option<u32> {
    let center = i32::from(img[(y, x)]);
    let t = i32::from(threshold);
    let pixel = |k: usize| {
        let (dx, dy) = CIRCLE[k];
        i32::from(img[((y as isize + dy) as usize, (x as isize + dx) as usize)])
    };

    // Any arc of 9 contains at least 2 of the 4 compass pixels.
    let compass = [pixel(0), pixel(4), pixel(8), pixel(12)];
    let nb_bright = compass.iter().filter(|&&p| p > center + t).count();
    let nb_dark = compass.iter().filter(|&&p| p < center - t).count();
    if nb_bright < 2 && nb_dark < 2 {
        return None;
    }

    let mut bright_mask = 0_u32;
    let mut dark_mask = 0_u32;
    let mut bright_sum = 0_u32;
    let mut dark_sum = 0_u32;
    for k in 0..16 {
        let p = pixel(k);
        if p > center + t {
            bright_mask |= 1 << k;
            bright_sum += (p - center - t) as u32;
        } else if p < center - t {
            dark_mask |= 1 << k;
            dark_sum += (center - p - t) as u32;
        }
    }

    let bright = has_arc(bright_mask);
    let dark = has_arc(dark_mask);
    match (bright, dark) {
        (false, false) => None,
        _ => Some(bright_sum.max(dark_sum)),
    }
}

/// Check if a 16 bits circular mask contains `ARC_LENGTH` contiguous ones.
fn has_arc(mask: u32) -> bool {
    let doubled = mask | (mask << 16);
    let mut run = doubled;
    for shift in 1..ARC_LENGTH {
        run &= doubled >> shift;
    }
    run != 0
}

/// Keep the corners whose score is maximal in their 3x3 neighborhood.
///
/// On equal scores, the first pixel in scan order (row by row) wins,
/// so a plateau keeps exactly one corner.
pub fn non_maximum_suppression(scores: &DMatrix<u32>) -> Vec<Corner> {
    let (nb_rows, nb_cols) = scores.shape();
    let mut corners = Vec::new();
    for y in 0..nb_rows {
        for x in 0..nb_cols {
            let score = scores[(y, x)];
            if score == 0 {
                continue;
            }
            let is_max = neighbors(x, y, nb_rows, nb_cols).all(|(nx, ny)| {
                let other = scores[(ny, nx)];
                if (ny, nx) < (y, x) {
                    score > other
                } else {
                    score >= other
                }
            });
            if is_max {
                corners.push(Corner { x, y, score });
            }
        }
    }
    corners
}

/// The (up to) 8 neighbors of a pixel.
fn neighbors(
    x: usize,
    y: usize,
    nb_rows: usize,
    nb_cols: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let xs = x.saturating_sub(1)..=(x + 1).min(nb_cols - 1);
    let ys = y.saturating_sub(1)..=(y + 1).min(nb_rows - 1);
    ys.flat_map(move |ny| xs.clone().map(move |nx| (nx, ny)))
        .filter(move |&(nx, ny)| (nx, ny) != (x, y))
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::misc::synthetic;

    #[test]
    fn arcs() {
        assert!(has_arc(0b1_1111_1111));
        assert!(!has_arc(0b1111_1111));
        // Wrapping around the circle.
        assert!(has_arc(0xF81F));
        assert!(has_arc(0xF80F));
        assert!(!has_arc(0xF00F));
    }

    #[test]
    fn square_corners() {
        let mut img = DMatrix::repeat(60, 60, 20_u8);
        img.view_mut((20, 20), (10, 10)).fill(200);
        let mut found: Vec<_> = Config::default()
            .detect(&img)
            .iter()
            .map(|c| (c.x, c.y))
            .collect();
        found.sort_unstable();
        assert_eq!(vec![(20, 20), (20, 29), (29, 20), (29, 29)], found);
    }

    #[test]
    fn flat_image_has_no_corner() {
        let img = synthetic::blank(50, 80, 128);
        assert!(Config::default().detect(&img).is_empty());
    }

    #[test]
    fn dark_square_on_bright_background() {
        let mut img = DMatrix::repeat(40, 40, 220_u8);
        img.view_mut((10, 12), (8, 8)).fill(30);
        assert_eq!(4, Config::default().detect(&img).len());
    }

    #[test]
    fn strongest_corners_are_kept() {
        let img = synthetic::squares(160, 320, 8, 16);
        let all = Config {
            threshold: 10,
            max_corners: None,
        }
        .detect(&img);
        assert_eq!(4 * 10 * 20, all.len());
        let capped = Config {
            threshold: 10,
            max_corners: Some(50),
        }
        .detect(&img);
        assert_eq!(50, capped.len());
        assert!(capped.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn tiny_image() {
        let img = DMatrix::repeat(5, 5, 0_u8);
        assert!(Config::default().detect(&img).is_empty());
    }
}
