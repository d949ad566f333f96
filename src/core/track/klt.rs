// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pyramidal Lucas-Kanade (KLT) tracking of image points.
//!
//! Each point's neighborhood in the previous frame is searched in the current frame,
//! starting at the coarsest pyramid level.
//! The displacement found at one level is doubled to initialize the next finer level.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::core::multires::{self, Pyramid};
use crate::core::track::lk_optimizer::{LKOptimizerState, Obs};
use crate::math::optimizer::OptimizerState;
use crate::misc::helper;
use crate::misc::type_aliases::{Float, Mat2, Point2, Vec2};

/// Configuration of the tracker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of levels in the multi-resolution pyramids of images.
    pub nb_levels: usize,
    /// The tracking window is `2 * half_window + 1` pixels wide.
    pub half_window: usize,
    /// Maximum number of Gauss-Newton iterations per level.
    pub max_iterations: usize,
    /// Convergence threshold on the step norm, in pixels of the level.
    pub epsilon: Float,
    /// Minimum eigenvalue of the window structure tensor, divided by the window area.
    pub min_eigenvalue: Float,
    /// Maximum mean absolute intensity residual of a tracked window.
    pub max_residual: Float,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nb_levels: 4,
            half_window: 10,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigenvalue: 0.1,
            max_residual: 30.0,
        }
    }
}

/// A successfully tracked point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tracked {
    /// Position in the current frame.
    pub position: Point2,
    /// Mean absolute intensity residual of the window.
    pub residual: Float,
}

/// Reason of a lost track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lost {
    /// Not enough texture around the point.
    LowTexture,
    /// Normal equations could not be solved.
    Singular,
    /// The point left the image.
    OutOfBounds,
    /// The tracked window differs too much from the template.
    HighResidual,
}

impl Config {
    /// Build the pyramid of a frame, with the number of levels used for tracking.
    pub fn pyramid(&self, img: DMatrix<u8>) -> Pyramid {
        Pyramid::new(self.nb_levels, img)
    }

    /// Track points from the previous frame into the current frame.
    /// Results are in the same order than the points.
    pub fn track(
        &self,
        previous: &Pyramid,
        current: &Pyramid,
        points: &[Point2],
    ) -> Vec<Result<Tracked, Lost>> {
        let offsets = self.window_offsets();
        points
            .par_iter()
            .map(|&p| self.track_point(previous, current, &offsets, p))
            .collect()
    }

    /// Track a single point, with the given window offsets.
    pub fn track_point(
        &self,
        previous: &Pyramid,
        current: &Pyramid,
        offsets: &[Vec2],
        point: Point2,
    ) -> Result<Tracked, Lost> {
        if !helper::in_bounds(point.x, point.y, previous.base().shape()) {
            return Err(Lost::OutOfBounds);
        }
        let nb_levels = previous.nb_levels().min(current.nb_levels());
        let mut displacement = Vec2::zeros();
        let mut residual = Float::INFINITY;
        for level in (0..nb_levels).rev() {
            match (
                self.refine(previous, current, offsets, level, point, displacement),
                level,
            ) {
                (Ok((d, r)), _) => {
                    displacement = d;
                    residual = r;
                }
                (Err(lost), 0) => return Err(lost),
                // Coarser levels only provide an initialization.
                (Err(_), _) => (),
            }
            if level > 0 {
                displacement *= 2.0;
            }
        }
        if residual > self.max_residual {
            return Err(Lost::HighResidual);
        }
        Ok(Tracked {
            position: point + displacement,
            residual,
        })
    }

    /// Refine the displacement of a point at one pyramid level.
    /// Returns the new displacement and the mean absolute residual.
    #[allow(clippy::cast_precision_loss)]
    fn refine(
        &self,
        previous: &Pyramid,
        current: &Pyramid,
        offsets: &[Vec2],
        level: usize,
        point: Point2,
        displacement: Vec2,
    ) -> Result<(Vec2, Float), Lost> {
        let center = Point2::new(
            multires::coordinate_at_level(point.x, level),
            multires::coordinate_at_level(point.y, level),
        );
        let template_img = &previous.images[level];
        let (gx, gy) = &previous.gradients[level];

        // Template intensities and gradients.
        let mut template = Vec::with_capacity(offsets.len());
        let mut template_gradients = Vec::with_capacity(offsets.len());
        let mut hessian = Mat2::zeros();
        for &offset in offsets {
            let p = center + offset;
            template.push(helper::interpolate(p.x, p.y, template_img));
            let grad = 0.5 * Vec2::new(
                helper::interpolate(p.x, p.y, gx),
                helper::interpolate(p.x, p.y, gy),
            );
            hessian += grad * grad.transpose();
            template_gradients.push(grad);
        }

        // Reject points without enough texture.
        let area = offsets.len() as Float;
        if helper::min_eigenvalue(&hessian) / area < self.min_eigenvalue {
            return Err(Lost::LowTexture);
        }
        let hessian_inv = hessian.try_inverse().ok_or(Lost::Singular)?;

        let obs = Obs {
            image: &current.images[level],
            center,
            offsets,
            template: &template,
            template_gradients: &template_gradients,
            hessian_inv,
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
        };
        let (state, _nb_iter) = LKOptimizerState::iterative_solve(&obs, displacement)?;
        Ok((
            state.eval_data.displacement,
            state.eval_data.mean_abs_residual,
        ))
    }

    /// Offsets of all pixels in the tracking window.
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_possible_wrap)]
    pub fn window_offsets(&self) -> Vec<Vec2> {
        let h = self.half_window as isize;
        (-h..=h)
            .flat_map(|dy| (-h..=h).map(move |dx| Vec2::new(dx as Float, dy as Float)))
            .collect()
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::misc::synthetic;
    use approx;

    fn config(nb_levels: usize) -> Config {
        Config {
            nb_levels,
            ..Config::default()
        }
    }

    #[test]
    fn recovers_subpixel_shift() {
        let config = config(3);
        let previous = config.pyramid(synthetic::texture(120, 160, (0.0, 0.0)));
        let current = config.pyramid(synthetic::texture(120, 160, (3.6, -2.4)));
        let points = vec![
            Point2::new(80.0, 60.0),
            Point2::new(70.5, 50.25),
            Point2::new(95.0, 72.0),
        ];
        let results = config.track(&previous, &current, &points);
        assert_eq!(points.len(), results.len());
        for (p, result) in points.iter().zip(results) {
            let tracked = result.expect("texture should be trackable");
            let expected = *p + Vec2::new(3.6, -2.4);
            approx::assert_abs_diff_eq!(expected, tracked.position, epsilon = 0.1);
            assert!(tracked.residual < 5.0);
        }
    }

    #[test]
    fn static_frame_does_not_move_points() {
        let config = config(4);
        let img = synthetic::texture(120, 160, (0.0, 0.0));
        let pyramid = config.pyramid(img);
        let p = Point2::new(64.0, 48.0);
        let tracked = config
            .track_point(&pyramid, &pyramid, &config.window_offsets(), p)
            .expect("identical frames");
        approx::assert_abs_diff_eq!(p, tracked.position, epsilon = 1e-3);
    }

    #[test]
    fn flat_image_loses_points() {
        let config = config(3);
        let flat = config.pyramid(synthetic::blank(60, 80, 90));
        let results = config.track(&flat, &flat, &[Point2::new(40.0, 30.0)]);
        assert_eq!(vec![Err(Lost::LowTexture)], results);
    }

    #[test]
    fn points_outside_are_lost() {
        let config = config(2);
        let img = config.pyramid(synthetic::texture(60, 80, (0.0, 0.0)));
        let points = [Point2::new(-2.0, 10.0), Point2::new(10.0, 60.0)];
        let results = config.track(&img, &img, &points);
        assert_eq!(vec![Err(Lost::OutOfBounds), Err(Lost::OutOfBounds)], results);
    }

    #[test]
    fn window_size() {
        let offsets = Config::default().window_offsets();
        assert_eq!(21 * 21, offsets.len());
        assert_eq!(Vec2::new(-10.0, -10.0), offsets[0]);
        assert_eq!(Vec2::new(10.0, 10.0), offsets[440]);
    }
}
