// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Robust estimation of the essential matrix with RANSAC and the five-point solver.
//!
//! Minimal samples are drawn sequentially from a seeded generator
//! and evaluated in parallel by batches.
//! Results are merged in sample order, keeping the first best hypothesis,
//! so the selected model only depends on the seed.
//! Each new best hypothesis is refitted on its consensus set
//! before its support drives the adaptive number of samples.

use nalgebra::DMatrix;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use rayon::prelude::*;

use crate::core::camera::Intrinsics;
use crate::core::epipolar::{self, five_point, EpipolarError};
use crate::misc::helper;
use crate::misc::type_aliases::{Float, Mat2, Mat3, Point2, Vec2};

/// Maximum number of least squares refits of a hypothesis.
const MAX_REFITS: usize = 5;

/// Minimum number of correspondences of the linear least squares fit.
const LINEAR_SAMPLE_SIZE: usize = 8;

/// Configuration of the estimator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum Sampson distance of an inlier, in pixels.
    pub threshold_px: Float,
    /// Stop when the probability of having drawn an outlier free sample reaches this.
    pub confidence: Float,
    /// Maximum number of minimal samples.
    pub max_iterations: usize,
    /// Number of samples evaluated in parallel between two stop checks.
    pub batch_size: usize,
    /// Seed of the sampling random generator.
    pub seed: u64,
    /// Below this median displacement (in pixels), the motion is not observable.
    pub min_parallax_px: Float,
    /// Points are degenerate if their spread along some direction is below this (in pixels).
    pub min_spread_px: Float,
    /// Minimum ratio of inliers of the selected model.
    pub min_inlier_ratio: Float,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold_px: 1.0,
            confidence: 0.999,
            max_iterations: 1000,
            batch_size: 32,
            seed: 0,
            min_parallax_px: 1.0,
            min_spread_px: 1.0,
            min_inlier_ratio: 0.2,
        }
    }
}

/// Essential matrix estimated from two views.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// Essential matrix with singular values `(s, s, 0)` and unit Frobenius norm.
    pub essential: Mat3,
    /// One flag per correspondence, true for inliers.
    pub inliers: Vec<bool>,
    /// Number of inliers.
    pub nb_inliers: usize,
    /// Number of minimal samples drawn.
    pub nb_iterations: usize,
    /// Points of the first view, in normalized coordinates.
    pub first: Vec<Point2>,
    /// Points of the second view, in normalized coordinates.
    pub second: Vec<Point2>,
}

impl Config {
    /// Estimate the essential matrix such that `second^T * E * first = 0`,
    /// from index-aligned pixel correspondences.
    pub fn estimate(
        &self,
        intrinsics: &Intrinsics,
        first: &[Point2],
        second: &[Point2],
    ) -> Result<Estimate, EpipolarError> {
        self.check_configuration(first, second)?;
        let nb_points = first.len();
        let first: Vec<_> = first.iter().map(|&p| intrinsics.normalize(p)).collect();
        let second: Vec<_> = second.iter().map(|&p| intrinsics.normalize(p)).collect();
        let threshold = (self.threshold_px / intrinsics.mean_focal()).powi(2);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<(Mat3, usize)> = None;
        let mut nb_iterations = 0;
        let mut max_iterations = self.max_iterations;
        while nb_iterations < max_iterations {
            let batch = self.batch_size.max(1).min(max_iterations - nb_iterations);
            let samples: Vec<Vec<usize>> = (0..batch)
                .map(|_| index::sample(&mut rng, nb_points, five_point::SAMPLE_SIZE).into_vec())
                .collect();
            let hypotheses: Vec<Option<(Mat3, usize)>> = samples
                .par_iter()
                .map(|sample| best_of_sample(sample, &first, &second, threshold))
                .collect();
            for (e, count) in hypotheses.into_iter().flatten() {
                if best.as_ref().map_or(true, |&(_, best_count)| count > best_count) {
                    best = Some(refit(e, count, &first, &second, threshold));
                }
            }
            nb_iterations += batch;
            if let Some((_, count)) = best {
                #[allow(clippy::cast_precision_loss)]
                let ratio = count as Float / nb_points as Float;
                let required = required_iterations(self.confidence, ratio, self.max_iterations);
                max_iterations = max_iterations.min(required);
            }
        }

        let (e, _) = best.ok_or(EpipolarError::NoModel)?;
        let essential = epipolar::project_essential(&e)?;
        let inliers: Vec<bool> = first
            .iter()
            .zip(second.iter())
            .map(|(p1, p2)| sampson_distance(&essential, p1, p2) < threshold)
            .collect();
        let nb_inliers = inliers.iter().filter(|&&inlier| inlier).count();
        let required = self.required_inliers(nb_points);
        if nb_inliers < required {
            return Err(EpipolarError::InsufficientInliers {
                inliers: nb_inliers,
                required,
            });
        }
        log::debug!(
            "essential matrix: {} / {} inliers after {} samples",
            nb_inliers,
            nb_points,
            nb_iterations
        );
        Ok(Estimate {
            essential,
            inliers,
            nb_inliers,
            nb_iterations,
            first,
            second,
        })
    }

    /// Minimum number of inliers for a given number of correspondences.
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn required_inliers(&self, nb_points: usize) -> usize {
        let from_ratio = (self.min_inlier_ratio * nb_points as Float).ceil() as usize;
        from_ratio.max(five_point::SAMPLE_SIZE)
    }

    /// Reject configurations where the essential matrix is not observable.
    fn check_configuration(&self, first: &[Point2], second: &[Point2]) -> Result<(), EpipolarError> {
        if first.len() != second.len() {
            return Err(EpipolarError::LengthMismatch {
                first: first.len(),
                second: second.len(),
            });
        }
        if first.len() < five_point::SAMPLE_SIZE {
            return Err(EpipolarError::NotEnoughPoints(first.len()));
        }
        let min_variance = self.min_spread_px * self.min_spread_px;
        for (view, points) in [(1, first), (2, second)].iter() {
            if min_spread_variance(points) < min_variance {
                return Err(EpipolarError::DegenerateConfiguration { view: *view });
            }
        }
        let mut displacements: Vec<Float> = first
            .iter()
            .zip(second)
            .map(|(p1, p2)| (p2 - p1).norm())
            .collect();
        let median_px = helper::median(&mut displacements).unwrap_or(0.0);
        if median_px < self.min_parallax_px {
            return Err(EpipolarError::InsufficientParallax { median_px });
        }
        Ok(())
    }
}

/// Solve a minimal sample and keep its solution with the most inliers.
fn best_of_sample(
    sample: &[usize],
    first: &[Point2],
    second: &[Point2],
    threshold: Float,
) -> Option<(Mat3, usize)> {
    let sample_first = std::array::from_fn(|k| first[sample[k]]);
    let sample_second = std::array::from_fn(|k| second[sample[k]]);
    let mut best: Option<(Mat3, usize)> = None;
    for e in five_point::solve(&sample_first, &sample_second) {
        let count = count_inliers(&e, first, second, threshold);
        if best.as_ref().map_or(true, |&(_, best_count)| count > best_count) {
            best = Some((e, count));
        }
    }
    best
}

/// Refit a hypothesis on its inliers until its support stops growing.
fn refit(
    e: Mat3,
    count: usize,
    first: &[Point2],
    second: &[Point2],
    threshold: Float,
) -> (Mat3, usize) {
    let mut best = (e, count);
    for _ in 0..MAX_REFITS {
        let inliers: Vec<usize> = (0..first.len())
            .filter(|&i| sampson_distance(&best.0, &first[i], &second[i]) < threshold)
            .collect();
        let fitted = match least_squares(&inliers, first, second) {
            Some(fitted) => fitted,
            None => break,
        };
        let fitted_count = count_inliers(&fitted, first, second, threshold);
        if fitted_count < best.1 {
            break;
        }
        let grew = fitted_count > best.1;
        best = (fitted, fitted_count);
        if !grew {
            break;
        }
    }
    best
}

/// Essential matrix minimizing the algebraic epipolar error of the selected correspondences.
fn least_squares(selected: &[usize], first: &[Point2], second: &[Point2]) -> Option<Mat3> {
    if selected.len() < LINEAR_SAMPLE_SIZE {
        return None;
    }
    // Padded with zero rows to get the full right singular basis.
    let mut a = DMatrix::<Float>::zeros(selected.len().max(9), 9);
    for (row, &i) in selected.iter().enumerate() {
        for (col, coef) in five_point::epipolar_row(&first[i], &second[i]).iter().enumerate() {
            a[(row, col)] = *coef;
        }
    }
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd.singular_values.imin();
    let e = Mat3::from_fn(|r, c| v_t[(smallest, 3 * r + c)]);
    epipolar::project_essential(&e).ok()
}

fn count_inliers(e: &Mat3, first: &[Point2], second: &[Point2], threshold: Float) -> usize {
    first
        .iter()
        .zip(second)
        .filter(|(p1, p2)| sampson_distance(e, p1, p2) < threshold)
        .count()
}

/// Squared Sampson distance of a correspondence to the epipolar geometry `p2^T * E * p1 = 0`.
pub fn sampson_distance(e: &Mat3, p1: &Point2, p2: &Point2) -> Float {
    let x1 = p1.to_homogeneous();
    let x2 = p2.to_homogeneous();
    let e_x1 = e * x1;
    let et_x2 = e.transpose() * x2;
    let numerator = x2.dot(&e_x1);
    let denominator =
        e_x1.x * e_x1.x + e_x1.y * e_x1.y + et_x2.x * et_x2.x + et_x2.y * et_x2.y;
    if denominator > 0.0 {
        numerator * numerator / denominator
    } else {
        Float::INFINITY
    }
}

/// Number of samples needed to draw an outlier free one with the given confidence.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn required_iterations(confidence: Float, inlier_ratio: Float, max_iterations: usize) -> usize {
    let good_sample = inlier_ratio.powi(five_point::SAMPLE_SIZE as i32);
    if good_sample >= 1.0 {
        return 1;
    }
    let nb = (1.0 - confidence).ln() / (1.0 - good_sample).ln();
    if nb.is_finite() && nb >= 0.0 {
        (nb.ceil() as usize).clamp(1, max_iterations.max(1))
    } else {
        max_iterations
    }
}

/// Smallest eigenvalue of the covariance of a set of points.
#[allow(clippy::cast_precision_loss)]
fn min_spread_variance(points: &[Point2]) -> Float {
    let nb = points.len() as Float;
    let mean = points.iter().fold(Vec2::zeros(), |acc, p| acc + p.coords) / nb;
    let covariance = points.iter().fold(Mat2::zeros(), |acc, p| {
        let d = p.coords - mean;
        acc + d * d.transpose()
    }) / nb;
    helper::min_eigenvalue(&covariance)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::math::so3::hat;
    use crate::misc::synthetic::{self, KITTI_00};
    use crate::misc::type_aliases::{Iso3, Vec3};
    use approx;

    fn driving_motion() -> Iso3 {
        Iso3::new(Vec3::new(0.05, -0.02, 1.0), Vec3::new(0.01, 0.03, -0.005))
    }

    fn true_essential(motion: &Iso3) -> Mat3 {
        let e = hat(motion.translation.vector) * motion.rotation.to_rotation_matrix().matrix();
        e / e.norm()
    }

    #[test]
    fn rejects_outliers() {
        let motion = driving_motion();
        let mut scene = synthetic::scene(7, 200, &motion);
        let outliers = synthetic::corrupt(11, 0.3, &mut scene.second);
        let estimate = Config::default()
            .estimate(&KITTI_00, &scene.first, &scene.second)
            .expect("well conditioned scene");

        // Rank 2 with unit norm.
        let (_, s, _) = epipolar::sorted_svd(&estimate.essential).unwrap();
        assert!(s[2].abs() < 1e-9);
        approx::assert_relative_eq!(1.0, estimate.essential.norm(), epsilon = 1e-9);
        approx::assert_relative_eq!(
            1.0,
            estimate.essential.dot(&true_essential(&motion)).abs(),
            epsilon = 1e-6
        );

        // Every true inlier is kept, almost no outlier.
        assert_eq!(scene.first.len(), estimate.inliers.len());
        let missed = estimate
            .inliers
            .iter()
            .zip(&outliers)
            .filter(|&(&inlier, &outlier)| !inlier && !outlier)
            .count();
        let accepted = estimate
            .inliers
            .iter()
            .zip(&outliers)
            .filter(|&(&inlier, &outlier)| inlier && outlier)
            .count();
        assert_eq!(0, missed);
        assert!(accepted <= 3);
        assert!(estimate.nb_iterations < 1000);
    }

    #[test]
    fn deterministic_with_fixed_seed() {
        let mut scene = synthetic::scene(3, 150, &driving_motion());
        synthetic::corrupt(5, 0.4, &mut scene.second);
        let config = Config {
            seed: 42,
            ..Config::default()
        };
        let a = config.estimate(&KITTI_00, &scene.first, &scene.second);
        let b = config.estimate(&KITTI_00, &scene.first, &scene.second);
        assert!(a.is_ok());
        assert_eq!(a, b);
    }

    #[test]
    fn not_enough_points() {
        let scene = synthetic::scene(1, 4, &driving_motion());
        let result = Config::default().estimate(&KITTI_00, &scene.first, &scene.second);
        assert_eq!(Err(EpipolarError::NotEnoughPoints(4)), result);
    }

    #[test]
    fn mismatched_lengths() {
        let scene = synthetic::scene(1, 10, &driving_motion());
        let result = Config::default().estimate(&KITTI_00, &scene.first, &scene.second[1..]);
        assert_eq!(
            Err(EpipolarError::LengthMismatch {
                first: 10,
                second: 9
            }),
            result
        );
    }

    #[test]
    fn collinear_points() {
        let first: Vec<_> = (0..20)
            .map(|i| Point2::new(100.0 + 10.0 * Float::from(i), 150.0))
            .collect();
        let second: Vec<_> = first.iter().map(|p| p + Vec2::new(3.0, 4.0)).collect();
        let result = Config::default().estimate(&KITTI_00, &first, &second);
        assert_eq!(
            Err(EpipolarError::DegenerateConfiguration { view: 1 }),
            result
        );
    }

    #[test]
    fn static_camera_has_no_parallax() {
        let scene = synthetic::scene(2, 50, &driving_motion());
        let result = Config::default().estimate(&KITTI_00, &scene.first, &scene.first);
        assert_eq!(
            Err(EpipolarError::InsufficientParallax { median_px: 0.0 }),
            result
        );
    }

    #[test]
    fn random_points_have_too_few_inliers() {
        let mut scene = synthetic::scene(4, 100, &driving_motion());
        synthetic::corrupt(8, 1.0, &mut scene.second);
        let result = Config::default().estimate(&KITTI_00, &scene.first, &scene.second);
        assert!(matches!(
            result,
            Err(EpipolarError::InsufficientInliers { .. })
        ));
    }

    #[test]
    fn sampson_distance_of_exact_correspondence() {
        let motion = driving_motion();
        let scene = synthetic::scene(9, 10, &motion);
        let e = true_essential(&motion);
        for (p1, p2) in scene.first.iter().zip(&scene.second) {
            let d = sampson_distance(&e, &KITTI_00.normalize(*p1), &KITTI_00.normalize(*p2));
            assert!(d < 1e-20);
        }
    }

    #[test]
    fn least_squares_recovers_exact_geometry() {
        let motion = driving_motion();
        let scene = synthetic::scene(13, 40, &motion);
        let first: Vec<_> = scene.first.iter().map(|&p| KITTI_00.normalize(p)).collect();
        let second: Vec<_> = scene.second.iter().map(|&p| KITTI_00.normalize(p)).collect();
        let all: Vec<usize> = (0..first.len()).collect();
        let e = least_squares(&all, &first, &second).unwrap();
        approx::assert_relative_eq!(1.0, e.dot(&true_essential(&motion)).abs(), epsilon = 1e-8);
        assert_eq!(None, least_squares(&all[..7], &first, &second));
    }

    #[test]
    fn refit_completes_a_perturbed_hypothesis() {
        let motion = driving_motion();
        let scene = synthetic::scene(17, 200, &motion);
        let first: Vec<_> = scene.first.iter().map(|&p| KITTI_00.normalize(p)).collect();
        let second: Vec<_> = scene.second.iter().map(|&p| KITTI_00.normalize(p)).collect();
        let threshold = (1.0 / KITTI_00.mean_focal()).powi(2);
        let tilted = Iso3::new(
            motion.translation.vector + Vec3::new(0.03, 0.0, 0.0),
            motion.rotation.scaled_axis(),
        );
        let rough = true_essential(&tilted);
        let rough_count = count_inliers(&rough, &first, &second, threshold);
        assert!(rough_count < 200);
        let (e, count) = refit(rough, rough_count, &first, &second, threshold);
        assert_eq!(200, count);
        approx::assert_relative_eq!(1.0, e.dot(&true_essential(&motion)).abs(), epsilon = 1e-8);
    }

    #[test]
    fn adaptive_number_of_iterations() {
        assert_eq!(1, required_iterations(0.999, 1.0, 1000));
        assert_eq!(1000, required_iterations(0.999, 0.0, 1000));
        assert_eq!(146, required_iterations(0.99, 0.5, 1000));
        assert_eq!(1000, required_iterations(0.999, 0.1, 1000));
    }
}
