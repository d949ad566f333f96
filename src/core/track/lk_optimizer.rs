// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gauss-Newton implementation of the `OptimizerState` trait
//! for the translation of an image patch (Lucas-Kanade).
//!
//! The hessian only depends on the template gradients,
//! so it is computed and inverted once per pyramid level.

use nalgebra::DMatrix;

use crate::core::track::klt::Lost;
use crate::math::optimizer::{Continue, OptimizerState};
use crate::misc::helper;
use crate::misc::type_aliases::{Float, Mat2, Point2, Vec2};

/// State of the Gauss-Newton optimizer.
pub struct LKOptimizerState {
    /// Stop after this number of iterations.
    pub max_iterations: usize,
    /// Stop when the step norm is below this (in pixels).
    pub epsilon: Float,
    /// Inverse of the template hessian.
    pub hessian_inv: Mat2,
    /// Patch center in the tracked image, without displacement.
    pub center: Point2,
    /// (rows, cols) of the tracked image.
    pub shape: (usize, usize),
    /// Data resulting of the last model evaluation.
    pub eval_data: EvalData,
}

/// Data resulting of a model evaluation.
pub struct EvalData {
    /// Displacement of the patch.
    pub displacement: Vec2,
    /// Norm of the step that led to this displacement.
    pub step_norm: Float,
    /// Sum of template gradients weighted by residuals.
    pub gradient: Vec2,
    /// Mean absolute intensity difference between the patch and the template.
    pub mean_abs_residual: Float,
}

/// Precomputed data available for the optimizer iterations.
pub struct Obs<'a> {
    /// Image in which the template is searched.
    pub image: &'a DMatrix<u8>,
    /// Patch center without displacement.
    pub center: Point2,
    /// Offsets of the window pixels relative to the center.
    pub offsets: &'a [Vec2],
    /// Template intensities, one per offset.
    pub template: &'a [Float],
    /// Template gradients, one per offset.
    pub template_gradients: &'a [Vec2],
    /// Inverse of the template hessian.
    pub hessian_inv: Mat2,
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the step norm.
    pub epsilon: Float,
}

impl LKOptimizerState {
    /// Residuals of a displacement, summarized into the gradient and the mean absolute residual.
    #[allow(clippy::cast_precision_loss)]
    fn eval_displacement(obs: &Obs, displacement: Vec2, step_norm: Float) -> EvalData {
        let origin = obs.center + displacement;
        let mut gradient = Vec2::zeros();
        let mut abs_sum = 0.0;
        for ((&offset, &t), &grad) in obs
            .offsets
            .iter()
            .zip(obs.template)
            .zip(obs.template_gradients)
        {
            let p = origin + offset;
            let r = helper::interpolate(p.x, p.y, obs.image) - t;
            gradient += grad * r;
            abs_sum += r.abs();
        }
        EvalData {
            displacement,
            step_norm,
            gradient,
            mean_abs_residual: abs_sum / obs.offsets.len() as Float,
        }
    }
}

impl<'a> OptimizerState<Obs<'a>, EvalData, Vec2, Lost> for LKOptimizerState {
    fn init(obs: &Obs, model: Vec2) -> Self {
        Self {
            max_iterations: obs.max_iterations,
            epsilon: obs.epsilon,
            hessian_inv: obs.hessian_inv,
            center: obs.center,
            shape: obs.image.shape(),
            eval_data: Self::eval_displacement(obs, model, Float::INFINITY),
        }
    }

    /// Gauss-Newton step.
    /// Fails if the new patch center leaves the image.
    fn step(&self) -> Result<Vec2, Lost> {
        let displacement = self.eval_data.displacement - self.hessian_inv * self.eval_data.gradient;
        let p = self.center + displacement;
        if helper::in_bounds(p.x, p.y, self.shape) {
            Ok(displacement)
        } else {
            Err(Lost::OutOfBounds)
        }
    }

    fn eval(&self, obs: &Obs, new_model: Vec2) -> EvalData {
        let step_norm = (new_model - self.eval_data.displacement).norm();
        Self::eval_displacement(obs, new_model, step_norm)
    }

    /// Every step is accepted.
    /// Stop on small steps or after too many iterations.
    fn stop_criterion(self, nb_iter: usize, eval_data: EvalData) -> (Self, Continue) {
        let converged = eval_data.step_norm < self.epsilon;
        let continuation = if converged || nb_iter >= self.max_iterations {
            Continue::Stop
        } else {
            Continue::Forward
        };
        (Self { eval_data, ..self }, continuation)
    }
}
