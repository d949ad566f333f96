// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Guiding trait to implement iterative optimization algorithms.

/// Indicates if iterations should continue or stop.
/// Returned by the `stop_criterion` function.
pub enum Continue {
    /// Stop iterations.
    Stop,
    /// Continue iterations.
    Forward,
}

/// Skeleton of an iterative solver (Gauss-Newton, Levenberg-Marquardt, ...).
///
/// * `Observations`: the data used as reference during evaluations.
/// * `EvalState`: result of the evaluation of a new model.
///   It may be partial, to short-circuit computations of a model
///   that is going to be rejected anyway.
/// * `Model`: the model being optimized.
/// * `Error`: reason of a failed step computation.
pub trait OptimizerState<Observations, EvalState, Model, Error>
where
    Self: std::marker::Sized,
{
    /// Initialize the optimizer state.
    fn init(obs: &Observations, model: Model) -> Self;

    /// Compute the next model from the current optimizer state.
    /// An error stops the iterations and is forwarded by `iterative_solve`.
    fn step(&self) -> Result<Model, Error>;

    /// Evaluate a new model.
    fn eval(&self, obs: &Observations, new_model: Model) -> EvalState;

    /// Decide if iterations should continue.
    /// Also returns the state kept for the next iteration, or returned if we stop.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue);

    /// Iteratively solve the optimization problem
    /// with the functions provided by the trait implementation.
    /// Returns the final state and the number of iterations.
    fn iterative_solve(obs: &Observations, initial_model: Model) -> Result<(Self, usize), Error> {
        let mut state = Self::init(obs, initial_model);
        let mut nb_iter = 0;
        loop {
            nb_iter += 1;
            let new_model = state.step()?;
            let eval_state = state.eval(obs, new_model);
            let (kept_state, continuation) = state.stop_criterion(nb_iter, eval_state);
            state = kept_state;
            if let Continue::Stop = continuation {
                return Ok((state, nb_iter));
            }
        }
    }
}
