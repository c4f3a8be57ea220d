//! Objective-agnostic first-order minimizer with momentum and step halving.

use tracing::debug;

/// A scalar cost with an analytic gradient over a flat parameter vector.
pub trait DifferentiableObjective {
    fn dimension(&self) -> usize;

    fn cost(&self, params: &[f64]) -> f64;

    /// Write the gradient at `params` into `grad` (length [`Self::dimension`]).
    fn gradient(&self, params: &[f64], grad: &mut [f64]);

    /// Turn a gradient into the descent direction, in place. The mapping must
    /// be positive definite so the direction still lowers the cost.
    fn precondition(&self, _grad: &mut [f64]) {}
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescentParams {
    /// Initial step size along the negative gradient.
    pub step: f64,
    /// Stop once the step has been halved below this.
    pub min_step: f64,
    /// Stop once an accepted step improves the cost by less than this.
    pub min_diff: f64,
    pub max_iters: usize,
    /// Momentum factor; 0 disables momentum.
    pub inertia: f64,
}

/// Why the descent stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    StepBelowMinimum,
    CostChangeBelowMinimum,
    /// Iteration budget exhausted; the last iterate is a best-effort result.
    MaxIterations,
}

#[derive(Clone, Debug)]
pub struct DescentOutcome {
    pub params: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    /// Number of cost evaluations, including the starting point.
    pub evaluations: usize,
    pub stop: StopReason,
    /// Cost at the start point followed by the cost of every accepted step.
    pub cost_history: Vec<f64>,
}

impl DescentOutcome {
    pub fn converged(&self) -> bool {
        self.stop != StopReason::MaxIterations
    }
}

/// Minimize `objective` starting from `initial`.
///
/// Each iteration tries `x - step * grad + inertia * momentum`, where `grad`
/// has passed through [`DifferentiableObjective::precondition`]. An improving
/// trial is accepted; otherwise the step is halved and momentum dropped,
/// without moving.
pub fn optimize<O>(initial: Vec<f64>, objective: &O, params: &DescentParams) -> DescentOutcome
where
    O: DifferentiableObjective + ?Sized,
{
    let n = initial.len();
    let mut x = initial;
    let mut cost = objective.cost(&x);
    let mut evaluations = 1;
    let mut cost_history = vec![cost];

    if params.step < params.min_step || params.max_iters == 0 {
        let stop = if params.max_iters == 0 {
            StopReason::MaxIterations
        } else {
            StopReason::StepBelowMinimum
        };
        return DescentOutcome {
            params: x,
            cost,
            iterations: 0,
            evaluations,
            stop,
            cost_history,
        };
    }

    let mut grad = vec![0.0; n];
    objective.gradient(&x, &mut grad);
    objective.precondition(&mut grad);

    let mut momentum = vec![0.0; n];
    let mut trial = vec![0.0; n];
    let mut step = params.step;
    let mut iterations = 0;

    let stop = loop {
        if iterations >= params.max_iters {
            break StopReason::MaxIterations;
        }
        iterations += 1;

        for i in 0..n {
            trial[i] = x[i] - step * grad[i] + params.inertia * momentum[i];
        }
        let trial_cost = objective.cost(&trial);
        evaluations += 1;

        if trial_cost < cost {
            let improvement = cost - trial_cost;
            for i in 0..n {
                momentum[i] = trial[i] - x[i];
            }
            std::mem::swap(&mut x, &mut trial);
            cost = trial_cost;
            cost_history.push(cost);

            if improvement < params.min_diff {
                break StopReason::CostChangeBelowMinimum;
            }
            objective.gradient(&x, &mut grad);
            objective.precondition(&mut grad);
        } else {
            step *= 0.5;
            momentum.iter_mut().for_each(|m| *m = 0.0);
            if step < params.min_step {
                break StopReason::StepBelowMinimum;
            }
        }
    };

    debug!(
        iterations,
        evaluations,
        cost,
        stop = ?stop,
        "Gradient descent finished"
    );

    DescentOutcome {
        params: x,
        cost,
        iterations,
        evaluations,
        stop,
        cost_history,
    }
}
