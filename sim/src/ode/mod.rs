//! Ordinary differential equation solvers.
//!
//! A [`VectorField`] describes `dy/dt = f(t, y)` for a fixed-dimension state
//! vector. A [`NumericalMethod`] advances a state through a field, either with
//! a single fixed RK4 step (`quick_solve`) or with adaptive error-controlled
//! stepping (`enhanced_solve`). [`DynamicalSystem`] binds the two together.
//!
//! ## Solver variants
//!
//! - [`RungeKutta2`]: quality-controlled RK4 using step doubling.
//! - [`RungeKuttaCK`]: embedded Runge-Kutta-Cash-Karp 4(5).
//!
//! Both share the same driver loop (`odeint`) and differ only in how a
//! single trial step estimates its truncation error.

pub mod cash_karp;
pub mod dynamical_system;
pub mod runge_kutta;

pub use cash_karp::RungeKuttaCK;
pub use dynamical_system::DynamicalSystem;
pub use runge_kutta::RungeKutta2;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Added to the error scale so that components passing through zero do not
/// demand infinite relative accuracy.
const TINY: f64 = 1.0e-30;

/// Right-hand side of `dy/dt = f(t, y)`.
pub trait VectorField {
    /// Number of state variables. Fixed for the lifetime of the field.
    fn dimension(&self) -> usize;

    /// Evaluate `f(t, y)` into `dydt`. Both slices have length `dimension()`.
    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]);
}

impl<F: VectorField + ?Sized> VectorField for &F {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        (**self).derivative(t, y, dydt)
    }
}

impl<F: VectorField + ?Sized> VectorField for Box<F> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        (**self).derivative(t, y, dydt)
    }
}

/// Tuning parameters shared by the adaptive solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Target relative error per step.
    pub precision: f64,
    /// Absolute floor added to the error scale of every component.
    pub abs_tolerance: f64,
    /// Smallest step the adaptive driver will take.
    pub hmin: f64,
    /// First trial step, as a fraction of the requested interval.
    pub initial_step: f64,
    /// Maximum number of accepted substeps per `enhanced_solve` call.
    pub max_steps: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            precision: 1.0e-5,
            abs_tolerance: 1.0e-9,
            hmin: 1.0e-7,
            initial_step: 0.5,
            max_steps: 1000,
        }
    }
}

impl SolverParams {
    /// Reject parameter sets the adaptive driver cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.precision > 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "solver precision must be positive (got {})",
                self.precision
            )));
        }
        if !(self.abs_tolerance >= 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "solver abs_tolerance must be non-negative (got {})",
                self.abs_tolerance
            )));
        }
        if !(self.hmin >= 0.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "solver hmin must be non-negative (got {})",
                self.hmin
            )));
        }
        if !(self.initial_step > 0.0 && self.initial_step <= 1.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "solver initial_step must be in (0, 1] (got {})",
                self.initial_step
            )));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::InvalidParameter(
                "solver max_steps must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// An integration scheme for a [`VectorField`].
///
/// The trait is object safe so that physics models can hold a
/// `Box<dyn NumericalMethod + Send + Sync>` chosen at configuration time.
pub trait NumericalMethod {
    /// One fixed RK4 step from `t0` to `t0 + dt`, no error control.
    fn quick_solve(&self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64>;

    /// Adaptive integration from `t0` to `t0 + dt`.
    ///
    /// Always returns a state. If the substep limit was reached the result
    /// is the best estimate so far and [`failed`](Self::failed) is true.
    fn enhanced_solve(&mut self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64>;

    /// Whether the last `enhanced_solve` ran out of substeps.
    fn failed(&self) -> bool;

    /// Number of accepted substeps taken by the last `enhanced_solve`.
    fn steps_taken(&self) -> usize;

    fn params(&self) -> &SolverParams;
}

impl<M: NumericalMethod + ?Sized> NumericalMethod for &mut M {
    fn quick_solve(&self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        (**self).quick_solve(field, y0, t0, dt)
    }

    fn enhanced_solve(&mut self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        (**self).enhanced_solve(field, y0, t0, dt)
    }

    fn failed(&self) -> bool {
        (**self).failed()
    }

    fn steps_taken(&self) -> usize {
        (**self).steps_taken()
    }

    fn params(&self) -> &SolverParams {
        (**self).params()
    }
}

/// Classic fourth-order Runge-Kutta step of size `h` given `dydx = f(x, y)`.
pub(crate) fn rk4(field: &dyn VectorField, y: &[f64], dydx: &[f64], x: f64, h: f64) -> Vec<f64> {
    let n = y.len();
    let hh = 0.5 * h;
    let h6 = h / 6.0;
    let xh = x + hh;

    let mut yt: Vec<f64> = (0..n).map(|i| y[i] + hh * dydx[i]).collect();
    let mut dyt = vec![0.0; n];
    field.derivative(xh, &yt, &mut dyt);

    for i in 0..n {
        yt[i] = y[i] + hh * dyt[i];
    }
    let mut dym = vec![0.0; n];
    field.derivative(xh, &yt, &mut dym);

    for i in 0..n {
        yt[i] = y[i] + h * dym[i];
        dym[i] += dyt[i];
    }
    field.derivative(x + h, &yt, &mut dyt);

    (0..n)
        .map(|i| y[i] + h6 * (dydx[i] + dyt[i] + 2.0 * dym[i]))
        .collect()
}

/// Fixed-step RK4 over `[t0, t0 + dt]`; shared `quick_solve` body.
pub(crate) fn fixed_step(field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
    if !(dt > 0.0) {
        return y0.to_vec();
    }
    let mut dydx = vec![0.0; y0.len()];
    field.derivative(t0, y0, &mut dydx);
    rk4(field, y0, &dydx, t0, dt)
}

/// Outcome of one quality-controlled trial step.
pub(crate) struct StepResult {
    /// Step size actually taken.
    pub hdid: f64,
    /// Suggested size of the next step.
    pub hnext: f64,
}

/// A single adaptive step: advance `y` in place from `x` by at most `htry`.
pub(crate) trait AdaptiveStep {
    fn step(
        &self,
        field: &dyn VectorField,
        y: &mut [f64],
        dydx: &[f64],
        x: f64,
        htry: f64,
        yscal: &[f64],
        params: &SolverParams,
    ) -> StepResult;
}

/// Outcome of a driver run.
pub(crate) struct OdeintOutcome {
    pub y: Vec<f64>,
    pub steps: usize,
    pub failed: bool,
}

/// Adaptive driver: integrate from `t0` to `t0 + dt` with the given stepper.
pub(crate) fn odeint<S: AdaptiveStep>(
    stepper: &S,
    field: &dyn VectorField,
    y0: &[f64],
    t0: f64,
    dt: f64,
    params: &SolverParams,
) -> OdeintOutcome {
    let n = y0.len();
    let mut y = y0.to_vec();
    if !(dt > 0.0) {
        return OdeintOutcome { y, steps: 0, failed: false };
    }

    let t1 = t0 + dt;
    let mut x = t0;
    let mut h = (dt * params.initial_step).max(params.hmin);
    let mut dydx = vec![0.0; n];
    let mut yscal = vec![0.0; n];
    let floor = params.abs_tolerance.max(TINY);

    for nstp in 0..params.max_steps {
        field.derivative(x, &y, &mut dydx);
        for i in 0..n {
            yscal[i] = y[i].abs() + (dydx[i] * h).abs() + floor;
        }
        // Do not step past the end of the interval.
        if x + h > t1 {
            h = t1 - x;
        }
        let result = stepper.step(field, &mut y, &dydx, x, h, &yscal, params);
        x += result.hdid;
        if x >= t1 || (t1 - x) <= f64::EPSILON * t1.abs().max(1.0) {
            return OdeintOutcome { y, steps: nstp + 1, failed: false };
        }
        h = result.hnext.max(params.hmin);
    }

    OdeintOutcome { y, steps: params.max_steps, failed: true }
}

/// Largest scaled error component of a trial step.
pub(crate) fn scaled_error(yerr: &[f64], yscal: &[f64], precision: f64) -> f64 {
    yerr.iter()
        .zip(yscal)
        .map(|(e, s)| (e / s).abs())
        .fold(0.0, f64::max)
        / precision
}
