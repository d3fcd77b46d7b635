//! Quality-controlled fourth-order Runge-Kutta.
//!
//! Each trial step is taken twice: once as a full step and once as two half
//! steps. The difference between the two estimates the truncation error and
//! is also used to lift the result to fifth order.

use super::{
    fixed_step, odeint, rk4, scaled_error, AdaptiveStep, NumericalMethod, SolverParams,
    StepResult, VectorField,
};
use crate::error::ConfigError;

const SAFETY: f64 = 0.9;
const PGROW: f64 = -0.20;
const PSHRNK: f64 = -0.25;
/// `(4 / SAFETY)^(1 / PGROW)`: below this error the step grows by the cap.
const ERRCON: f64 = 6.0e-4;
const MAX_GROWTH: f64 = 4.0;
const MAX_SHRINK: f64 = 0.1;
/// Richardson extrapolation factor for a fourth-order method.
const FCOR: f64 = 1.0 / 15.0;

/// Step-doubling RK4 solver.
#[derive(Debug, Clone)]
pub struct RungeKutta2 {
    params: SolverParams,
    failed: bool,
    steps: usize,
}

impl Default for RungeKutta2 {
    fn default() -> Self {
        Self { params: SolverParams::default(), failed: false, steps: 0 }
    }
}

impl RungeKutta2 {
    pub fn new(params: SolverParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params, failed: false, steps: 0 })
    }
}

struct StepDoubling;

impl AdaptiveStep for StepDoubling {
    fn step(
        &self,
        field: &dyn VectorField,
        y: &mut [f64],
        dydx: &[f64],
        x: f64,
        htry: f64,
        yscal: &[f64],
        params: &SolverParams,
    ) -> StepResult {
        let n = y.len();
        let ysav = y.to_vec();
        let mut h = htry;
        let mut dym = vec![0.0; n];

        loop {
            let hh = 0.5 * h;
            let ymid = rk4(field, &ysav, dydx, x, hh);
            field.derivative(x + hh, &ymid, &mut dym);
            let yhalf = rk4(field, &ymid, &dym, x + hh, hh);
            let yfull = rk4(field, &ysav, dydx, x, h);

            let ytemp: Vec<f64> = (0..n).map(|i| yhalf[i] - yfull[i]).collect();
            let errmax = scaled_error(&ytemp, yscal, params.precision);
            let at_floor = h <= params.hmin;

            if errmax <= 1.0 || at_floor {
                for i in 0..n {
                    y[i] = yhalf[i] + ytemp[i] * FCOR;
                }
                let hnext = if errmax > ERRCON {
                    SAFETY * h * errmax.powf(PGROW)
                } else {
                    MAX_GROWTH * h
                };
                return StepResult { hdid: h, hnext };
            }

            let shrunk = SAFETY * h * errmax.powf(PSHRNK);
            h = shrunk.max(MAX_SHRINK * h).max(params.hmin);
        }
    }
}

impl NumericalMethod for RungeKutta2 {
    fn quick_solve(&self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        fixed_step(field, y0, t0, dt)
    }

    fn enhanced_solve(&mut self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        let outcome = odeint(&StepDoubling, field, y0, t0, dt, &self.params);
        self.failed = outcome.failed;
        self.steps = outcome.steps;
        outcome.y
    }

    fn failed(&self) -> bool {
        self.failed
    }

    fn steps_taken(&self) -> usize {
        self.steps
    }

    fn params(&self) -> &SolverParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ode::test_fields::*;

    #[test]
    fn test_exponential_decay_matches_analytic() {
        let mut solver = RungeKutta2::default();
        let field = Decay { k: 1.5 };
        for &dt in &[0.01, 0.1, 0.5, 1.0, 2.0] {
            let y = solver.enhanced_solve(&field, &[2.0], 0.0, dt);
            let expected = 2.0 * (-1.5 * dt).exp();
            assert!(!solver.failed());
            assert!(
                ((y[0] - expected) / expected).abs() < 100.0 * solver.params().precision,
                "dt={} got {} expected {}",
                dt,
                y[0],
                expected
            );
        }
    }

    #[test]
    fn test_free_fall_both_entry_points() {
        let mut solver = RungeKutta2::default();
        let quick = solver.quick_solve(&FreeFall, &[0.0, 0.0], 0.0, 1.0);
        let enhanced = solver.enhanced_solve(&FreeFall, &[0.0, 0.0], 0.0, 1.0);
        for y in [quick, enhanced] {
            assert!((y[0] + 4.9).abs() < 1e-6);
            assert!((y[1] + 9.8).abs() < 1e-6);
        }
        assert!(!solver.failed());
    }

    #[test]
    fn test_zero_dt_is_identity() {
        let mut solver = RungeKutta2::default();
        let y0 = [1.0, 2.0];
        assert_eq!(solver.enhanced_solve(&FreeFall, &y0, 3.0, 0.0), y0.to_vec());
        assert_eq!(solver.quick_solve(&FreeFall, &y0, 3.0, 0.0), y0.to_vec());
        assert_eq!(solver.steps_taken(), 0);
    }

    #[test]
    fn test_step_limit_sets_failed() {
        let params = SolverParams {
            precision: 1.0e-12,
            abs_tolerance: 0.0,
            hmin: 1.0e-9,
            initial_step: 0.001,
            max_steps: 3,
        };
        let mut solver = RungeKutta2::new(params).unwrap();
        let y = solver.enhanced_solve(&Oscillator { omega: 20.0 }, &[1.0, 0.0], 0.0, 5.0);
        assert!(solver.failed());
        assert_eq!(y.len(), 2);
        assert!(y.iter().all(|v| v.is_finite()));

        // A subsequent well-conditioned solve clears the flag.
        solver.enhanced_solve(&FreeFall, &[0.0, 0.0], 0.0, 0.0);
        assert!(!solver.failed());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = SolverParams { precision: 0.0, ..Default::default() };
        assert!(RungeKutta2::new(params).is_err());
    }
}
