//! Embedded Runge-Kutta-Cash-Karp 4(5) solver.
//!
//! Six derivative evaluations per trial step yield both a fifth-order result
//! and an embedded fourth-order estimate; their difference is the error.

use super::{
    fixed_step, odeint, scaled_error, AdaptiveStep, NumericalMethod, SolverParams, StepResult,
    VectorField,
};
use crate::error::ConfigError;

const SAFETY: f64 = 0.9;
const PGROW: f64 = -0.2;
const PSHRNK: f64 = -0.25;
/// `(5 / SAFETY)^(1 / PGROW)`.
const ERRCON: f64 = 1.89e-4;
const MAX_GROWTH: f64 = 5.0;
const MAX_SHRINK: f64 = 0.1;

const A2: f64 = 0.2;
const A3: f64 = 0.3;
const A4: f64 = 0.6;
const A5: f64 = 1.0;
const A6: f64 = 0.875;
const B21: f64 = 0.2;
const B31: f64 = 3.0 / 40.0;
const B32: f64 = 9.0 / 40.0;
const B41: f64 = 0.3;
const B42: f64 = -0.9;
const B43: f64 = 1.2;
const B51: f64 = -11.0 / 54.0;
const B52: f64 = 2.5;
const B53: f64 = -70.0 / 27.0;
const B54: f64 = 35.0 / 27.0;
const B61: f64 = 1631.0 / 55296.0;
const B62: f64 = 175.0 / 512.0;
const B63: f64 = 575.0 / 13824.0;
const B64: f64 = 44275.0 / 110592.0;
const B65: f64 = 253.0 / 4096.0;
const C1: f64 = 37.0 / 378.0;
const C3: f64 = 250.0 / 621.0;
const C4: f64 = 125.0 / 594.0;
const C6: f64 = 512.0 / 1771.0;
const DC1: f64 = C1 - 2825.0 / 27648.0;
const DC3: f64 = C3 - 18575.0 / 48384.0;
const DC4: f64 = C4 - 13525.0 / 55296.0;
const DC5: f64 = -277.0 / 14336.0;
const DC6: f64 = C6 - 0.25;

/// Adaptive Cash-Karp solver; the default method for vehicle physics.
#[derive(Debug, Clone)]
pub struct RungeKuttaCK {
    params: SolverParams,
    failed: bool,
    steps: usize,
}

impl Default for RungeKuttaCK {
    fn default() -> Self {
        Self { params: SolverParams::default(), failed: false, steps: 0 }
    }
}

impl RungeKuttaCK {
    pub fn new(params: SolverParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params, failed: false, steps: 0 })
    }
}

/// One Cash-Karp trial step. Returns `(yout, yerr)`.
fn rkck(field: &dyn VectorField, y: &[f64], dydx: &[f64], x: f64, h: f64) -> (Vec<f64>, Vec<f64>) {
    let n = y.len();
    let mut ytemp = vec![0.0; n];
    let mut ak2 = vec![0.0; n];
    let mut ak3 = vec![0.0; n];
    let mut ak4 = vec![0.0; n];
    let mut ak5 = vec![0.0; n];
    let mut ak6 = vec![0.0; n];

    for i in 0..n {
        ytemp[i] = y[i] + B21 * h * dydx[i];
    }
    field.derivative(x + A2 * h, &ytemp, &mut ak2);
    for i in 0..n {
        ytemp[i] = y[i] + h * (B31 * dydx[i] + B32 * ak2[i]);
    }
    field.derivative(x + A3 * h, &ytemp, &mut ak3);
    for i in 0..n {
        ytemp[i] = y[i] + h * (B41 * dydx[i] + B42 * ak2[i] + B43 * ak3[i]);
    }
    field.derivative(x + A4 * h, &ytemp, &mut ak4);
    for i in 0..n {
        ytemp[i] = y[i] + h * (B51 * dydx[i] + B52 * ak2[i] + B53 * ak3[i] + B54 * ak4[i]);
    }
    field.derivative(x + A5 * h, &ytemp, &mut ak5);
    for i in 0..n {
        ytemp[i] = y[i]
            + h * (B61 * dydx[i] + B62 * ak2[i] + B63 * ak3[i] + B64 * ak4[i] + B65 * ak5[i]);
    }
    field.derivative(x + A6 * h, &ytemp, &mut ak6);

    let yout = (0..n)
        .map(|i| y[i] + h * (C1 * dydx[i] + C3 * ak3[i] + C4 * ak4[i] + C6 * ak6[i]))
        .collect();
    let yerr = (0..n)
        .map(|i| h * (DC1 * dydx[i] + DC3 * ak3[i] + DC4 * ak4[i] + DC5 * ak5[i] + DC6 * ak6[i]))
        .collect();
    (yout, yerr)
}

struct CashKarp;

impl AdaptiveStep for CashKarp {
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
        let mut h = htry;
        loop {
            let (yout, yerr) = rkck(field, y, dydx, x, h);
            let errmax = scaled_error(&yerr, yscal, params.precision);

            if errmax <= 1.0 || h <= params.hmin {
                y.copy_from_slice(&yout);
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

impl NumericalMethod for RungeKuttaCK {
    fn quick_solve(&self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        fixed_step(field, y0, t0, dt)
    }

    fn enhanced_solve(&mut self, field: &dyn VectorField, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        let outcome = odeint(&CashKarp, field, y0, t0, dt, &self.params);
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
