//! Binding of a vector field to an integration method.

use super::{NumericalMethod, RungeKuttaCK, VectorField};

/// A vector field paired with the method that integrates it.
///
/// Ownership of the field is expressed through `F`: pass the field by value
/// (or boxed) for a system that owns its model, or pass `&field` to borrow a
/// model shared with other code. The same holds for the method `M`.
pub struct DynamicalSystem<F, M = RungeKuttaCK> {
    field: F,
    method: M,
}

impl<F: VectorField> DynamicalSystem<F, RungeKuttaCK> {
    /// Bind `field` to a default Cash-Karp solver.
    pub fn new(field: F) -> Self {
        Self { field, method: RungeKuttaCK::default() }
    }
}

impl<F: VectorField, M: NumericalMethod> DynamicalSystem<F, M> {
    pub fn with_method(field: F, method: M) -> Self {
        Self { field, method }
    }

    pub fn dimension(&self) -> usize {
        self.field.dimension()
    }

    /// Advance `y0` from `t0` to `t0 + dt` with adaptive stepping.
    ///
    /// Callers must check [`failed`](Self::failed) afterwards.
    pub fn flow(&mut self, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        debug_assert_eq!(y0.len(), self.field.dimension());
        self.method.enhanced_solve(&self.field, y0, t0, dt)
    }

    /// Advance with a single fixed step.
    pub fn quick_flow(&self, y0: &[f64], t0: f64, dt: f64) -> Vec<f64> {
        self.method.quick_solve(&self.field, y0, t0, dt)
    }

    pub fn failed(&self) -> bool {
        self.method.failed()
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut F {
        &mut self.field
    }

    pub fn method(&self) -> &M {
        &self.method
    }

    /// Release the field and method.
    pub fn into_parts(self) -> (F, M) {
        (self.field, self.method)
    }
}
