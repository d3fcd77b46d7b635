//! Rigid-body flight dynamics.
//!
//! A [`PhysicsModel`] integrates one vehicle's translational and rotational
//! state with an adaptive ODE solver. Forces come from a list of
//! [`BaseDynamics`] contributors (aerodynamics, engines, landing gear, ...)
//! that are summed inside the vector field.
//!
//! ## Step lifecycle
//!
//! ```text
//! initialize_simulation_step(dt)          once per do_sim_step
//!   for each substep:
//!     pre_simulation_step(h)
//!     compute_force_and_moment(x) * N      x in [0, h], many calls per substep
//!     post_simulation_step(h)
//! ```
//!
//! `compute_force_and_moment` takes `&self`: contributors may only change
//! their own state in the pre/post hooks, never during a derivative
//! evaluation, or the solver sees discontinuous forces.

pub mod aero;
pub mod frames;
pub mod ground;
pub mod model;
pub mod thrust;

pub use aero::{AeroCoefficients, AeroDynamics, Atmosphere};
pub use ground::{GroundCollisionDynamics, GroundContact};
pub use model::{MassProperties, PhysicsModel, RigidBodyState};
pub use thrust::ThrustDynamics;

use glam::{DQuat, DVec3};
use std::ops::{Add, AddAssign};

/// Standard gravity, m/s^2.
pub const GRAVITY: f64 = 9.806;

/// Force and moment in body axes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceMoment {
    pub force: DVec3,
    pub moment: DVec3,
}

impl ForceMoment {
    pub const ZERO: Self = Self { force: DVec3::ZERO, moment: DVec3::ZERO };

    pub fn new(force: DVec3, moment: DVec3) -> Self {
        Self { force, moment }
    }

    /// A force applied at `point` (body axes, relative to the center of mass).
    pub fn at_point(force: DVec3, point: DVec3) -> Self {
        Self { force, moment: point.cross(force) }
    }
}

impl Add for ForceMoment {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self { force: self.force + rhs.force, moment: self.moment + rhs.moment }
    }
}

impl AddAssign for ForceMoment {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.moment += rhs.moment;
    }
}

/// Terrain information sampled once per substep under the vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundInfo {
    /// Terrain elevation directly below the center of mass.
    pub elevation: f64,
    /// Unit terrain normal in local axes.
    pub normal: DVec3,
    /// Reference point on the terrain plane, local axes.
    pub point: DVec3,
    pub near_ground: bool,
}

impl Default for GroundInfo {
    fn default() -> Self {
        Self { elevation: 0.0, normal: DVec3::Z, point: DVec3::ZERO, near_ground: false }
    }
}

impl GroundInfo {
    /// Signed height of `p` (local axes) above the terrain plane.
    pub fn height_above(&self, p: DVec3) -> f64 {
        self.normal.dot(p - self.point)
    }
}

/// Read-only view of a body's kinematic state at one instant of a substep.
#[derive(Debug, Clone, Copy)]
pub struct Kinematics {
    pub position_local: DVec3,
    pub velocity_body: DVec3,
    pub angular_velocity_body: DVec3,
    /// Body-to-local rotation.
    pub attitude: DQuat,
    pub mass: f64,
    pub ground: GroundInfo,
}

impl Kinematics {
    pub fn velocity_local(&self) -> DVec3 {
        self.attitude * self.velocity_body
    }

    pub fn local_to_body(&self, v: DVec3) -> DVec3 {
        self.attitude.inverse() * v
    }

    pub fn body_to_local(&self, v: DVec3) -> DVec3 {
        self.attitude * v
    }

    pub fn altitude(&self) -> f64 {
        self.position_local.z
    }
}

/// A contributor of body-frame forces and moments.
///
/// Implementations are independent structs; the physics model holds them as
/// trait objects and never needs to know their concrete type.
pub trait BaseDynamics: Send + Sync {
    fn name(&self) -> &str;

    /// Called once per `do_sim_step`, before any substep.
    fn initialize_simulation_step(&mut self, _dt: f64, _kinematics: &Kinematics) {}

    /// Called before each substep; latch inputs here.
    fn pre_simulation_step(&mut self, _dt: f64, _kinematics: &Kinematics) {}

    /// Force and moment at time `x` within the current substep.
    fn compute_force_and_moment(&self, x: f64, kinematics: &Kinematics) -> ForceMoment;

    /// Called after each substep; publish outputs here.
    fn post_simulation_step(&mut self, _dt: f64, _kinematics: &Kinematics) {}
}
