//! Rigid-body physics model driven by an adaptive ODE solver.

use super::{BaseDynamics, ForceMoment, GroundCollisionDynamics, GroundInfo, Kinematics, GRAVITY};
use crate::error::ConfigError;
use crate::ode::{NumericalMethod, RungeKuttaCK, VectorField};
use crate::physics::frames;
use crate::terrain::Terrain;
use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Position (3), body velocity (3), body angular velocity (3), attitude (4).
pub const STATE_DIMENSION: usize = 13;

/// Multiplier applied to the angular velocity after every substep. Bleeds
/// off energy that the integrator would otherwise inject into rotation.
pub const ANGULAR_DAMPING: f64 = 0.999;

/// Mass and inertia in body axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    pub mass: f64,
    pub inertia: DMat3,
    pub inertia_inv: DMat3,
}

impl MassProperties {
    /// Build from a body-axes inertia tensor.
    pub fn new(mass: f64, inertia: DMat3) -> Result<Self, ConfigError> {
        if !(mass > 0.0) {
            return Err(ConfigError::InvalidParameter(format!("mass must be positive (got {mass})")));
        }
        let det = inertia.determinant();
        if !(det.abs() > f64::EPSILON) {
            return Err(ConfigError::InvalidParameter("inertia tensor is singular".to_string()));
        }
        Ok(Self { mass, inertia, inertia_inv: inertia.inverse() })
    }

    /// Build from an inertia tensor given in external (X nose, Y right, Z down) axes.
    pub fn from_external(mass: f64, inertia: DMat3) -> Result<Self, ConfigError> {
        Self::new(mass, frames::inertia_external_to_body(inertia))
    }

    /// Uniform solid sphere; handy for tests and simple projectiles.
    pub fn sphere(mass: f64, radius: f64) -> Result<Self, ConfigError> {
        let i = 0.4 * mass * radius * radius;
        Self::new(mass, DMat3::from_diagonal(DVec3::splat(i)))
    }
}

/// The externally owned kinematic state of one body.
///
/// The model reads this at the start of `do_sim_step` and writes it back at
/// the end. Velocities are kept in both local and body axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyState {
    pub position: DVec3,
    pub velocity: DVec3,
    pub velocity_body: DVec3,
    pub angular_velocity: DVec3,
    pub angular_velocity_body: DVec3,
    /// Body-to-local rotation.
    pub attitude: DQuat,
    pub near_ground: bool,
    /// Set when the adaptive solver gave up during the last step.
    pub degraded: bool,
}

impl Default for RigidBodyState {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            velocity_body: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            angular_velocity_body: DVec3::ZERO,
            attitude: DQuat::IDENTITY,
            near_ground: false,
            degraded: false,
        }
    }
}

impl RigidBodyState {
    pub fn new(position: DVec3, velocity: DVec3, attitude: DQuat) -> Self {
        let attitude = attitude.normalize();
        Self {
            position,
            velocity,
            velocity_body: attitude.inverse() * velocity,
            attitude,
            ..Default::default()
        }
    }

    /// Correct accumulated quaternion drift.
    pub fn normalize_attitude(&mut self) {
        let len = self.attitude.length();
        if len > f64::EPSILON {
            self.attitude = self.attitude / len;
        } else {
            self.attitude = DQuat::IDENTITY;
        }
    }
}

/// The vector field seen by the solver during one substep.
struct RigidBodyField<'a> {
    mass: &'a MassProperties,
    dynamics: &'a [Box<dyn BaseDynamics>],
    ground_collision: Option<&'a GroundCollisionDynamics>,
    ground: GroundInfo,
    gravity: f64,
    t0: f64,
}

impl RigidBodyField<'_> {
    fn kinematics(&self, y: &[f64]) -> Kinematics {
        let raw = DQuat::from_xyzw(y[9], y[10], y[11], y[12]);
        let attitude = if raw.length_squared() > f64::EPSILON { raw.normalize() } else { DQuat::IDENTITY };
        Kinematics {
            position_local: DVec3::new(y[0], y[1], y[2]),
            velocity_body: DVec3::new(y[3], y[4], y[5]),
            angular_velocity_body: DVec3::new(y[6], y[7], y[8]),
            attitude,
            mass: self.mass.mass,
            ground: self.ground,
        }
    }
}

impl VectorField for RigidBodyField<'_> {
    fn dimension(&self) -> usize {
        STATE_DIMENSION
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        let kin = self.kinematics(y);
        let x = t - self.t0;

        let mut total = ForceMoment::ZERO;
        for dynamics in self.dynamics {
            total += dynamics.compute_force_and_moment(x, &kin);
        }
        let weight_body = kin.local_to_body(DVec3::new(0.0, 0.0, -kin.mass * self.gravity));
        total.force += weight_body;
        if let Some(ground) = self.ground_collision {
            total += ground.compute_with_weight(x, &kin, weight_body);
        }

        let v = kin.velocity_body;
        let w = kin.angular_velocity_body;
        let dp = kin.attitude * v;
        let dv = total.force / kin.mass - w.cross(v);
        let dw = self.mass.inertia_inv * (total.moment - w.cross(self.mass.inertia * w));
        let raw = DQuat::from_xyzw(y[9], y[10], y[11], y[12]);
        let dq = (raw * DQuat::from_xyzw(w.x, w.y, w.z, 0.0)) * 0.5;

        dydt[0..3].copy_from_slice(&dp.to_array());
        dydt[3..6].copy_from_slice(&dv.to_array());
        dydt[6..9].copy_from_slice(&dw.to_array());
        dydt[9] = dq.x;
        dydt[10] = dq.y;
        dydt[11] = dq.z;
        dydt[12] = dq.w;
    }
}

/// One rigid body and the force contributors acting on it.
pub struct PhysicsModel {
    mass: MassProperties,
    dynamics: Vec<Box<dyn BaseDynamics>>,
    ground_collision: Option<GroundCollisionDynamics>,
    solver: Box<dyn NumericalMethod + Send + Sync>,
    gravity: f64,
    bounding_radius: f64,
    max_substep: f64,

    position_local: DVec3,
    velocity_body: DVec3,
    angular_velocity_body: DVec3,
    attitude: DQuat,
    ground: GroundInfo,
    degraded: bool,
    sim_time: f64,
}

impl PhysicsModel {
    pub fn new(mass: MassProperties) -> Self {
        Self {
            mass,
            dynamics: Vec::new(),
            ground_collision: None,
            solver: Box::new(RungeKuttaCK::default()),
            gravity: GRAVITY,
            bounding_radius: 10.0,
            max_substep: 0.02,
            position_local: DVec3::ZERO,
            velocity_body: DVec3::ZERO,
            angular_velocity_body: DVec3::ZERO,
            attitude: DQuat::IDENTITY,
            ground: GroundInfo::default(),
            degraded: false,
            sim_time: 0.0,
        }
    }

    pub fn with_solver(mut self, solver: Box<dyn NumericalMethod + Send + Sync>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_dynamics(mut self, dynamics: impl BaseDynamics + 'static) -> Self {
        self.add_dynamics(Box::new(dynamics));
        self
    }

    pub fn add_dynamics(&mut self, dynamics: Box<dyn BaseDynamics>) {
        self.dynamics.push(dynamics);
    }

    /// Install the ground-collision contributor. It is kept apart from the
    /// generic list because it needs the current weight vector.
    pub fn set_ground_collision(&mut self, dynamics: GroundCollisionDynamics) {
        self.ground_collision = Some(dynamics);
    }

    pub fn set_gravity(&mut self, gravity: f64) {
        self.gravity = gravity;
    }

    pub fn set_bounding_radius(&mut self, radius: f64) {
        self.bounding_radius = radius.max(0.0);
    }

    /// Longest interval handed to the solver in one call.
    pub fn set_max_substep(&mut self, max_substep: f64) {
        if max_substep > 0.0 {
            self.max_substep = max_substep;
        }
    }

    pub fn mass(&self) -> &MassProperties {
        &self.mass
    }

    pub fn dynamics(&self) -> impl Iterator<Item = &dyn BaseDynamics> {
        self.dynamics.iter().map(|d| d.as_ref())
    }

    pub fn ground_collision(&self) -> Option<&GroundCollisionDynamics> {
        self.ground_collision.as_ref()
    }

    pub fn near_ground(&self) -> bool {
        self.ground.near_ground
    }

    pub fn ground(&self) -> &GroundInfo {
        &self.ground
    }

    pub fn degraded(&self) -> bool {
        self.degraded
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Current kinematic view of the model's working state.
    pub fn kinematics(&self) -> Kinematics {
        Kinematics {
            position_local: self.position_local,
            velocity_body: self.velocity_body,
            angular_velocity_body: self.angular_velocity_body,
            attitude: self.attitude,
            mass: self.mass.mass,
            ground: self.ground,
        }
    }

    /// Advance `body` by `dt` seconds.
    ///
    /// The interval is split into substeps no longer than `max_substep`.
    /// Each substep is solved adaptively; if the solver runs out of steps the
    /// substep is redone with a single fixed RK4 step and the body is marked
    /// `degraded`.
    pub fn do_sim_step(&mut self, body: &mut RigidBodyState, dt: f64, terrain: &dyn Terrain) {
        if !(dt > 0.0) {
            return;
        }
        self.bind_object(body);
        self.update_near_ground(terrain);
        self.degraded = false;

        let kin = self.kinematics();
        for dynamics in &mut self.dynamics {
            dynamics.initialize_simulation_step(dt, &kin);
        }
        if let Some(ground) = &mut self.ground_collision {
            ground.initialize_simulation_step(dt, &kin);
        }

        let substeps = (dt / self.max_substep - 1.0e-9).ceil().max(1.0) as usize;
        let h = dt / substeps as f64;
        for _ in 0..substeps {
            self.substep(h, terrain);
        }

        self.write_back(body);
    }

    fn substep(&mut self, h: f64, terrain: &dyn Terrain) {
        let kin = self.kinematics();
        for dynamics in &mut self.dynamics {
            dynamics.pre_simulation_step(h, &kin);
        }
        if let Some(ground) = &mut self.ground_collision {
            ground.pre_simulation_step(h, &kin);
        }

        let y0 = self.body_to_y();
        let t0 = self.sim_time;
        let field = RigidBodyField {
            mass: &self.mass,
            dynamics: &self.dynamics,
            ground_collision: self.ground_collision.as_ref(),
            ground: self.ground,
            gravity: self.gravity,
            t0,
        };
        let mut y = self.solver.enhanced_solve(&field, &y0, t0, h);
        if self.solver.failed() {
            log::warn!(
                "adaptive solve failed after {} steps at t={:.3}, falling back to fixed step",
                self.solver.steps_taken(),
                t0
            );
            y = self.solver.quick_solve(&field, &y0, t0, h);
            self.degraded = true;
        }

        self.y_to_body(&y);
        self.sim_time += h;
        self.update_near_ground(terrain);

        let kin = self.kinematics();
        for dynamics in &mut self.dynamics {
            dynamics.post_simulation_step(h, &kin);
        }
        if let Some(ground) = &mut self.ground_collision {
            ground.post_simulation_step(h, &kin);
        }
    }

    /// Load the working state from the owning object.
    pub fn bind_object(&mut self, body: &RigidBodyState) {
        self.position_local = body.position;
        self.velocity_body = body.velocity_body;
        self.angular_velocity_body = body.angular_velocity_body;
        self.attitude = body.attitude;
    }

    fn write_back(&self, body: &mut RigidBodyState) {
        let (velocity, angular_velocity) = self.physics_body_to_local();
        body.position = self.position_local;
        body.velocity = velocity;
        body.velocity_body = self.velocity_body;
        body.angular_velocity = angular_velocity;
        body.angular_velocity_body = self.angular_velocity_body;
        body.attitude = self.attitude;
        body.near_ground = self.ground.near_ground;
        body.degraded = self.degraded;
    }

    /// Pack the working state into a solver vector.
    pub fn body_to_y(&self) -> Vec<f64> {
        let mut y = Vec::with_capacity(STATE_DIMENSION);
        y.extend_from_slice(&self.position_local.to_array());
        y.extend_from_slice(&self.velocity_body.to_array());
        y.extend_from_slice(&self.angular_velocity_body.to_array());
        y.extend_from_slice(&[self.attitude.x, self.attitude.y, self.attitude.z, self.attitude.w]);
        y
    }

    /// Unpack a solver vector, damping the angular velocity.
    pub fn y_to_body(&mut self, y: &[f64]) {
        self.position_local = DVec3::new(y[0], y[1], y[2]);
        self.velocity_body = DVec3::new(y[3], y[4], y[5]);
        self.angular_velocity_body = DVec3::new(y[6], y[7], y[8]) * ANGULAR_DAMPING;
        self.attitude = DQuat::from_xyzw(y[9], y[10], y[11], y[12]);
    }

    /// Velocity and angular velocity rotated into local axes.
    pub fn physics_body_to_local(&self) -> (DVec3, DVec3) {
        (self.attitude * self.velocity_body, self.attitude * self.angular_velocity_body)
    }

    /// Sample the terrain under the body and refresh the near-ground flag.
    pub fn update_near_ground(&mut self, terrain: &dyn Terrain) {
        let p = self.position_local;
        let elevation = terrain.elevation(p.x, p.y);
        let normal = terrain.normal(p.x, p.y);
        let mut ground = GroundInfo {
            elevation,
            normal,
            point: DVec3::new(p.x, p.y, elevation),
            near_ground: false,
        };
        ground.near_ground = ground.height_above(p) < self.bounding_radius;
        self.ground = ground;
    }
}

impl std::fmt::Debug for PhysicsModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsModel")
            .field("mass", &self.mass.mass)
            .field("dynamics", &self.dynamics.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("ground_collision", &self.ground_collision.is_some())
            .field("position", &self.position_local)
            .field("near_ground", &self.ground.near_ground)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::FlatTerrain;

    struct ConstantForce(DVec3);

    impl BaseDynamics for ConstantForce {
        fn name(&self) -> &str {
            "constant"
        }

        fn compute_force_and_moment(&self, _x: f64, _kin: &Kinematics) -> ForceMoment {
            ForceMoment::new(self.0, DVec3::ZERO)
        }
    }

    /// Counts lifecycle calls to check ordering.
    #[derive(Default)]
    struct Recorder {
        log: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl BaseDynamics for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn initialize_simulation_step(&mut self, _dt: f64, _kin: &Kinematics) {
            self.log.lock().unwrap().push("init");
        }

        fn pre_simulation_step(&mut self, _dt: f64, _kin: &Kinematics) {
            self.log.lock().unwrap().push("pre");
        }

        fn compute_force_and_moment(&self, _x: f64, _kin: &Kinematics) -> ForceMoment {
            ForceMoment::ZERO
        }

        fn post_simulation_step(&mut self, _dt: f64, _kin: &Kinematics) {
            self.log.lock().unwrap().push("post");
        }
    }

    fn sphere_model() -> PhysicsModel {
        PhysicsModel::new(MassProperties::sphere(100.0, 1.0).unwrap())
    }

    #[test]
    fn test_free_fall_matches_analytic() {
        let mut model = sphere_model();
        model.set_bounding_radius(1.0);
        let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 1000.0), DVec3::ZERO, DQuat::IDENTITY);
        model.do_sim_step(&mut body, 1.0, &FlatTerrain::new(0.0));

        assert!((body.position.z - (1000.0 - 0.5 * GRAVITY)).abs() < 1e-6);
        assert!((body.velocity.z + GRAVITY).abs() < 1e-6);
        assert!(!body.near_ground);
        assert!(!body.degraded);
    }

    #[test]
    fn test_force_cancels_gravity() {
        let mut model = sphere_model().with_dynamics(ConstantForce(DVec3::new(0.0, 0.0, 100.0 * GRAVITY)));
        let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 500.0), DVec3::new(0.0, 50.0, 0.0), DQuat::IDENTITY);
        model.do_sim_step(&mut body, 2.0, &FlatTerrain::new(0.0));
        assert!((body.position.y - 100.0).abs() < 1e-6);
        assert!((body.position.z - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_angular_velocity_damping_monotonic() {
        let mut model = sphere_model();
        let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 5000.0), DVec3::ZERO, DQuat::IDENTITY);
        body.angular_velocity_body = DVec3::new(0.3, -0.2, 0.5);

        let mut last = body.angular_velocity_body.length();
        for _ in 0..50 {
            model.do_sim_step(&mut body, 0.05, &FlatTerrain::new(0.0));
            body.normalize_attitude();
            let now = body.angular_velocity_body.length();
            assert!(now < last, "angular speed grew from {last} to {now}");
            last = now;
        }
    }

    #[test]
    fn test_rotation_integrates_attitude() {
        let mut model = sphere_model();
        let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 5000.0), DVec3::ZERO, DQuat::IDENTITY);
        // Yaw about the up axis at 0.1 rad/s for one second.
        body.angular_velocity_body = DVec3::new(0.0, 0.0, 0.1);
        model.do_sim_step(&mut body, 1.0, &FlatTerrain::new(0.0));
        body.normalize_attitude();
        let (axis, angle) = body.attitude.to_axis_angle();
        // 50 substeps of 0.02s, the rate decaying by ANGULAR_DAMPING after each.
        let expected: f64 = (0..50).map(|k| 0.02 * 0.1 * ANGULAR_DAMPING.powi(k)).sum();
        assert!((axis - DVec3::Z).length() < 1e-6);
        assert!((angle - expected).abs() < 1e-6);
    }

    #[test]
    fn test_body_to_local_velocity() {
        let mut model = sphere_model().with_dynamics(ConstantForce(DVec3::new(0.0, 0.0, 100.0 * GRAVITY)));
        // Rotated 90 degrees left: the nose (+Y body) points west (-X local).
        let attitude = DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2);
        let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 500.0), DVec3::new(-20.0, 0.0, 0.0), attitude);
        assert!((body.velocity_body - DVec3::new(0.0, 20.0, 0.0)).length() < 1e-9);
        model.do_sim_step(&mut body, 0.1, &FlatTerrain::new(0.0));
        assert!((body.velocity - DVec3::new(-20.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_near_ground_uses_bounding_radius() {
        let mut model = sphere_model();
        model.set_bounding_radius(15.0);
        let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 110.0), DVec3::ZERO, DQuat::IDENTITY);
        model.bind_object(&body);
        model.update_near_ground(&FlatTerrain::new(100.0));
        assert!(model.near_ground());
        model.update_near_ground(&FlatTerrain::new(50.0));
        assert!(!model.near_ground());

        body.position.z = 200.0;
        model.bind_object(&body);
        model.update_near_ground(&FlatTerrain::new(100.0));
        assert!(!model.near_ground());
    }

    #[test]
    fn test_lifecycle_hook_order() {
        let recorder = Recorder::default();
        let log = recorder.log.clone();
        let mut model = sphere_model().with_dynamics(recorder);
        model.set_max_substep(0.05);
        let mut body = RigidBodyState::new(DVec3::new(0.0, 0.0, 5000.0), DVec3::ZERO, DQuat::IDENTITY);
        model.do_sim_step(&mut body, 0.1, &FlatTerrain::new(0.0));
        assert_eq!(*log.lock().unwrap(), vec!["init", "pre", "post", "pre", "post"]);
    }

    #[test]
    fn test_zero_dt_is_noop() {
        let mut model = sphere_model();
        let mut body = RigidBodyState::new(DVec3::new(1.0, 2.0, 3.0), DVec3::new(4.0, 5.0, 6.0), DQuat::IDENTITY);
        let before = body;
        model.do_sim_step(&mut body, 0.0, &FlatTerrain::new(0.0));
        assert_eq!(body, before);
    }

    #[test]
    fn test_singular_inertia_rejected() {
        assert!(MassProperties::new(10.0, DMat3::ZERO).is_err());
        assert!(MassProperties::new(0.0, DMat3::IDENTITY).is_err());
    }
}
