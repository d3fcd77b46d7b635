use super::{Atmosphere, BaseDynamics, ForceMoment, Kinematics};
use crate::bus::{channels, Bus, DataChannel};
use glam::DVec3;

/// Engine thrust along the nose axis, scaled by throttle and air density.
pub struct ThrustDynamics {
    max_thrust: f64,
    /// Thrust line offset from the center of mass, body axes.
    offset: DVec3,
    atmosphere: Atmosphere,
    throttle: f64,
    throttle_channel: Option<DataChannel<f64>>,
}

impl ThrustDynamics {
    pub fn new(max_thrust: f64) -> Self {
        Self {
            max_thrust,
            offset: DVec3::ZERO,
            atmosphere: Atmosphere::default(),
            throttle: 0.0,
            throttle_channel: None,
        }
    }

    pub fn with_offset(mut self, offset: DVec3) -> Self {
        self.offset = offset;
        self
    }

    pub fn bind(&mut self, bus: &mut Bus) {
        self.throttle_channel = Some(bus.bind_input(channels::THROTTLE));
    }

    pub fn set_throttle(&mut self, throttle: f64) {
        self.throttle = throttle.clamp(0.0, 1.0);
    }

    pub fn throttle(&self) -> f64 {
        self.throttle
    }
}

impl BaseDynamics for ThrustDynamics {
    fn name(&self) -> &str {
        "thrust"
    }

    fn pre_simulation_step(&mut self, _dt: f64, _kin: &Kinematics) {
        if let Some(channel) = &self.throttle_channel {
            self.throttle = channel.value().clamp(0.0, 1.0);
        }
    }

    fn compute_force_and_moment(&self, _x: f64, kin: &Kinematics) -> ForceMoment {
        let thrust = self.max_thrust * self.throttle * self.atmosphere.density_ratio(kin.altitude());
        ForceMoment::at_point(DVec3::Y * thrust, self.offset)
    }
}

impl std::fmt::Debug for ThrustDynamics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrustDynamics")
            .field("max_thrust", &self.max_thrust)
            .field("throttle", &self.throttle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{GroundInfo, MassProperties, PhysicsModel, RigidBodyState};
    use crate::terrain::FlatTerrain;
    use glam::DQuat;

    fn kin_at(altitude: f64) -> Kinematics {
        Kinematics {
            position_local: DVec3::new(0.0, 0.0, altitude),
            velocity_body: DVec3::ZERO,
            angular_velocity_body: DVec3::ZERO,
            attitude: DQuat::IDENTITY,
            mass: 1.0,
            ground: GroundInfo::default(),
        }
    }

    #[test]
    fn test_thrust_along_nose() {
        let mut engine = ThrustDynamics::new(1000.0);
        engine.set_throttle(0.5);
        let fm = engine.compute_force_and_moment(0.0, &kin_at(0.0));
        assert!((fm.force - DVec3::new(0.0, 500.0, 0.0)).length() < 1e-9);
        assert_eq!(fm.moment, DVec3::ZERO);
    }

    #[test]
    fn test_thrust_lapses_with_altitude() {
        let mut engine = ThrustDynamics::new(1000.0);
        engine.set_throttle(1.0);
        let low = engine.compute_force_and_moment(0.0, &kin_at(0.0));
        let high = engine.compute_force_and_moment(0.0, &kin_at(6000.0));
        assert!(high.force.y < low.force.y);
    }

    #[test]
    fn test_throttle_from_bus_clamped() {
        let mut bus = Bus::new("trainer");
        let throttle = bus.register(channels::THROTTLE, 0.0f64);
        let mut engine = ThrustDynamics::new(1000.0);
        engine.bind(&mut bus);
        throttle.set(1.7);
        engine.pre_simulation_step(0.02, &kin_at(0.0));
        assert_eq!(engine.throttle(), 1.0);
    }

    #[test]
    fn test_engine_accelerates_body() {
        let mut engine = ThrustDynamics::new(200.0);
        engine.set_throttle(1.0);
        let mut model = PhysicsModel::new(MassProperties::sphere(100.0, 1.0).unwrap()).with_dynamics(engine);
        model.set_gravity(0.0);
        let mut body = RigidBodyState::new(DVec3::ZERO, DVec3::ZERO, DQuat::IDENTITY);
        model.do_sim_step(&mut body, 1.0, &FlatTerrain::new(-1000.0));
        // 2 m/s^2 along the nose at sea level.
        assert!((body.velocity.y - 2.0).abs() < 1e-6);
    }
}
