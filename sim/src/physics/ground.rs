//! Ground contact: spring-damper contact points with sliding friction.

use super::{BaseDynamics, ForceMoment, Kinematics, GRAVITY};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Below this tangential speed friction ramps linearly instead of jumping.
const SLIP_SPEED: f64 = 0.5;

/// A point on the airframe that can touch the ground (body axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundContact {
    pub position: DVec3,
}

/// Ground collision forces.
///
/// Contact stiffness is derived from the vehicle weight passed in by the
/// physics model: at rest the weight compresses each contact by
/// `static_deflection`, whatever the vehicle mass.
#[derive(Debug, Clone)]
pub struct GroundCollisionDynamics {
    contacts: Vec<GroundContact>,
    static_deflection: f64,
    damping_ratio: f64,
    friction: f64,
    touching: usize,
}

impl GroundCollisionDynamics {
    pub fn new(contacts: Vec<GroundContact>) -> Self {
        Self {
            contacts,
            static_deflection: 0.1,
            damping_ratio: 0.7,
            friction: 0.6,
            touching: 0,
        }
    }

    pub fn with_static_deflection(mut self, meters: f64) -> Self {
        self.static_deflection = meters.max(1.0e-4);
        self
    }

    pub fn with_damping_ratio(mut self, ratio: f64) -> Self {
        self.damping_ratio = ratio.max(0.0);
        self
    }

    pub fn with_friction(mut self, mu: f64) -> Self {
        self.friction = mu.max(0.0);
        self
    }

    pub fn contacts(&self) -> &[GroundContact] {
        &self.contacts
    }

    /// Number of contacts below the terrain after the last substep.
    pub fn touching(&self) -> usize {
        self.touching
    }

    pub fn on_ground(&self) -> bool {
        self.touching > 0
    }

    /// Penetration depth of a contact (positive when below the terrain).
    fn depth(&self, contact: &GroundContact, kin: &Kinematics) -> f64 {
        let p = kin.position_local + kin.body_to_local(contact.position);
        -kin.ground.height_above(p)
    }

    /// Contact force and moment given the current weight in body axes.
    pub fn compute_with_weight(&self, _x: f64, kin: &Kinematics, weight_body: DVec3) -> ForceMoment {
        if !kin.ground.near_ground || self.contacts.is_empty() {
            return ForceMoment::ZERO;
        }
        let n = self.contacts.len() as f64;
        let stiffness = weight_body.length() / (self.static_deflection * n);
        let mass_per_contact = kin.mass / n;
        let damping = 2.0 * self.damping_ratio * (stiffness * mass_per_contact).sqrt();
        let normal = kin.local_to_body(kin.ground.normal);

        let mut total = ForceMoment::ZERO;
        for contact in &self.contacts {
            let depth = self.depth(contact, kin);
            if depth <= 0.0 {
                continue;
            }
            let v = kin.velocity_body + kin.angular_velocity_body.cross(contact.position);
            let vn = v.dot(normal);
            let fn_mag = (stiffness * depth - damping * vn).max(0.0);
            let vt = v - normal * vn;
            let friction = -vt / vt.length().max(SLIP_SPEED) * self.friction * fn_mag;
            total += ForceMoment::at_point(normal * fn_mag + friction, contact.position);
        }
        total
    }
}

impl BaseDynamics for GroundCollisionDynamics {
    fn name(&self) -> &str {
        "ground_collision"
    }

    fn compute_force_and_moment(&self, x: f64, kin: &Kinematics) -> ForceMoment {
        let weight = kin.local_to_body(DVec3::new(0.0, 0.0, -kin.mass * GRAVITY));
        self.compute_with_weight(x, kin, weight)
    }

    fn post_simulation_step(&mut self, _dt: f64, kin: &Kinematics) {
        self.touching = if kin.ground.near_ground {
            self.contacts.iter().filter(|c| self.depth(c, kin) > 0.0).count()
        } else {
            0
        };
    }
}
