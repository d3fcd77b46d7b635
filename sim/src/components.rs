//! ECS components for the simulation world.
//!
//! Components are data containers attached to entities. Logic lives in the
//! systems that query them.

use crate::battlefield::{ControlMode, ObjectId, UnitKind};
use crate::bus::{channels, Bus};
use crate::error::ConfigError;
use crate::fcs::{FcsDefinition, FlightControlSystem};
use crate::ode::{RungeKuttaCK, SolverParams};
use crate::physics::{
    frames, AeroCoefficients, AeroDynamics, GroundCollisionDynamics, GroundContact, MassProperties, PhysicsModel,
    RigidBodyState, ThrustDynamics,
};
use bevy_ecs::prelude::*;
use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Battlefield identifier of a vehicle.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub ObjectId);

/// Identifier of the vehicle's unit in the cell grid.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellUnitId(pub ObjectId);

/// Who is flying the vehicle.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control(pub ControlMode);

// ============================================================================
// STATE MARKERS
// ============================================================================

/// The vehicle is outside every human bubble; physics is not integrated.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Aggregated;

/// The vehicle is inside the camera bubble.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Visible;

// ============================================================================
// VEHICLE
// ============================================================================

/// A simulated vehicle: its rigid body, the model that moves it and the bus
/// that connects its subsystems.
#[derive(Component)]
pub struct Vehicle {
    pub name: String,
    pub kind: UnitKind,
    pub model: PhysicsModel,
    pub body: RigidBodyState,
    pub bus: Bus,
    pub fcs: Option<FlightControlSystem>,
}

impl Vehicle {
    /// Write a pilot or control channel. Returns false if the channel does
    /// not exist on this vehicle's bus.
    pub fn set_input(&self, channel: &str, value: f64) -> bool {
        match self.bus.channel::<f64>(channel) {
            Some(c) => {
                c.set(value);
                true
            }
            None => false,
        }
    }

    pub fn read(&self, channel: &str) -> Option<f64> {
        self.bus.channel::<f64>(channel).map(|c| c.value())
    }
}

impl std::fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("body", &self.body)
            .field("fcs_nodes", &self.fcs.as_ref().map(|f| f.node_count()))
            .finish()
    }
}

/// Wing geometry and coefficients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AeroDesc {
    pub coefficients: AeroCoefficients,
    pub wing_area: f64,
    pub wing_span: f64,
    pub chord: f64,
}

impl Default for AeroDesc {
    fn default() -> Self {
        Self { coefficients: AeroCoefficients::default(), wing_area: 16.2, wing_span: 11.0, chord: 1.5 }
    }
}

/// Serializable description of a vehicle type.
///
/// Every vector and the inertia diagonal are given in the usual aircraft
/// axes (X nose, Y right, Z down) and converted to body axes by `build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleDesc {
    pub name: String,
    pub kind: UnitKind,
    pub mass: f64,
    /// Ixx, Iyy, Izz in X nose, Y right, Z down axes, kg m^2.
    pub inertia: [f64; 3],
    pub aero: Option<AeroDesc>,
    /// Static thrust at sea level, newtons. Zero for no engine.
    pub max_thrust: f64,
    /// Thrust line offset from the center of mass, X nose, Y right, Z down.
    pub thrust_offset: DVec3,
    /// Ground contact points relative to the center of mass, X nose,
    /// Y right, Z down (wheels below the airframe have positive Z).
    pub contacts: Vec<DVec3>,
    pub static_deflection: f64,
    pub damping_ratio: f64,
    pub friction: f64,
    pub bounding_radius: f64,
    pub fcs: Option<FcsDefinition>,
}

impl Default for VehicleDesc {
    fn default() -> Self {
        Self {
            name: "trainer".to_string(),
            kind: UnitKind::Air,
            mass: 1200.0,
            inertia: [1300.0, 1800.0, 2800.0],
            aero: Some(AeroDesc::default()),
            max_thrust: 3500.0,
            thrust_offset: DVec3::ZERO,
            contacts: vec![
                DVec3::new(2.0, 0.0, 1.2),
                DVec3::new(-0.5, -1.5, 1.2),
                DVec3::new(-0.5, 1.5, 1.2),
            ],
            static_deflection: 0.1,
            damping_ratio: 0.7,
            friction: 0.6,
            bounding_radius: 6.0,
            fcs: None,
        }
    }
}

/// Channels every vehicle bus carries before its subsystems bind.
const CONTROL_CHANNELS: [&str; 8] = [
    channels::PITCH_INPUT,
    channels::ROLL_INPUT,
    channels::YAW_INPUT,
    channels::THROTTLE_INPUT,
    channels::ELEVATOR,
    channels::AILERON,
    channels::RUDDER,
    channels::THROTTLE,
];

impl VehicleDesc {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Assemble the physics model, bus and flight-control graph.
    pub fn build(&self, solver: SolverParams, max_substep: f64) -> Result<Vehicle, ConfigError> {
        let mut bus = Bus::new(self.name.as_str());
        for name in CONTROL_CHANNELS {
            bus.register::<f64>(name, 0.0);
        }
        let fcs = match &self.fcs {
            Some(definition) => Some(FlightControlSystem::build(definition, &mut bus)?),
            None => None,
        };

        let inertia = DMat3::from_diagonal(DVec3::from_array(self.inertia));
        let mass = MassProperties::from_external(self.mass, inertia)?;
        let mut model = PhysicsModel::new(mass).with_solver(Box::new(RungeKuttaCK::new(solver)?));
        model.set_max_substep(max_substep);
        model.set_bounding_radius(self.bounding_radius);

        if let Some(aero) = &self.aero {
            let mut dynamics = AeroDynamics::new(aero.coefficients, aero.wing_area, aero.wing_span, aero.chord);
            dynamics.bind(&mut bus);
            model.add_dynamics(Box::new(dynamics));
        }
        if self.max_thrust > 0.0 {
            let mut engine = ThrustDynamics::new(self.max_thrust).with_offset(frames::external_to_body(self.thrust_offset));
            engine.bind(&mut bus);
            model.add_dynamics(Box::new(engine));
        }
        if !self.contacts.is_empty() {
            let contacts = self
                .contacts
                .iter()
                .map(|&p| GroundContact { position: frames::external_to_body(p) })
                .collect();
            model.set_ground_collision(
                GroundCollisionDynamics::new(contacts)
                    .with_static_deflection(self.static_deflection)
                    .with_damping_ratio(self.damping_ratio)
                    .with_friction(self.friction),
            );
        }

        Ok(Vehicle {
            name: self.name.clone(),
            kind: self.kind,
            model,
            body: RigidBodyState::default(),
            bus,
            fcs,
        })
    }
}
