//! Stability-derivative aerodynamics.
//!
//! Coefficients follow the usual small-perturbation form: lift and pitching
//! moment are linear in alpha and elevator, side force and yawing moment in
//! sideslip and rudder, rolling moment in sideslip and aileron, with rate
//! damping terms scaled by the reduced rates `p b / 2V`, `q c / 2V`,
//! `r b / 2V`. Lift is clamped at `cl_max` as a crude stall.

use super::{BaseDynamics, ForceMoment, Kinematics, GRAVITY};
use crate::bus::{channels, Bus, DataChannel};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Airspeed below which aerodynamic forces are ignored.
const MIN_AIRSPEED: f64 = 0.5;

/// International Standard Atmosphere, troposphere only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Atmosphere {
    /// Sea-level density, kg/m^3.
    pub rho0: f64,
    /// Sea-level temperature, K.
    pub t0: f64,
    /// Temperature lapse rate, K/m.
    pub lapse: f64,
    /// Specific gas constant for air, J/(kg K).
    pub r: f64,
}

impl Default for Atmosphere {
    fn default() -> Self {
        Self { rho0: 1.225, t0: 288.15, lapse: 0.0065, r: 287.05 }
    }
}

impl Atmosphere {
    /// Air density at `altitude` meters; valid up to about 11 km.
    pub fn density(&self, altitude: f64) -> f64 {
        let ratio = (1.0 - self.lapse * altitude.max(0.0) / self.t0).max(0.0);
        let exponent = GRAVITY / (self.r * self.lapse) - 1.0;
        self.rho0 * ratio.powf(exponent)
    }

    pub fn density_ratio(&self, altitude: f64) -> f64 {
        self.density(altitude) / self.rho0
    }
}

/// Non-dimensional aerodynamic coefficients. Angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AeroCoefficients {
    pub cl0: f64,
    pub cl_alpha: f64,
    pub cl_de: f64,
    pub cl_max: f64,
    pub cd0: f64,
    /// Induced drag factor: `CD = cd0 + k * CL^2`.
    pub k_induced: f64,
    pub cy_beta: f64,
    pub cy_dr: f64,
    pub cm0: f64,
    pub cm_alpha: f64,
    pub cm_de: f64,
    pub cm_q: f64,
    pub croll_beta: f64,
    pub croll_da: f64,
    pub croll_p: f64,
    pub croll_r: f64,
    pub cn_beta: f64,
    pub cn_dr: f64,
    pub cn_r: f64,
}

impl Default for AeroCoefficients {
    /// Light single-engine trainer.
    fn default() -> Self {
        Self {
            cl0: 0.25,
            cl_alpha: 4.6,
            cl_de: 0.43,
            cl_max: 1.4,
            cd0: 0.03,
            k_induced: 0.07,
            cy_beta: -0.31,
            cy_dr: 0.19,
            cm0: 0.0,
            cm_alpha: -0.89,
            cm_de: -1.28,
            cm_q: -12.4,
            croll_beta: -0.09,
            croll_da: 0.18,
            croll_p: -0.47,
            croll_r: 0.1,
            cn_beta: 0.065,
            cn_dr: -0.07,
            cn_r: -0.1,
        }
    }
}

/// Flow angles and speed derived from a body-axes velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AirData {
    pub airspeed: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl AirData {
    pub fn from_velocity(v: DVec3) -> Self {
        let airspeed = v.length();
        if airspeed < MIN_AIRSPEED {
            return Self { airspeed, ..Default::default() };
        }
        Self {
            airspeed,
            alpha: (-v.z).atan2(v.y),
            beta: (v.x / airspeed).clamp(-1.0, 1.0).asin(),
        }
    }
}

/// Control surface deflections latched at the start of a substep.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Controls {
    elevator: f64,
    aileron: f64,
    rudder: f64,
}

struct AeroChannels {
    elevator: DataChannel<f64>,
    aileron: DataChannel<f64>,
    rudder: DataChannel<f64>,
    alpha: DataChannel<f64>,
    airspeed: DataChannel<f64>,
    g_load: DataChannel<f64>,
}

/// Aerodynamic forces and moments on a fixed-wing airframe.
pub struct AeroDynamics {
    coefficients: AeroCoefficients,
    atmosphere: Atmosphere,
    wing_area: f64,
    wing_span: f64,
    chord: f64,
    controls: Controls,
    channels: Option<AeroChannels>,
    air_data: AirData,
    g_load: f64,
}

impl AeroDynamics {
    pub fn new(coefficients: AeroCoefficients, wing_area: f64, wing_span: f64, chord: f64) -> Self {
        Self {
            coefficients,
            atmosphere: Atmosphere::default(),
            wing_area,
            wing_span,
            chord,
            controls: Controls::default(),
            channels: None,
            air_data: AirData::default(),
            g_load: 1.0,
        }
    }

    pub fn with_atmosphere(mut self, atmosphere: Atmosphere) -> Self {
        self.atmosphere = atmosphere;
        self
    }

    /// Wire control inputs and flight-data outputs to `bus`.
    pub fn bind(&mut self, bus: &mut Bus) {
        self.channels = Some(AeroChannels {
            elevator: bus.bind_input(channels::ELEVATOR),
            aileron: bus.bind_input(channels::AILERON),
            rudder: bus.bind_input(channels::RUDDER),
            alpha: bus.bind_output(channels::ANGLE_OF_ATTACK),
            airspeed: bus.bind_output(channels::AIRSPEED),
            g_load: bus.bind_output(channels::G_LOAD),
        });
    }

    pub fn coefficients(&self) -> &AeroCoefficients {
        &self.coefficients
    }

    /// Air data as of the end of the last substep.
    pub fn air_data(&self) -> AirData {
        self.air_data
    }

    pub fn g_load(&self) -> f64 {
        self.g_load
    }

    /// Set deflections directly, bypassing the bus.
    pub fn set_controls(&mut self, elevator: f64, aileron: f64, rudder: f64) {
        self.controls = Controls { elevator, aileron, rudder };
    }

    fn aero_force_and_moment(&self, kin: &Kinematics) -> ForceMoment {
        let v = kin.velocity_body;
        let air = AirData::from_velocity(v);
        if air.airspeed < MIN_AIRSPEED {
            return ForceMoment::ZERO;
        }
        let c = &self.coefficients;
        let qbar = 0.5 * self.atmosphere.density(kin.altitude()) * air.airspeed * air.airspeed;
        let qs = qbar * self.wing_area;

        // Reduced body rates: roll about the nose, pitch about the right
        // wing, yaw positive nose-right.
        let w = kin.angular_velocity_body;
        let half_v = 2.0 * air.airspeed;
        let p_hat = w.y * self.wing_span / half_v;
        let q_hat = w.x * self.chord / half_v;
        let r_hat = -w.z * self.wing_span / half_v;

        let cl = (c.cl0 + c.cl_alpha * air.alpha + c.cl_de * self.controls.elevator).clamp(-c.cl_max, c.cl_max);
        let cd = c.cd0 + c.k_induced * cl * cl;
        let cy = c.cy_beta * air.beta + c.cy_dr * self.controls.rudder;

        let v_hat = v / air.airspeed;
        let lift_dir = DVec3::X.cross(v_hat).normalize_or_zero();
        let force = lift_dir * (cl * qs) - v_hat * (cd * qs) + DVec3::X * (cy * qs);

        let cm = c.cm0 + c.cm_alpha * air.alpha + c.cm_de * self.controls.elevator + c.cm_q * q_hat;
        let croll = c.croll_beta * air.beta + c.croll_da * self.controls.aileron + c.croll_p * p_hat + c.croll_r * r_hat;
        let cn = c.cn_beta * air.beta + c.cn_dr * self.controls.rudder + c.cn_r * r_hat;
        let moment = DVec3::new(cm * qs * self.chord, croll * qs * self.wing_span, -cn * qs * self.wing_span);

        ForceMoment::new(force, moment)
    }
}

impl BaseDynamics for AeroDynamics {
    fn name(&self) -> &str {
        "aero"
    }

    fn pre_simulation_step(&mut self, _dt: f64, _kin: &Kinematics) {
        if let Some(ch) = &self.channels {
            self.controls = Controls {
                elevator: ch.elevator.value(),
                aileron: ch.aileron.value(),
                rudder: ch.rudder.value(),
            };
        }
    }

    fn compute_force_and_moment(&self, _x: f64, kin: &Kinematics) -> ForceMoment {
        self.aero_force_and_moment(kin)
    }

    fn post_simulation_step(&mut self, _dt: f64, kin: &Kinematics) {
        self.air_data = AirData::from_velocity(kin.velocity_body);
        let fm = self.aero_force_and_moment(kin);
        self.g_load = fm.force.z / (kin.mass * GRAVITY);
        if let Some(ch) = &self.channels {
            ch.alpha.set(self.air_data.alpha);
            ch.airspeed.set(self.air_data.airspeed);
            ch.g_load.set(self.g_load);
        }
    }
}

impl std::fmt::Debug for AeroDynamics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeroDynamics")
            .field("wing_area", &self.wing_area)
            .field("bound", &self.channels.is_some())
            .field("air_data", &self.air_data)
            .finish()
    }
}
