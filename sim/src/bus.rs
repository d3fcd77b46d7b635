//! Named, typed data channels shared between vehicle subsystems.
//!
//! A [`Bus`] is a per-vehicle registry of [`DataChannel`]s. Flight dynamics
//! read control-surface deflections from it and publish derived values
//! (angle of attack, airspeed, G-load) back to it. How channels get their
//! names and initial values is the caller's business; the physics core only
//! sees typed getters and setters.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Conventional channel names used by the built-in dynamics.
pub mod channels {
    pub const ELEVATOR: &str = "ControlSurfaces.ElevatorDeflection";
    pub const AILERON: &str = "ControlSurfaces.AileronDeflection";
    pub const RUDDER: &str = "ControlSurfaces.RudderDeflection";
    pub const THROTTLE: &str = "Engine.Throttle";
    pub const PITCH_INPUT: &str = "ControlInputs.PitchInput";
    pub const ROLL_INPUT: &str = "ControlInputs.RollInput";
    pub const YAW_INPUT: &str = "ControlInputs.YawInput";
    pub const THROTTLE_INPUT: &str = "ControlInputs.ThrottleInput";
    pub const ANGLE_OF_ATTACK: &str = "FlightDynamics.Alpha";
    pub const AIRSPEED: &str = "FlightDynamics.Airspeed";
    pub const G_LOAD: &str = "FlightDynamics.GForce";
}

/// Shared handle to a single typed value.
#[derive(Debug)]
pub struct DataChannel<T> {
    name: Arc<str>,
    value: Arc<RwLock<T>>,
}

impl<T> Clone for DataChannel<T> {
    fn clone(&self) -> Self {
        Self { name: Arc::clone(&self.name), value: Arc::clone(&self.value) }
    }
}

impl<T: Clone + Default> DataChannel<T> {
    pub fn new(name: &str, value: T) -> Self {
        Self { name: Arc::from(name), value: Arc::new(RwLock::new(value)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value. A poisoned lock reads as the default value.
    pub fn value(&self) -> T {
        self.value.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn set(&self, value: T) {
        if let Ok(mut slot) = self.value.write() {
            *slot = value;
        }
    }

    /// Whether two handles refer to the same underlying value.
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

/// Registry of channels keyed by name.
#[derive(Default)]
pub struct Bus {
    name: String,
    channels: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Bus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), channels: HashMap::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a channel, replacing any previous channel of that name.
    pub fn register<T>(&mut self, name: &str, value: T) -> DataChannel<T>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        let channel = DataChannel::new(name, value);
        self.channels.insert(name.to_string(), Box::new(channel.clone()));
        channel
    }

    /// Look up a channel by name and type.
    pub fn channel<T>(&self, name: &str) -> Option<DataChannel<T>>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        self.channels
            .get(name)
            .and_then(|c| c.downcast_ref::<DataChannel<T>>())
            .cloned()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Bind to a channel the caller only reads.
    ///
    /// A missing channel is a wiring mistake, not a fatal error: it is logged
    /// and a detached channel holding `T::default()` is returned so that the
    /// vehicle still flies with a neutral input.
    pub fn bind_input<T>(&self, name: &str) -> DataChannel<T>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        match self.channel(name) {
            Some(channel) => channel,
            None => {
                log::warn!("bus '{}': input channel '{}' not found, using default", self.name, name);
                DataChannel::new(name, T::default())
            }
        }
    }

    /// Bind to a channel the caller writes, registering it if needed.
    pub fn bind_output<T>(&mut self, name: &str) -> DataChannel<T>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        match self.channel(name) {
            Some(channel) => channel,
            None => self.register(name, T::default()),
        }
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(|k| k.as_str())
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.name)
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_share() {
        let mut bus = Bus::new("f16");
        let writer = bus.register(channels::THROTTLE, 0.0f64);
        let reader: DataChannel<f64> = bus.channel(channels::THROTTLE).unwrap();
        writer.set(0.75);
        assert_eq!(reader.value(), 0.75);
        assert!(reader.same_channel(&writer));
    }

    #[test]
    fn test_type_mismatch_is_missing() {
        let mut bus = Bus::new("f16");
        bus.register(channels::THROTTLE, 1.0f64);
        assert!(bus.channel::<bool>(channels::THROTTLE).is_none());
    }

    #[test]
    fn test_missing_input_defaults() {
        let bus = Bus::new("f16");
        let input: DataChannel<f64> = bus.bind_input("Nope.Missing");
        assert_eq!(input.value(), 0.0);
        assert!(!bus.has_channel("Nope.Missing"));
    }

    #[test]
    fn test_bind_output_registers_once() {
        let mut bus = Bus::new("f16");
        let a: DataChannel<f64> = bus.bind_output(channels::AIRSPEED);
        let b: DataChannel<f64> = bus.bind_output(channels::AIRSPEED);
        assert!(a.same_channel(&b));
        assert_eq!(bus.channel_names().count(), 1);
    }
}
