//! Flight-control system: a small dataflow graph between bus channels.
//!
//! A vehicle's control laws are described as a list of named nodes
//! ([`FcsDefinition`]), typically loaded from JSON. At build time names are
//! resolved to indices into a node arena, channels are bound on the bus, and
//! an evaluation order is computed. Feedback is only allowed through `lag`
//! nodes, whose output at step `n` depends on inputs up to step `n - 1`.
//!
//! ```json
//! { "nodes": [
//!     { "name": "pitch",    "kind": "input",  "channel": "ControlInputs.PitchInput" },
//!     { "name": "pitch_k",  "kind": "gain",   "input": "pitch", "gain": -0.4 },
//!     { "name": "elevator", "kind": "output", "input": "pitch_k",
//!       "channel": "ControlSurfaces.ElevatorDeflection" }
//! ] }
//! ```

use crate::bus::{Bus, DataChannel};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// One node as written in a definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDef {
    Input { channel: String },
    Constant { value: f64 },
    Gain { input: String, gain: f64 },
    Sum { inputs: Vec<String> },
    Product { inputs: Vec<String> },
    Clamp { input: String, min: f64, max: f64 },
    Lag {
        input: String,
        time_constant: f64,
        #[serde(default)]
        initial: f64,
    },
    Deadband { input: String, width: f64 },
    Output { input: String, channel: String },
}

impl NodeDef {
    fn inputs(&self) -> Vec<&str> {
        match self {
            NodeDef::Input { .. } | NodeDef::Constant { .. } => Vec::new(),
            NodeDef::Sum { inputs } | NodeDef::Product { inputs } => inputs.iter().map(String::as_str).collect(),
            NodeDef::Gain { input, .. }
            | NodeDef::Clamp { input, .. }
            | NodeDef::Lag { input, .. }
            | NodeDef::Deadband { input, .. }
            | NodeDef::Output { input, .. } => vec![input.as_str()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(flatten)]
    pub def: NodeDef,
}

/// Serializable description of a flight-control graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FcsDefinition {
    pub nodes: Vec<NodeSpec>,
}

impl FcsDefinition {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Index of a node in the arena.
pub type NodeIndex = usize;

/// Resolved node behavior.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Input(DataChannel<f64>),
    Constant(f64),
    Gain { input: NodeIndex, gain: f64 },
    Sum(Vec<NodeIndex>),
    Product(Vec<NodeIndex>),
    Clamp { input: NodeIndex, min: f64, max: f64 },
    /// First-order lag; `state` is also the node's output.
    Lag { input: NodeIndex, time_constant: f64, state: f64 },
    Deadband { input: NodeIndex, width: f64 },
    Output { input: NodeIndex, channel: DataChannel<f64> },
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
}

/// A built flight-control graph bound to one vehicle's bus.
#[derive(Debug, Clone)]
pub struct FlightControlSystem {
    nodes: Vec<Node>,
    values: Vec<f64>,
    order: Vec<NodeIndex>,
    by_name: HashMap<String, NodeIndex>,
}

impl FlightControlSystem {
    /// Resolve `definition` against `bus`.
    ///
    /// Input channels missing from the bus read as zero (see
    /// [`Bus::bind_input`]); output channels are created on demand.
    pub fn build(definition: &FcsDefinition, bus: &mut Bus) -> Result<Self, ConfigError> {
        let mut by_name = HashMap::with_capacity(definition.nodes.len());
        for (index, spec) in definition.nodes.iter().enumerate() {
            if by_name.insert(spec.name.clone(), index).is_some() {
                return Err(ConfigError::DuplicateNode(spec.name.clone()));
            }
        }

        let resolve = |node: &str, input: &str| -> Result<NodeIndex, ConfigError> {
            by_name.get(input).copied().ok_or_else(|| ConfigError::DanglingInput {
                node: node.to_string(),
                input: input.to_string(),
            })
        };

        let mut nodes = Vec::with_capacity(definition.nodes.len());
        for spec in &definition.nodes {
            let name = spec.name.as_str();
            let kind = match &spec.def {
                NodeDef::Input { channel } => NodeKind::Input(bus.bind_input(channel)),
                NodeDef::Constant { value } => NodeKind::Constant(*value),
                NodeDef::Gain { input, gain } => NodeKind::Gain { input: resolve(name, input)?, gain: *gain },
                NodeDef::Sum { inputs } => {
                    NodeKind::Sum(inputs.iter().map(|i| resolve(name, i)).collect::<Result<_, _>>()?)
                }
                NodeDef::Product { inputs } => {
                    NodeKind::Product(inputs.iter().map(|i| resolve(name, i)).collect::<Result<_, _>>()?)
                }
                NodeDef::Clamp { input, min, max } => {
                    if min > max {
                        return Err(ConfigError::InvalidParameter(format!(
                            "clamp '{name}' has min {min} > max {max}"
                        )));
                    }
                    NodeKind::Clamp { input: resolve(name, input)?, min: *min, max: *max }
                }
                NodeDef::Lag { input, time_constant, initial } => {
                    if !(*time_constant >= 0.0) {
                        return Err(ConfigError::InvalidParameter(format!(
                            "lag '{name}' has negative time constant"
                        )));
                    }
                    NodeKind::Lag { input: resolve(name, input)?, time_constant: *time_constant, state: *initial }
                }
                NodeDef::Deadband { input, width } => {
                    NodeKind::Deadband { input: resolve(name, input)?, width: width.abs() }
                }
                NodeDef::Output { input, channel } => {
                    NodeKind::Output { input: resolve(name, input)?, channel: bus.bind_output(channel) }
                }
            };
            nodes.push(Node { name: spec.name.clone(), kind });
        }

        let order = evaluation_order(definition, &by_name)?;
        let values = nodes
            .iter()
            .map(|n| match n.kind {
                NodeKind::Lag { state, .. } => state,
                NodeKind::Constant(v) => v,
                _ => 0.0,
            })
            .collect();
        Ok(Self { nodes, values, order, by_name })
    }

    /// Evaluate every node once and advance lag states by `dt`.
    pub fn update(&mut self, dt: f64) {
        for &index in &self.order {
            let value = match &self.nodes[index].kind {
                NodeKind::Input(channel) => channel.value(),
                NodeKind::Constant(v) => *v,
                NodeKind::Gain { input, gain } => self.values[*input] * gain,
                NodeKind::Sum(inputs) => inputs.iter().map(|&i| self.values[i]).sum(),
                NodeKind::Product(inputs) => inputs.iter().map(|&i| self.values[i]).product(),
                NodeKind::Clamp { input, min, max } => self.values[*input].clamp(*min, *max),
                NodeKind::Lag { state, .. } => *state,
                NodeKind::Deadband { input, width } => deadband(self.values[*input], *width),
                NodeKind::Output { input, channel } => {
                    let v = self.values[*input];
                    channel.set(v);
                    v
                }
            };
            self.values[index] = value;
        }

        if dt > 0.0 {
            for (index, node) in self.nodes.iter_mut().enumerate() {
                if let NodeKind::Lag { input, time_constant, state } = &mut node.kind {
                    let target = self.values[*input];
                    *state = if *time_constant > 0.0 {
                        *state + (target - *state) * (1.0 - (-dt / *time_constant).exp())
                    } else {
                        target
                    };
                    self.values[index] = *state;
                }
            }
        }
    }

    /// Output of node `name` as of the last `update`.
    pub fn value(&self, name: &str) -> Result<f64, ConfigError> {
        self.by_name
            .get(name)
            .map(|&i| self.values[i])
            .ok_or_else(|| ConfigError::UnknownOutput(name.to_string()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }
}

fn deadband(x: f64, width: f64) -> f64 {
    if x.abs() <= width {
        0.0
    } else {
        x - width * x.signum()
    }
}

/// Kahn's algorithm over data edges, ignoring edges into lag nodes.
fn evaluation_order(definition: &FcsDefinition, by_name: &HashMap<String, NodeIndex>) -> Result<Vec<NodeIndex>, ConfigError> {
    let n = definition.nodes.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    for (index, spec) in definition.nodes.iter().enumerate() {
        if matches!(spec.def, NodeDef::Lag { .. }) {
            continue;
        }
        for input in spec.def.inputs() {
            if let Some(&source) = by_name.get(input) {
                dependents[source].push(index);
                indegree[index] += 1;
            }
        }
    }

    let mut ready: VecDeque<NodeIndex> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(index) = ready.pop_front() {
        order.push(index);
        for &next in &dependents[index] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() < n {
        let stuck = (0..n).find(|&i| indegree[i] > 0).unwrap_or(0);
        return Err(ConfigError::AlgebraicLoop(definition.nodes[stuck].name.clone()));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::channels;

    fn pitch_law() -> FcsDefinition {
        FcsDefinition::from_json_str(
            r#"{ "nodes": [
                { "name": "elevator", "kind": "output", "input": "limited",
                  "channel": "ControlSurfaces.ElevatorDeflection" },
                { "name": "limited", "kind": "clamp", "input": "scaled", "min": -0.3, "max": 0.3 },
                { "name": "scaled", "kind": "gain", "input": "shaped", "gain": -0.5 },
                { "name": "shaped", "kind": "deadband", "input": "pitch", "width": 0.05 },
                { "name": "pitch", "kind": "input", "channel": "ControlInputs.PitchInput" }
            ] }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_pitch_law_drives_elevator() {
        let mut bus = Bus::new("trainer");
        let stick = bus.register(channels::PITCH_INPUT, 0.0f64);
        let mut fcs = FlightControlSystem::build(&pitch_law(), &mut bus).unwrap();
        let elevator: DataChannel<f64> = bus.channel(channels::ELEVATOR).unwrap();

        stick.set(0.45);
        fcs.update(0.02);
        assert!((elevator.value() + 0.2).abs() < 1e-12);

        stick.set(1.0);
        fcs.update(0.02);
        assert_eq!(elevator.value(), -0.3);

        stick.set(0.03);
        fcs.update(0.02);
        assert_eq!(elevator.value(), 0.0);
    }

    #[test]
    fn test_dangling_input_rejected() {
        let def = FcsDefinition::from_json_str(
            r#"{ "nodes": [ { "name": "g", "kind": "gain", "input": "missing", "gain": 2.0 } ] }"#,
        )
        .unwrap();
        let err = FlightControlSystem::build(&def, &mut Bus::new("x")).unwrap_err();
        assert!(matches!(err, ConfigError::DanglingInput { ref node, ref input } if node == "g" && input == "missing"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let def = FcsDefinition::from_json_str(
            r#"{ "nodes": [
                { "name": "a", "kind": "constant", "value": 1.0 },
                { "name": "a", "kind": "constant", "value": 2.0 }
            ] }"#,
        )
        .unwrap();
        assert!(matches!(FlightControlSystem::build(&def, &mut Bus::new("x")), Err(ConfigError::DuplicateNode(_))));
    }

    #[test]
    fn test_algebraic_loop_rejected() {
        let def = FcsDefinition::from_json_str(
            r#"{ "nodes": [
                { "name": "a", "kind": "gain", "input": "b", "gain": 1.0 },
                { "name": "b", "kind": "sum", "inputs": ["a"] }
            ] }"#,
        )
        .unwrap();
        assert!(matches!(FlightControlSystem::build(&def, &mut Bus::new("x")), Err(ConfigError::AlgebraicLoop(_))));
    }

    #[test]
    fn test_feedback_through_lag() {
        // x' = (1 - x) / tau, closed through the lag.
        let def = FcsDefinition::from_json_str(
            r#"{ "nodes": [
                { "name": "one", "kind": "constant", "value": 1.0 },
                { "name": "neg", "kind": "gain", "input": "state", "gain": -1.0 },
                { "name": "err", "kind": "sum", "inputs": ["one", "neg"] },
                { "name": "target", "kind": "sum", "inputs": ["state", "err"] },
                { "name": "state", "kind": "lag", "input": "target", "time_constant": 0.5 }
            ] }"#,
        )
        .unwrap();
        let mut fcs = FlightControlSystem::build(&def, &mut Bus::new("x")).unwrap();
        let mut last = 0.0;
        for _ in 0..200 {
            fcs.update(0.02);
            let now = fcs.value("state").unwrap();
            assert!(now >= last);
            last = now;
        }
        assert!((last - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_lag_step_response() {
        let def = FcsDefinition::from_json_str(
            r#"{ "nodes": [
                { "name": "one", "kind": "constant", "value": 1.0 },
                { "name": "lag", "kind": "lag", "input": "one", "time_constant": 1.0 }
            ] }"#,
        )
        .unwrap();
        let mut fcs = FlightControlSystem::build(&def, &mut Bus::new("x")).unwrap();
        fcs.update(1.0);
        assert!((fcs.value("lag").unwrap() - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_value_lookup() {
        let fcs = FlightControlSystem::build(&FcsDefinition::default(), &mut Bus::new("x")).unwrap();
        assert!(matches!(fcs.value("nope"), Err(ConfigError::UnknownOutput(_))));
        assert_eq!(fcs.node_count(), 0);
    }

    #[test]
    fn test_product_and_sum() {
        let def = FcsDefinition::from_json_str(
            r#"{ "nodes": [
                { "name": "a", "kind": "constant", "value": 3.0 },
                { "name": "b", "kind": "constant", "value": -2.0 },
                { "name": "p", "kind": "product", "inputs": ["a", "b"] },
                { "name": "s", "kind": "sum", "inputs": ["a", "b", "p"] }
            ] }"#,
        )
        .unwrap();
        let mut fcs = FlightControlSystem::build(&def, &mut Bus::new("x")).unwrap();
        fcs.update(0.02);
        assert_eq!(fcs.value("p").unwrap(), -6.0);
        assert_eq!(fcs.value("s").unwrap(), -5.0);
    }
}
