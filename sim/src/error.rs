//! Error types for the simulation core.
//!
//! Numerical non-convergence is deliberately absent here: solvers report it
//! through `NumericalMethod::failed()` and the physics model degrades
//! gracefully instead of returning an error.

use crate::battlefield::ObjectId;
use crate::battlefield::global::PeerId;
use thiserror::Error;

/// Errors raised by the spatial battlefield indices.
#[derive(Debug, Error, PartialEq)]
pub enum BattlefieldError {
    #[error("object {0} is not present in the battlefield")]
    NotFound(ObjectId),
    #[error("object {0} is already present")]
    AlreadyPresent(ObjectId),
    #[error("battlefield invariant violated: {0}")]
    InvariantViolation(String),
    #[error("peer {peer} does not own unit {unit}")]
    NotOwner { unit: ObjectId, peer: PeerId },
}

/// Errors raised while loading or wiring configuration data.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("node '{node}' references unknown input '{input}'")]
    DanglingInput { node: String, input: String },
    #[error("node '{0}' is defined more than once")]
    DuplicateNode(String),
    #[error("node '{0}' is part of a feedback loop without a lag element")]
    AlgebraicLoop(String),
    #[error("unknown output node '{0}'")]
    UnknownOutput(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Umbrella error for the public `SimWorld` API.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Battlefield(#[from] BattlefieldError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type SimResult<T> = Result<T, SimError>;
