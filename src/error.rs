// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for the evolution engine.

use std::fmt;

use crate::registry::SystemId;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types.
#[derive(Debug)]
pub enum Error {
    /// Configuration error
    Config(String),
    /// Caller-supplied input rejected
    Validation(ValidationError),
    /// Runtime engine condition (unknown system, divergence, backpressure)
    Engine(EngineError),
    /// Numerical routine failed (e.g. singular Padé denominator)
    Numerical(String),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Engine(e) => write!(f, "Engine error: {}", e),
            Error::Numerical(msg) => write!(f, "Numerical error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Validation(e) => Some(e),
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::Validation(e)
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Input validation errors. These are programmer or configuration errors
/// reported synchronously at the offending call.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Dimension is not a positive power of two, or exceeds the limit
    InvalidDimension { dimension: usize, reason: String },
    /// Operand shapes disagree
    DimensionMismatch {
        operation: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// Time delta is negative or not finite
    NegativeTimeDelta(f64),
    /// Time scale is negative or not finite
    InvalidTimeScale(f64),
    /// Supplied density matrix violates the state invariants
    InvalidState(String),
    /// Field validation failed
    Field { field: String, message: String },
    /// Resource limit exceeded
    ResourceLimit {
        resource: String,
        limit: u64,
        requested: u64,
    },
}

impl ValidationError {
    pub(crate) fn mismatch(
        operation: &str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        ValidationError::DimensionMismatch {
            operation: operation.to_string(),
            expected,
            actual,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidDimension { dimension, reason } => {
                write!(f, "Invalid dimension {}: {}", dimension, reason)
            }
            ValidationError::DimensionMismatch {
                operation,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Dimension mismatch in {}: expected {}x{}, got {}x{}",
                    operation, expected.0, expected.1, actual.0, actual.1
                )
            }
            ValidationError::NegativeTimeDelta(dt) => {
                write!(f, "Time delta must be finite and non-negative, got {}", dt)
            }
            ValidationError::InvalidTimeScale(scale) => {
                write!(f, "Time scale must be finite and non-negative, got {}", scale)
            }
            ValidationError::InvalidState(msg) => write!(f, "Invalid density matrix: {}", msg),
            ValidationError::Field { field, message } => {
                write!(f, "Field '{}': {}", field, message)
            }
            ValidationError::ResourceLimit {
                resource,
                limit,
                requested,
            } => {
                write!(
                    f,
                    "Resource limit exceeded for {}: limit={}, requested={}",
                    resource, limit, requested
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Runtime engine conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The id was never allocated by this registry
    UnknownSystem(SystemId),
    /// Evolution of one system failed beyond repair and has been halted
    SimulationDivergence { system: SystemId, reason: String },
    /// Pending queue holds `capacity` distinct systems already
    QueueFull { capacity: usize },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownSystem(id) => write!(f, "Unknown system: {}", id),
            EngineError::SimulationDivergence { system, reason } => {
                write!(f, "Simulation diverged for {}: {}", system, reason)
            }
            EngineError::QueueFull { capacity } => {
                write!(f, "Pending queue full ({} systems)", capacity)
            }
        }
    }
}

impl std::error::Error for EngineError {}
