// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input validation for registration and submission.

use ndarray::Array2;
use num_complex::Complex64;

use crate::config::LimitsConfig;
use crate::error::{Result, ValidationError};

/// Validate a Hilbert-space dimension: a positive power of two within limits.
pub fn validate_dimension(dimension: usize, limits: &LimitsConfig) -> Result<()> {
    if dimension == 0 || !dimension.is_power_of_two() {
        return Err(ValidationError::InvalidDimension {
            dimension,
            reason: "not a power of two".into(),
        }
        .into());
    }
    if dimension > limits.max_dimension {
        return Err(ValidationError::InvalidDimension {
            dimension,
            reason: format!("exceeds max_dimension {}", limits.max_dimension),
        }
        .into());
    }
    Ok(())
}

/// Validate that an operator is `dimension × dimension` with finite entries.
pub fn validate_operator(name: &str, op: &Array2<Complex64>, dimension: usize) -> Result<()> {
    if op.dim() != (dimension, dimension) {
        return Err(ValidationError::mismatch(name, (dimension, dimension), op.dim()).into());
    }
    if let Some(((i, j), _)) = op
        .indexed_iter()
        .find(|(_, z)| !(z.re.is_finite() && z.im.is_finite()))
    {
        return Err(ValidationError::Field {
            field: name.into(),
            message: format!("contains a non-finite entry at ({}, {})", i, j),
        }
        .into());
    }
    Ok(())
}

/// Validate a time delta: finite and non-negative.
pub fn validate_time_delta(dt: f64) -> Result<()> {
    if !dt.is_finite() || dt < 0.0 {
        return Err(ValidationError::NegativeTimeDelta(dt).into());
    }
    Ok(())
}

/// Validate a time scale: finite and non-negative.
pub fn validate_time_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale < 0.0 {
        return Err(ValidationError::InvalidTimeScale(scale).into());
    }
    Ok(())
}

/// Validate that one more system fits under `limits.max_systems`.
pub fn validate_capacity(registered: usize, limits: &LimitsConfig) -> Result<()> {
    if registered >= limits.max_systems {
        return Err(ValidationError::ResourceLimit {
            resource: "systems".into(),
            limit: limits.max_systems as u64,
            requested: registered as u64 + 1,
        }
        .into());
    }
    Ok(())
}
