//! Errors for host-supplied configuration.
//!
//! Layout and query operations never fail; the only fallible surface is
//! configuration handed over by the host before a run.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("`{field}` must be a finite number")]
    NotFinite { field: &'static str },

    #[error("`{field}` = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("`{field}` must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid configuration object: {0}")]
    Deserialize(String),
}

impl From<serde_wasm_bindgen::Error> for ConfigError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        Self::Deserialize(err.to_string())
    }
}

/// Check that `value` is finite and within `[min, max]`.
pub(crate) fn check_range(
    field: &'static str,
    value: f32,
    min: f32,
    max: f32,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field });
    }
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            expected,
        });
    }
    Ok(())
}

/// Check that `value` is finite and strictly positive.
pub(crate) fn check_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { field });
    }
    if value <= 0.0 {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

/// Check that a count is non-zero.
pub(crate) fn check_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range("damping", 0.8, 0.0, 1.0, "0..=1").is_ok());
        assert_eq!(
            check_range("damping", f32::NAN, 0.0, 1.0, "0..=1"),
            Err(ConfigError::NotFinite { field: "damping" })
        );
        let err = check_range("theta", -1.0, 0.0, 10.0, "0..=10").unwrap_err();
        assert_eq!(err.to_string(), "`theta` = -1 is out of range (expected 0..=10)");
    }

    #[test]
    fn test_check_positive_and_nonzero() {
        assert!(check_positive("springLength", 0.1).is_ok());
        assert_eq!(
            check_positive("springLength", 0.0),
            Err(ConfigError::Zero { field: "springLength" })
        );
        assert!(check_nonzero("leafThreshold", 8).is_ok());
        assert!(check_nonzero("leafThreshold", 0).is_err());
    }
}
