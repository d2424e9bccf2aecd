//! Error types for the RLS engine and streaming driver.

use std::fmt;
use thiserror::Error;

/// Result type for filter and driver operations.
pub type Result<T> = std::result::Result<T, RlsError>;

/// The quantity that went wrong when the recursion broke down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instability {
    /// `lambda + x^T P x` was zero, non-finite, or indistinguishable from zero.
    SingularDenominator(f64),
    /// The prediction or its error was non-finite.
    NonFiniteOutput,
    /// The updated weight vector contained a non-finite entry.
    NonFiniteWeight,
    /// The updated inverse-correlation matrix contained a non-finite entry.
    NonFiniteCovariance,
    /// The filter already diverged on an earlier step.
    Diverged,
}

impl fmt::Display for Instability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instability::SingularDenominator(d) => write!(f, "gain denominator is singular ({d:e})"),
            Instability::NonFiniteOutput => write!(f, "prediction is not finite"),
            Instability::NonFiniteWeight => write!(f, "weight vector is not finite"),
            Instability::NonFiniteCovariance => {
                write!(f, "inverse-correlation matrix is not finite")
            }
            Instability::Diverged => write!(f, "filter already diverged"),
        }
    }
}

/// Errors surfaced by [`FilterState`](crate::FilterState) and
/// [`StreamPredictor`](crate::StreamPredictor).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RlsError {
    /// A configuration value is out of its valid range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// An input window does not match the filter order.
    #[error("window length mismatch: expected {expected}, got {actual}")]
    WindowLength { expected: usize, actual: usize },

    /// The sample sequence cannot yield a single prediction step.
    #[error(
        "sequence of {len} samples is too short for window {window} and prediction distance {distance}"
    )]
    SequenceTooShort {
        len: usize,
        window: usize,
        distance: usize,
    },

    /// The recursion diverged; `step` is the index of the failing observation.
    #[error("filter diverged numerically at step {step}: {kind}")]
    NumericalInstability { step: u64, kind: Instability },
}

impl RlsError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        RlsError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// True for errors caused by bad parameters or badly shaped input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            RlsError::InvalidParameter { .. }
                | RlsError::WindowLength { .. }
                | RlsError::SequenceTooShort { .. }
        )
    }

    /// True when the filter diverged while processing.
    pub fn is_numerical(&self) -> bool {
        matches!(self, RlsError::NumericalInstability { .. })
    }

    /// Re-tags a numerical failure with the step index of the caller's run.
    pub fn at_step(self, step: u64) -> Self {
        match self {
            RlsError::NumericalInstability { kind, .. } => {
                RlsError::NumericalInstability { step, kind }
            }
            other => other,
        }
    }
}
