use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
use clap::Args;

use crate::error::{Result, RlsError};

/// Parameters of one prediction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(Args))]
#[serde(default, deny_unknown_fields)]
pub struct PredictorConfig {
    /// The input window size N (filter order)
    #[cfg_attr(feature = "cli", arg(long = "dim-input", default_value_t = 1000))]
    #[serde(alias = "dim_input")]
    pub window_size: usize,

    /// How far past the end of the window to predict (>= 1)
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 1))]
    pub prediction_distance: usize,

    /// RLS forgetting factor lambda; (0, 1] is the stable range
    #[cfg_attr(feature = "cli", arg(long = "rls-lambda", default_value_t = 1.0))]
    #[serde(alias = "lambda")]
    pub forgetting_factor: f64,

    /// RLS regularization gamma; the initial P is I / gamma
    #[cfg_attr(
        feature = "cli",
        arg(long = "rls-gamma", visible_alias = "rls-delta", default_value_t = 0.001)
    )]
    #[serde(alias = "gamma", alias = "delta")]
    pub regularization: f64,

    /// Report mean squared error every nth sample
    #[cfg_attr(feature = "cli", arg(long = "print-every", default_value_t = 1000))]
    #[serde(alias = "print_every")]
    pub report_interval: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            prediction_distance: 1,
            forgetting_factor: 1.0,
            regularization: 0.001,
            report_interval: 1000,
        }
    }
}

impl PredictorConfig {
    /// Parses a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RlsError::invalid("config", e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| RlsError::invalid("config", format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Whether lambda lies in the theoretically stable range `(0, 1]`.
    pub fn is_forgetting_factor_stable(&self) -> bool {
        self.forgetting_factor > 0.0 && self.forgetting_factor <= 1.0
    }

    /// Checks every parameter. A positive lambda above 1 passes but is logged
    /// as a warning since `P` then decays toward zero.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(RlsError::invalid("window_size", "must be greater than 0"));
        }
        if self.prediction_distance == 0 {
            return Err(RlsError::invalid("prediction_distance", "must be at least 1"));
        }
        if self.report_interval == 0 {
            return Err(RlsError::invalid("report_interval", "must be greater than 0"));
        }
        if !(self.regularization.is_finite() && self.regularization > 0.0) {
            return Err(RlsError::invalid(
                "regularization",
                format!("must be a positive finite number, got {}", self.regularization),
            ));
        }
        if !(self.forgetting_factor.is_finite() && self.forgetting_factor > 0.0) {
            return Err(RlsError::invalid(
                "forgetting_factor",
                format!("must be a positive finite number, got {}", self.forgetting_factor),
            ));
        }
        if !self.is_forgetting_factor_stable() {
            tracing::warn!(
                lambda = self.forgetting_factor,
                "forgetting factor is outside the stable range (0, 1]"
            );
        }
        Ok(())
    }
}
