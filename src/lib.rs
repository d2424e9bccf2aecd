//! Online Recursive Least Squares (RLS) prediction of audio samples.
//!
//! A [`FilterState`] predicts one sample from a fixed window of preceding
//! samples and updates itself with the prediction error. A
//! [`StreamPredictor`] slides that window over a whole sample sequence, one
//! step at a time, collecting the predictions and errors.
//!
//! ```
//! use audio_rls::{predict_sequence, PredictorConfig};
//!
//! let samples: Vec<f64> = (0..2000).map(|i| (0.03 * i as f64).sin()).collect();
//! let config = PredictorConfig {
//!     window_size: 8,
//!     forgetting_factor: 0.999,
//!     regularization: 0.01,
//!     report_interval: 500,
//!     ..Default::default()
//! };
//! let run = predict_sequence(&samples, &config).unwrap();
//! assert_eq!(run.len(), samples.len() - 8);
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
#[cfg(feature = "cli")]
pub mod logging;
pub mod pcm;
pub mod wav;

pub use config::PredictorConfig;
pub use driver::{predict_sequence, total_steps, MseReport, PredictionRun, StreamPredictor};
pub use error::{Instability, Result, RlsError};
pub use filter::{FilterState, Observation};
