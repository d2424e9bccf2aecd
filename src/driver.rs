//! Streaming driver: slides a window over a sample sequence and feeds each
//! (window, target) pair to a [`FilterState`] in order.
//!
//! For a window of N samples and a prediction distance D, step `t` uses
//!
//! ```text
//! x_t = S[t .. t + N]
//! y_t = S[t + N + D - 1]
//! ```
//!
//! for `t = 0 .. len(S) - N - D + 1`. Every step depends on the state left by
//! the previous one, so a single stream is strictly sequential.

use crate::config::PredictorConfig;
use crate::error::{Result, RlsError};
use crate::filter::FilterState;

/// Mean squared error over one reporting interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MseReport {
    /// The step about to be observed; the report covers the `interval` steps before it.
    pub step: usize,
    /// Number of steps in the whole run.
    pub total_steps: usize,
    /// Number of steps averaged.
    pub interval: usize,
    /// Mean of `error^2` over those steps.
    pub mse: f64,
}

impl MseReport {
    /// Percentage of the run completed when the report was emitted.
    pub fn progress(&self) -> f64 {
        100.0 * self.step as f64 / self.total_steps as f64
    }
}

/// Predictions and errors of a run, both indexed by step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionRun {
    pub outputs: Vec<f64>,
    pub errors: Vec<f64>,
}

impl PredictionRun {
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Mean squared prediction error over every step of the run.
    pub fn mean_squared_error(&self) -> f64 {
        if self.errors.is_empty() {
            return 0.0;
        }
        self.errors.iter().map(|e| e * e).sum::<f64>() / self.errors.len() as f64
    }
}

/// Number of prediction steps for a sequence, or `None` when the sequence is
/// shorter than `window + distance`.
pub fn total_steps(len: usize, window: usize, distance: usize) -> Option<usize> {
    let span = window.checked_add(distance)?;
    if len < span {
        return None;
    }
    Some(len - span + 1)
}

/// Drives one [`FilterState`] across sample sequences.
#[derive(Debug, Clone)]
pub struct StreamPredictor {
    filter: FilterState,
    config: PredictorConfig,
}

impl StreamPredictor {
    /// Validates `config` and builds a fresh filter for it.
    pub fn new(config: PredictorConfig) -> Result<Self> {
        config.validate()?;
        let filter = FilterState::new(config.window_size, config.regularization)?;
        Ok(Self { filter, config })
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Runs the predictor over `samples`, discarding interval reports.
    pub fn run(&mut self, samples: &[f64]) -> Result<PredictionRun> {
        self.run_with_reports(samples, |_| {})
    }

    /// Runs the predictor over `samples`, calling `on_report` every
    /// `report_interval` steps.
    ///
    /// At step `t > 0` with `t % report_interval == 0` a report covering steps
    /// `t - report_interval .. t` is emitted before step `t` is observed. There
    /// is no report at `t = 0` and none for a trailing partial interval.
    ///
    /// # Errors
    ///
    /// * [`RlsError::SequenceTooShort`] if no step fits; the filter is untouched.
    /// * [`RlsError::NumericalInstability`] tagged with the failing step index.
    pub fn run_with_reports<F>(&mut self, samples: &[f64], mut on_report: F) -> Result<PredictionRun>
    where
        F: FnMut(&MseReport),
    {
        let window = self.config.window_size;
        let distance = self.config.prediction_distance;
        let lambda = self.config.forgetting_factor;
        let interval = self.config.report_interval;

        let steps = total_steps(samples.len(), window, distance).ok_or(
            RlsError::SequenceTooShort {
                len: samples.len(),
                window,
                distance,
            },
        )?;

        let mut run = PredictionRun {
            outputs: Vec::with_capacity(steps),
            errors: Vec::with_capacity(steps),
        };
        let mut error_sqr_sum = 0.0;

        for t in 0..steps {
            if t > 0 && t % interval == 0 {
                let report = MseReport {
                    step: t,
                    total_steps: steps,
                    interval,
                    mse: error_sqr_sum / interval as f64,
                };
                tracing::debug!(
                    step = t,
                    progress = report.progress(),
                    mse = report.mse,
                    "interval report"
                );
                on_report(&report);
                error_sqr_sum = 0.0;
            }

            let x = &samples[t..t + window];
            let y = samples[t + window + distance - 1];
            let obs = self
                .filter
                .observe(x, y, lambda)
                .map_err(|e| e.at_step(t as u64))?;
            error_sqr_sum += obs.error * obs.error;

            run.outputs.push(obs.output);
            run.errors.push(obs.error);
        }

        tracing::info!(
            steps,
            mse = run.mean_squared_error(),
            "prediction run complete"
        );
        Ok(run)
    }
}

/// Builds a fresh [`StreamPredictor`] for `config` and runs it over `samples`.
pub fn predict_sequence(samples: &[f64], config: &PredictorConfig) -> Result<PredictionRun> {
    StreamPredictor::new(config.clone())?.run(samples)
}
