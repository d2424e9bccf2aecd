use nalgebra::{DMatrix, DVector, DVectorView};

use crate::error::{Instability, Result, RlsError};

/// The result of a single [`FilterState::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// One-step-ahead prediction made with the weights *before* the update.
    pub output: f64,
    /// `target - output`.
    pub error: f64,
}

/// The state of a Recursive Least Squares (RLS) linear predictor.
///
/// Holds the predictor coefficients (`weight`) and the estimate of the
/// inverse input-autocorrelation matrix (`P`). Both are updated together by
/// [`observe`](Self::observe), one observation at a time.
#[derive(Debug, Clone)]
pub struct FilterState {
    /// The coefficient vector of size `N x 1`.
    weight: DVector<f64>,
    /// The inverse-correlation matrix (P) of size `N x N`.
    p: DMatrix<f64>,
    /// Regularization used to build the initial `P = I / gamma`.
    gamma: f64,
    /// The filter length N.
    order: usize,
    /// Number of completed updates.
    observations: u64,
    /// Set once `P` has been corrupted by a non-finite update.
    diverged: bool,
}

impl FilterState {
    /// Creates a new filter with zero weights and `P = I / gamma`.
    ///
    /// # Arguments
    ///
    /// * `order` - The filter length N, i.e. the size of every input window.
    /// * `gamma` - The regularization parameter. A small value (e.g. 0.001) gives a
    ///   large initial `P`, meaning low confidence in the zero weights and rapid
    ///   early adaptation.
    ///
    /// # Errors
    ///
    /// Returns [`RlsError::InvalidParameter`] if `order` is 0 or if `gamma` is not a
    /// strictly positive finite number.
    pub fn new(order: usize, gamma: f64) -> Result<Self> {
        if order == 0 {
            return Err(RlsError::invalid("order", "filter order must be greater than 0"));
        }
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(RlsError::invalid(
                "gamma",
                format!("regularization must be a positive finite number, got {gamma}"),
            ));
        }

        Ok(Self {
            weight: DVector::zeros(order),
            p: DMatrix::identity(order, order) / gamma,
            gamma,
            order,
            observations: 0,
            diverged: false,
        })
    }

    /// The filter length N.
    pub fn order(&self) -> usize {
        self.order
    }

    /// The regularization parameter the filter was built with.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// The current predictor coefficients.
    pub fn weight(&self) -> &[f64] {
        self.weight.as_slice()
    }

    /// The current inverse-correlation matrix `P`.
    pub fn inverse_correlation(&self) -> &DMatrix<f64> {
        &self.p
    }

    /// Number of successful updates since construction or the last [`reset`](Self::reset).
    pub fn observations(&self) -> u64 {
        self.observations
    }

    /// True once an update produced a non-finite `P`. A diverged filter refuses
    /// further observations until it is reset.
    pub fn is_diverged(&self) -> bool {
        self.diverged
    }

    /// Restores the initial state: zero weights and `P = I / gamma`.
    pub fn reset(&mut self) {
        self.weight.fill(0.0);
        self.p = DMatrix::identity(self.order, self.order) / self.gamma;
        self.observations = 0;
        self.diverged = false;
    }

    /// Predicts the next sample for a window without updating the filter.
    ///
    /// # Errors
    ///
    /// Returns [`RlsError::WindowLength`] if `x.len()` differs from the order.
    pub fn predict(&self, x: &[f64]) -> Result<f64> {
        let x = self.window(x)?;
        Ok(x.dot(&self.weight))
    }

    /// Predicts `y` from the window `x`, then updates the filter with the pair.
    ///
    /// This is the matrix-inversion-lemma form of RLS, O(N²) per call:
    ///
    /// ```text
    /// output = x . w
    /// error  = y - output
    /// xP     = P^T x
    /// a      = 1 / (lambda + xP . x)
    /// g      = (P x) a
    /// w      = w + error g
    /// P      = (P - g xP^T) / lambda
    /// ```
    ///
    /// The returned prediction uses the weights from *before* the update.
    ///
    /// # Arguments
    ///
    /// * `x` - The input window, exactly `order` samples long.
    /// * `y` - The target sample.
    /// * `lambda` - The forgetting factor. `(0, 1]` is the stable range; larger
    ///   positive values are accepted but make `P` shrink toward zero.
    ///
    /// # Errors
    ///
    /// * [`RlsError::InvalidParameter`] if `lambda` is not a positive finite number.
    /// * [`RlsError::WindowLength`] if `x.len()` differs from the order.
    /// * [`RlsError::NumericalInstability`] if the gain denominator is singular or
    ///   any produced value is non-finite. Nothing is written to the filter unless
    ///   the prediction, the gain and the new weights are all finite. If only the
    ///   updated `P` is non-finite, the weights keep their previous values, `P` is
    ///   unspecified and the filter stays diverged until [`reset`](Self::reset).
    pub fn observe(&mut self, x: &[f64], y: f64, lambda: f64) -> Result<Observation> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(RlsError::invalid(
                "lambda",
                format!("forgetting factor must be a positive finite number, got {lambda}"),
            ));
        }
        let x = self.window(x)?;
        if self.diverged {
            return Err(self.instability(Instability::Diverged));
        }

        let output = x.dot(&self.weight);
        let error = y - output;
        if !(output.is_finite() && error.is_finite()) {
            return Err(self.instability(Instability::NonFiniteOutput));
        }

        let xp = self.p.tr_mul(&x);
        let denominator = lambda + xp.dot(&x);
        if !denominator.is_finite() || denominator.abs() <= lambda * f64::EPSILON {
            return Err(self.instability(Instability::SingularDenominator(denominator)));
        }
        let a = 1.0 / denominator;
        let gain = (&self.p * &x) * a;

        let weight = &self.weight + &gain * error;
        if weight.iter().any(|w| !w.is_finite()) {
            return Err(self.instability(Instability::NonFiniteWeight));
        }

        // Rank-one update in place: P = (1/lambda) P - (1/lambda) g xP^T.
        let inv_lambda = 1.0 / lambda;
        self.p.ger(-inv_lambda, &gain, &xp, inv_lambda);
        if self.p.iter().any(|v| !v.is_finite()) {
            self.diverged = true;
            return Err(self.instability(Instability::NonFiniteCovariance));
        }
        self.weight = weight;

        self.observations += 1;
        Ok(Observation { output, error })
    }

    fn window<'a>(&self, x: &'a [f64]) -> Result<DVectorView<'a, f64>> {
        if x.len() != self.order {
            return Err(RlsError::WindowLength {
                expected: self.order,
                actual: x.len(),
            });
        }
        Ok(DVectorView::from_slice(x, self.order))
    }

    fn instability(&self, kind: Instability) -> RlsError {
        RlsError::NumericalInstability {
            step: self.observations,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const A_TOL: f64 = 1e-9; // Absolute tolerance for float comparisons

    fn random_window(rng: &mut impl Rng, n: usize) -> Vec<f64> {
        (0..n).map(|_| rng.random_range(-1.0..1.0)).collect()
    }

    fn max_asymmetry(p: &DMatrix<f64>) -> f64 {
        (p - p.transpose()).amax()
    }

    #[test]
    fn test_new_filter_state() {
        let state = FilterState::new(3, 0.5).unwrap();
        assert_eq!(state.order(), 3);
        assert_eq!(state.weight(), &[0.0, 0.0, 0.0]);
        assert_eq!(
            state.p,
            DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0, 2.0]))
        );
        assert_eq!(state.observations(), 0);
        assert!(!state.is_diverged());
    }

    #[test]
    fn test_new_rejects_invalid_parameters() {
        assert!(matches!(
            FilterState::new(0, 1.0),
            Err(RlsError::InvalidParameter { name: "order", .. })
        ));
        for gamma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                FilterState::new(4, gamma),
                Err(RlsError::InvalidParameter { name: "gamma", .. })
            ));
        }
    }

    #[test]
    fn test_predict() {
        let mut state = FilterState::new(2, 1.0).unwrap();
        state.weight = DVector::from_vec(vec![1.5, -2.0]);
        // prediction = 10.0 * 1.5 + 3.0 * -2.0 = 15.0 - 6.0 = 9.0
        assert!((state.predict(&[10.0, 3.0]).unwrap() - 9.0).abs() < A_TOL);
    }

    #[test]
    fn test_single_observe_matches_hand_computation() {
        let mut state = FilterState::new(2, 1.0).unwrap();

        // P0 = I, w0 = 0
        // xP = [0.1, 0.2], xP.x = 0.05, a = 1 / 1.05
        // g = [0.095238, 0.190476]
        let obs = state.observe(&[0.1, 0.2], 0.3, 1.0).unwrap();
        assert!(obs.output.abs() < A_TOL);
        assert!((obs.error - 0.3).abs() < A_TOL);

        let a = 1.0 / 1.05;
        let expected_weight = [0.3 * 0.1 * a, 0.3 * 0.2 * a];
        for (w, e) in state.weight().iter().zip(expected_weight) {
            assert!((w - e).abs() < A_TOL);
        }
        assert!((state.weight()[0] - 0.028571).abs() < 1e-6);
        assert!((state.weight()[1] - 0.057143).abs() < 1e-6);

        let p = state.inverse_correlation();
        assert!((p[(0, 0)] - (1.0 - 0.01 * a)).abs() < A_TOL);
        assert!((p[(0, 1)] + 0.02 * a).abs() < A_TOL);
        assert!((p[(1, 0)] + 0.02 * a).abs() < A_TOL);
        assert!((p[(1, 1)] - (1.0 - 0.04 * a)).abs() < A_TOL);
        assert!((p[(0, 0)] - 0.990476).abs() < 1e-6);
        assert!((p[(1, 1)] - 0.961905).abs() < 1e-6);
        assert_eq!(state.observations(), 1);
    }

    #[test]
    fn test_observe_rejects_bad_window_and_lambda() {
        let mut state = FilterState::new(3, 1.0).unwrap();
        assert_eq!(
            state.observe(&[1.0, 2.0], 0.0, 1.0),
            Err(RlsError::WindowLength {
                expected: 3,
                actual: 2
            })
        );
        for lambda in [0.0, -0.5, f64::NAN] {
            assert!(matches!(
                state.observe(&[1.0, 2.0, 3.0], 0.0, lambda),
                Err(RlsError::InvalidParameter { name: "lambda", .. })
            ));
        }
        assert_eq!(state.observations(), 0);
    }

    #[test]
    fn test_zero_window_scales_p_only() {
        let mut rng = rand::rng();
        let mut state = FilterState::new(4, 0.1).unwrap();
        for _ in 0..20 {
            let x = random_window(&mut rng, 4);
            state.observe(&x, rng.random_range(-1.0..1.0), 0.95).unwrap();
        }

        let lambda = 0.9;
        let weight_before = state.weight().to_vec();
        let p_before = state.inverse_correlation().clone();

        let obs = state.observe(&[0.0; 4], 0.7, lambda).unwrap();
        assert_eq!(obs.output, 0.0);
        assert_eq!(obs.error, 0.7);
        assert_eq!(state.weight(), weight_before.as_slice());

        let expected_p = &p_before / lambda;
        assert!((state.inverse_correlation() - expected_p).amax() < A_TOL);
    }

    #[test]
    fn test_p_stays_symmetric_without_forgetting() {
        let mut rng = rand::rng();
        let mut state = FilterState::new(6, 0.01).unwrap();
        for _ in 0..500 {
            let x = random_window(&mut rng, 6);
            state.observe(&x, rng.random_range(-1.0..1.0), 1.0).unwrap();
            assert!(max_asymmetry(state.inverse_correlation()) < A_TOL);
        }
    }

    #[test]
    fn test_observation_order_matters() {
        let pairs = [
            ([0.1, 0.2], 0.3),
            ([0.5, -0.4], 0.1),
            ([-0.3, 0.9], -0.2),
            ([0.7, 0.7], 0.5),
        ];

        let mut forward = FilterState::new(2, 1.0).unwrap();
        for (x, y) in pairs.iter() {
            forward.observe(x, *y, 0.9).unwrap();
        }
        let mut backward = FilterState::new(2, 1.0).unwrap();
        for (x, y) in pairs.iter().rev() {
            backward.observe(x, *y, 0.9).unwrap();
        }

        let diff: f64 = forward
            .weight()
            .iter()
            .zip(backward.weight())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff > 1e-6, "state should depend on observation order");
    }

    #[test]
    fn test_identical_runs_are_bit_identical() {
        let mut rng = rand::rng();
        let data: Vec<(Vec<f64>, f64)> = (0..200)
            .map(|_| (random_window(&mut rng, 5), rng.random_range(-1.0..1.0)))
            .collect();

        let run = || {
            let mut state = FilterState::new(5, 0.01).unwrap();
            let outputs: Vec<Observation> = data
                .iter()
                .map(|(x, y)| state.observe(x, *y, 0.99).unwrap())
                .collect();
            (outputs, state.weight().to_vec())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_overflowing_denominator_is_reported_without_mutation() {
        let mut state = FilterState::new(2, 1e-300).unwrap();
        let err = state.observe(&[1e5, 1e5], 1.0, 1.0).unwrap_err();
        assert!(matches!(
            err,
            RlsError::NumericalInstability {
                step: 0,
                kind: Instability::SingularDenominator(_)
            }
        ));
        assert_eq!(state.weight(), &[0.0, 0.0]);
        assert_eq!(state.observations(), 0);
        assert!(!state.is_diverged());
    }

    #[test]
    fn test_non_finite_target_is_reported() {
        let mut state = FilterState::new(2, 1.0).unwrap();
        let err = state.observe(&[0.1, 0.2], f64::NAN, 1.0).unwrap_err();
        assert!(matches!(
            err,
            RlsError::NumericalInstability {
                kind: Instability::NonFiniteOutput,
                ..
            }
        ));
    }

    #[test]
    fn test_diverged_filter_refuses_until_reset() {
        let mut state = FilterState::new(2, 1.0).unwrap();
        state.observe(&[0.1, 0.2], 0.3, 1.0).unwrap();
        state.diverged = true;

        let err = state.observe(&[0.1, 0.2], 0.3, 1.0).unwrap_err();
        assert_eq!(
            err,
            RlsError::NumericalInstability {
                step: 1,
                kind: Instability::Diverged
            }
        );

        state.reset();
        assert!(!state.is_diverged());
        assert_eq!(state.weight(), &[0.0, 0.0]);
        assert_eq!(state.inverse_correlation(), &DMatrix::identity(2, 2));
        assert!(state.observe(&[0.1, 0.2], 0.3, 1.0).is_ok());
    }

    #[test]
    fn test_unbounded_p_growth_marks_filter_diverged() {
        // Zero windows with lambda = 0.5 double P every step: 1e300 * 2^28 overflows.
        let mut state = FilterState::new(2, 1e-300).unwrap();
        for _ in 0..27 {
            let obs = state.observe(&[0.0, 0.0], 0.25, 0.5).unwrap();
            assert_eq!(obs.error, 0.25);
        }
        assert!(!state.is_diverged());

        let err = state.observe(&[0.0, 0.0], 0.25, 0.5).unwrap_err();
        assert_eq!(
            err,
            RlsError::NumericalInstability {
                step: 27,
                kind: Instability::NonFiniteCovariance
            }
        );
        assert!(state.is_diverged());
        assert_eq!(state.observations(), 27);

        let err = state.observe(&[0.0, 0.0], 0.25, 0.5).unwrap_err();
        assert_eq!(
            err,
            RlsError::NumericalInstability {
                step: 27,
                kind: Instability::Diverged
            }
        );

        state.reset();
        assert!(!state.is_diverged());
        assert_eq!(state.observations(), 0);
        assert_eq!(state.inverse_correlation()[(0, 0)], 1.0 / 1e-300);
        assert!(state.observe(&[0.0, 0.0], 0.25, 0.5).is_ok());
    }

    #[test]
    fn test_weights_survive_covariance_overflow() {
        let mut state = FilterState::new(2, 1e-300).unwrap();
        state.observe(&[1.0, 0.0], 1.0, 0.5).unwrap();
        assert!(state.weight()[0].abs() > 0.5);

        let mut weight_before = state.weight().to_vec();
        let mut observed = state.observations();
        let err = loop {
            match state.observe(&[0.0, 0.0], 0.0, 0.5) {
                Ok(_) => {
                    weight_before = state.weight().to_vec();
                    observed = state.observations();
                }
                Err(e) => break e,
            }
            assert!(observed < 100, "P should overflow well before 100 steps");
        };

        assert!(matches!(
            err,
            RlsError::NumericalInstability {
                kind: Instability::NonFiniteCovariance,
                ..
            }
        ));
        assert_eq!(state.weight(), weight_before.as_slice());
        assert_eq!(state.observations(), observed);
    }

    #[test]
    fn test_overflowing_weight_is_reported_without_mutation() {
        // g = 1e6 * 1e-3 / (1 + 1) = 500, so error * g overflows.
        let mut state = FilterState::new(2, 1e-6).unwrap();
        let err = state.observe(&[1e-3, 0.0], 1e308, 1.0).unwrap_err();
        assert_eq!(
            err,
            RlsError::NumericalInstability {
                step: 0,
                kind: Instability::NonFiniteWeight
            }
        );
        assert_eq!(state.weight(), &[0.0, 0.0]);
        assert_eq!(state.inverse_correlation()[(0, 0)], 1.0 / 1e-6);
        assert!(!state.is_diverged());
    }

    #[test]
    fn test_zero_denominator_is_reported() {
        let mut state = FilterState::new(2, 1.0).unwrap();
        state.p = -DMatrix::identity(2, 2);
        let err = state.observe(&[1.0, 0.0], 0.5, 1.0).unwrap_err();
        assert!(matches!(
            err,
            RlsError::NumericalInstability {
                step: 0,
                kind: Instability::SingularDenominator(d)
            } if d == 0.0
        ));
        assert_eq!(state.weight(), &[0.0, 0.0]);
    }

    #[test]
    fn test_convergence() {
        // See if the filter can learn a simple linear relationship over time.
        let true_weight = [2.5, -3.0, 1.2];
        let mut state = FilterState::new(true_weight.len(), 0.001).unwrap();

        let mut rng = rand::rng();
        for _ in 0..2000 {
            let x: Vec<f64> = (0..true_weight.len())
                .map(|_| rng.random_range(-5.0..5.0))
                .collect();
            let noise = rng.random_range(-0.1..0.1);
            let y: f64 = x.iter().zip(true_weight).map(|(a, b)| a * b).sum::<f64>() + noise;

            state.observe(&x, y, 0.99).unwrap();
        }

        let difference: f64 = state
            .weight()
            .iter()
            .zip(true_weight)
            .map(|(w, t)| (w - t).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!(difference < 0.1, "Filter did not converge to the true weights.");
    }
}
