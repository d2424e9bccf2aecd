use audio_rls::{PredictorConfig, StreamPredictor};
use rand::Rng;

fn main() {
    // --- 1. Setup ---
    let config = PredictorConfig {
        window_size: 16,
        prediction_distance: 1,
        forgetting_factor: 0.995,
        regularization: 0.01,
        report_interval: 1000,
    };

    let num_points = 10_000;
    let mut rng = rand::rng();
    let samples: Vec<f64> = (0..num_points)
        .map(|i| {
            let t = i as f64 / 8000.0;
            0.4 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()
                + 0.2 * (2.0 * std::f64::consts::PI * 660.0 * t).sin()
                + rng.random_range(-0.02..0.02)
        })
        .collect();

    // --- 2. Run ---
    let mut predictor = StreamPredictor::new(config).expect("valid configuration");
    let run = predictor
        .run_with_reports(&samples, |report| {
            println!("Step {:>5} ({:5.1}%): mse = {:.6}", report.step, report.progress(), report.mse);
        })
        .expect("filter stays stable");

    println!("\n--- Final Learned Weights ---");
    println!("{:?}", predictor.filter().weight());
    println!("Overall mse: {:.6}", run.mean_squared_error());
    println!("The noise floor is about {:.6}.", 0.02f64.powi(2) / 3.0);
}
