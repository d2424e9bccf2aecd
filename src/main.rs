use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use audio_rls::logging::{init_logging, LogConfig, LogFormat};
use audio_rls::{pcm, wav, PredictionRun, PredictorConfig, RlsError, StreamPredictor};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "audio-rls")]
#[command(about = "Predict audio samples with an online RLS filter")]
struct Cli {
    /// Input WAV file (mono, 16-bit PCM)
    input_file: PathBuf,

    #[command(flatten)]
    config: PredictorConfig,

    /// Read the predictor configuration from a TOML file instead of the flags above
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Write predicted data to a WAV file
    #[arg(long)]
    prediction_output: Option<PathBuf>,

    /// Write prediction error to a WAV file
    #[arg(long)]
    error_output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn write_output(path: &Path, sample_rate: u32, data: &[f64]) -> anyhow::Result<()> {
    let quantized = pcm::quantize_i16(data);
    wav::write_wav(path, sample_rate, &quantized.samples)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), clipped = quantized.clipped, "wrote output");
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = match &cli.config_file {
        Some(path) => PredictorConfig::load(path)?,
        None => cli.config.clone(),
    };
    info!(config = ?config, "starting prediction");

    let audio = wav::read_wav(&cli.input_file)
        .with_context(|| format!("reading {}", cli.input_file.display()))?;
    info!(
        sample_rate = audio.sample_rate,
        samples = audio.samples.len(),
        "loaded input"
    );
    let samples = pcm::normalize_i16(&audio.samples);

    let mut predictor = StreamPredictor::new(config)?;
    let result: PredictionRun = predictor.run_with_reports(&samples, |report| {
        println!("{:.2}%\t{:.5}", report.progress(), report.mse);
    })?;

    if let Some(path) = &cli.prediction_output {
        write_output(path, audio.sample_rate, &result.outputs)?;
    }
    if let Some(path) = &cli.error_output {
        write_output(path, audio.sample_rate, &result.errors)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&LogConfig {
        verbose: cli.verbose,
        format: cli.log_format,
    });

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<RlsError>() {
                Some(e) if e.is_configuration_error() => {
                    error!("invalid configuration: {e}");
                }
                Some(e) if e.is_numerical() => {
                    error!("filter diverged during processing: {e}");
                }
                _ => error!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
