//! enhance-rt CLI
//!
//! Enhance a WAV file with a fixed-hop engine and report the real-time factor.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use enhance_rt::audio::{read_wav, write_wav};
use enhance_rt::config::Settings;
use enhance_rt::{
    create_engine, AudioStream, EngineKind, EnhanceError, EnhancementEngine, LengthPolicy, Pipeline, ResamplingQuality, WavEncoding,
};

#[derive(Parser)]
#[command(name = "enhance-rt")]
#[command(author, version, about = "Streaming speech enhancement with RTF measurement", long_about = None)]
struct Cli {
    /// Input WAV file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output WAV file (written only if every stage succeeds)
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Attenuation limit in dB, 0 to 100 [default: 100]
    #[arg(short = 'a', long = "atten-lim", value_name = "DB")]
    atten_lim: Option<f32>,

    /// Enhancement engine
    #[arg(long, value_enum, default_value = "spectral")]
    engine: EngineArg,

    /// INI file with [engine] and [pipeline] sections
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Resampling quality
    #[arg(long, value_enum)]
    quality: Option<QualityArg>,

    /// Keep the resampler's output length instead of matching the input
    #[arg(long)]
    keep_resampled_length: bool,

    /// Write 32-bit float samples instead of 16-bit PCM
    #[arg(long)]
    float: bool,

    /// Run a few silent frames through the engine before timing
    #[arg(long)]
    warmup: bool,

    /// Write per-frame engine call times as CSV
    #[arg(long, value_name = "PATH")]
    latency_csv: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Spectral,
    Passthrough,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Spectral => EngineKind::SpectralGate,
            EngineArg::Passthrough => EngineKind::Passthrough,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum QualityArg {
    High,
    Medium,
    Low,
}

impl From<QualityArg> for ResamplingQuality {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::High => ResamplingQuality::High,
            QualityArg::Medium => ResamplingQuality::Medium,
            QualityArg::Low => ResamplingQuality::Low,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        let stage = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<EnhanceError>())
            .map_or("io", EnhanceError::stage);
        eprintln!("error [{}]: {:#}", stage, e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(atten_lim) = cli.atten_lim {
        settings.engine.atten_lim_db = atten_lim;
    }
    if let Some(quality) = cli.quality {
        settings.pipeline.resample_quality = quality.into();
    }
    if cli.keep_resampled_length {
        settings.pipeline.length_policy = LengthPolicy::KeepResampled;
    }
    // The pipeline feeds one folded channel.
    settings.engine.channels = 1;

    let mut engine = create_engine(cli.engine.into(), &settings.engine)?;
    if cli.warmup {
        engine.warmup()?;
    }

    let input = read_wav(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;
    println!(
        "Input: {} Hz, {} channels, {:.2} seconds",
        input.sample_rate(),
        input.channels(),
        input.duration_secs()
    );
    if input.sample_rate() != engine.sample_rate() {
        println!(
            "Resampling {} Hz -> {} Hz -> {} Hz",
            input.sample_rate(),
            engine.sample_rate(),
            input.sample_rate()
        );
    }

    let mut pipeline = Pipeline::new(engine, settings.pipeline.clone())?;
    let enhanced = pipeline.run(&input)?;

    let encoding = if cli.float {
        WavEncoding::Float32
    } else {
        WavEncoding::Pcm16
    };
    let csv = cli.latency_csv.as_deref().map(|path| (path, enhanced.frames.to_csv()));
    write_outputs(&cli.output, &enhanced.stream, encoding, csv)?;

    println!("{}", enhanced.timing);
    println!(
        "Hops: {} x {} samples ({} padded), engine latency {} samples",
        enhanced.plan.engine_calls(),
        enhanced.plan.hop_size,
        enhanced.plan.padding(),
        enhanced.latency_samples
    );
    println!("{}", enhanced.frames);
    println!("Saved to {}", cli.output.display());
    if let Some(csv_path) = &cli.latency_csv {
        println!("Latency CSV written to {}", csv_path.display());
    }

    Ok(())
}

/// Write the latency CSV, then the WAV. The WAV only appears once everything
/// else succeeded; if it fails, the CSV is removed again.
fn write_outputs(
    output: &Path,
    stream: &AudioStream,
    encoding: WavEncoding,
    csv: Option<(&Path, String)>,
) -> Result<()> {
    if let Some((csv_path, rows)) = &csv {
        std::fs::write(csv_path, rows).with_context(|| format!("writing {}", csv_path.display()))?;
    }
    if let Err(e) = write_wav(output, stream, encoding) {
        if let Some((csv_path, _)) = &csv {
            let _ = std::fs::remove_file(csv_path);
        }
        return Err(anyhow::Error::new(e).context(format!("writing {}", output.display())));
    }
    Ok(())
}
