//! # enhance-rt
//!
//! Streaming speech-enhancement harness with real-time-factor measurement.
//!
//! This crate drives a stateful, fixed-hop enhancement engine (DeepFilterNet-style
//! frame processors, classical spectral gates, test stubs) over audio of any sample
//! rate. Input is folded to mono and resampled to the engine's native rate, cut
//! into exact hops (the last partial hop is zero-padded and the padding trimmed
//! off again), then resampled back to the original rate.
//!
//! ## Quick Start
//!
//! ```ignore
//! use enhance_rt::{create_engine, AudioStream, EngineConfig, EngineKind, Pipeline, PipelineConfig};
//!
//! let engine = create_engine(EngineKind::SpectralGate, &EngineConfig::default())?;
//! let mut pipeline = Pipeline::new(engine, PipelineConfig::default())?;
//!
//! let input = enhance_rt::audio::read_wav("noisy.wav")?;
//! let enhanced = pipeline.run(&input)?;
//! println!("{}", enhanced.timing);
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! raw audio → mono f32 → resample to engine rate → hop loop (1 call / hop, in order)
//!           → reassembly (padding trimmed) → resample back → output
//! ```
//!
//! Only the hop loop is timed. The real-time factor characterises the engine, not
//! file I/O or resampling overhead.
//!
//! ## API Levels
//!
//! - [`Pipeline`] - batch API. Pass a whole [`AudioStream`], get the enhanced stream
//!   plus a [`TimingRecord`] and per-frame [`FrameStats`].
//! - [`HopStream`] - streaming API. Push any chunk length, receive completed hops,
//!   `flush` at the end of the stream.
//! - [`enhance_hops`] - the bare framing loop over an engine at its native rate.
//!
//! ## Logging
//!
//! This crate logs through the `log` facade. Install any logger in the binary
//! (the bundled `enhance-rt` CLI uses `env_logger`; set `RUST_LOG=debug` to see
//! per-frame budget overruns).
//!
//! ## Thread Safety
//!
//! An engine handle carries causal state and is driven from one thread at a time.
//! Every bundled engine is `Send`; create separate instances for parallel streams -
//! they do not share state.

pub mod audio;
pub mod config;
pub mod engine;
pub mod framing;
pub mod pipeline;
pub mod resample;
pub mod stft;
pub mod timing;

pub use audio::{AudioStream, PcmSample, WavEncoding};
pub use config::{EngineConfig, LengthPolicy, PipelineConfig, Settings};
pub use engine::{create_engine, EngineKind, EnhancementEngine, Frame, Passthrough, SpectralGate};
pub use framing::{enhance_hops, CancelToken, HopPlan, HopStream};
pub use pipeline::{Enhanced, Pipeline};
pub use resample::{resample_if_needed, Resampler, ResamplingQuality, SincResampler};
pub use timing::{FrameStats, TimingRecord};

use thiserror::Error;

// Native parameters of the DeepFilterNet model family, used as engine defaults.
pub const SAMPLE_RATE: u32 = 48000;
pub const FFT_SIZE: usize = 960;
pub const HOP_SIZE: usize = 480;
pub const DEFAULT_ATTEN_LIM_DB: f32 = 100.0;

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("Format error: {0}")]
    Format(String),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("Engine error: {0}")]
    Engine(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cancelled after {completed_hops} hops")]
    Cancelled { completed_hops: usize },
}

impl EnhanceError {
    /// Pipeline stage the error belongs to, for user-facing reports.
    pub fn stage(&self) -> &'static str {
        match self {
            EnhanceError::Format(_) | EnhanceError::Wav(_) => "format",
            EnhanceError::Resample(_) => "resample",
            EnhanceError::Engine(_) | EnhanceError::Shape(_) => "engine",
            EnhanceError::Config(_) => "config",
            EnhanceError::Io(_) => "io",
            EnhanceError::Cancelled { .. } => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, EnhanceError>;

// Compile-time check that engines and pipelines can move between threads.
fn _assert_send<T: Send>() {}
fn _assert_engines_are_send() {
    _assert_send::<Passthrough>();
    _assert_send::<SpectralGate>();
    _assert_send::<Pipeline<SpectralGate>>();
    _assert_send::<HopStream<SpectralGate>>();
}
