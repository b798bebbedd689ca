//! Enhancement engines.
//!
//! An engine is a stateful, causal frame processor: it consumes exactly one
//! `(channels, hop_size)` block per call at its native sample rate and returns a
//! block of the same shape. Its internal state advances by one hop per call, so
//! frames must arrive in strict temporal order and a handle must never be shared
//! between concurrent callers.

use crate::config::EngineConfig;
use crate::stft::{RollingIstft, RollingStft};
use crate::{EnhanceError, Result};
use ndarray::Array2;
use num_complex::Complex32;

/// One hop of audio across all channels, shape `(channels, hop_size)`.
pub type Frame = Array2<f32>;

/// Capability interface implemented by every engine.
pub trait EnhancementEngine {
    /// Native sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Samples per channel consumed and produced per call.
    fn hop_size(&self) -> usize;

    fn channels(&self) -> usize;

    /// Enhance one frame. The frame must have shape `(channels, hop_size)`.
    fn process_frames(&mut self, input: Frame) -> Result<Frame>;

    /// Algorithmic delay of the output relative to the input, in samples.
    fn latency_samples(&self) -> usize {
        0
    }

    /// Return to the freshly constructed state.
    fn reset(&mut self) {}

    /// Run a few silent frames to avoid cold-start latency, then reset so the
    /// warm-up does not affect real processing.
    fn warmup(&mut self) -> Result<()> {
        for _ in 0..3 {
            let silence = Frame::zeros((self.channels(), self.hop_size()));
            self.process_frames(silence)?;
        }
        self.reset();
        Ok(())
    }
}

impl<E: EnhancementEngine + ?Sized> EnhancementEngine for Box<E> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn hop_size(&self) -> usize {
        (**self).hop_size()
    }

    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn process_frames(&mut self, input: Frame) -> Result<Frame> {
        (**self).process_frames(input)
    }

    fn latency_samples(&self) -> usize {
        (**self).latency_samples()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn warmup(&mut self) -> Result<()> {
        (**self).warmup()
    }
}

/// Reject frames whose shape does not match the engine contract.
pub fn check_frame_shape<E: EnhancementEngine + ?Sized>(engine: &E, frame: &Frame) -> Result<()> {
    let expected = (engine.channels(), engine.hop_size());
    if frame.dim() != expected {
        return Err(EnhanceError::Engine(format!(
            "frame shape {:?} does not match engine shape {:?}",
            frame.dim(),
            expected
        )));
    }
    Ok(())
}

/// Engines bundled with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    SpectralGate,
    Passthrough,
}

/// Construct an engine after validating its configuration.
pub fn create_engine(kind: EngineKind, config: &EngineConfig) -> Result<Box<dyn EnhancementEngine + Send>> {
    config.validate()?;
    log::info!(
        "Creating {:?} engine: {} ch, {} Hz, hop {}, atten limit {} dB",
        kind,
        config.channels,
        config.sample_rate,
        config.hop_size,
        config.atten_lim_db
    );
    Ok(match kind {
        EngineKind::SpectralGate => Box::new(SpectralGate::new(config)?),
        EngineKind::Passthrough => Box::new(Passthrough::new(
            config.channels,
            config.sample_rate,
            config.hop_size,
        )?),
    })
}

// ───────────────────────── Passthrough ──────────────────────────

/// Identity engine. Returns every frame unchanged.
#[derive(Debug, Clone)]
pub struct Passthrough {
    channels: usize,
    sample_rate: u32,
    hop_size: usize,
}

impl Passthrough {
    pub fn new(channels: usize, sample_rate: u32, hop_size: usize) -> Result<Self> {
        if channels == 0 || sample_rate == 0 || hop_size == 0 {
            return Err(EnhanceError::Config(format!(
                "invalid passthrough shape: {} ch, {} Hz, hop {}",
                channels, sample_rate, hop_size
            )));
        }
        Ok(Self {
            channels,
            sample_rate,
            hop_size,
        })
    }
}

impl EnhancementEngine for Passthrough {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn hop_size(&self) -> usize {
        self.hop_size
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn process_frames(&mut self, input: Frame) -> Result<Frame> {
        check_frame_shape(self, &input)?;
        Ok(input)
    }
}

// ───────────────────────── SpectralGate ─────────────────────────

/// Per-channel causal state.
struct ChannelState {
    stft: RollingStft,
    istft: RollingIstft,
    /// Tracked noise power per bin.
    noise: Vec<f32>,
    /// Smoothed gain per bin from the previous frame.
    gain: Vec<f32>,
    primed: bool,
}

impl ChannelState {
    fn new(fft_size: usize, hop_size: usize) -> Self {
        let stft = RollingStft::new(fft_size, hop_size);
        let freq_size = stft.freq_size();
        Self {
            stft,
            istft: RollingIstft::new(fft_size, hop_size),
            noise: vec![0.0; freq_size],
            gain: vec![1.0; freq_size],
            primed: false,
        }
    }

    fn reset(&mut self) {
        self.stft.reset();
        self.istft.reset();
        self.noise.fill(0.0);
        self.gain.fill(1.0);
        self.primed = false;
    }
}

/// Classical single-pass noise suppressor.
///
/// Per channel and hop: Vorbis-window STFT, per-bin noise floor tracking
/// (falls quickly, rises slowly), Wiener-style gain `1 - k * noise / power`,
/// temporal gain smoothing, gain floor `10^(-atten_lim / 20)`, ISTFT.
/// An attenuation limit of 0 dB makes the engine a delayed pass-through.
pub struct SpectralGate {
    config: EngineConfig,
    min_gain: f32,
    states: Vec<ChannelState>,
    // Pre-allocated per-frame work buffers
    work_spec: Vec<Complex32>,
    work_out: Vec<f32>,
}

impl SpectralGate {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let states: Vec<ChannelState> = (0..config.channels)
            .map(|_| ChannelState::new(config.fft_size, config.hop_size))
            .collect();
        let freq_size = config.fft_size / 2 + 1;
        Ok(Self {
            config: config.clone(),
            min_gain: config.min_gain(),
            states,
            work_spec: vec![Complex32::new(0.0, 0.0); freq_size],
            work_out: vec![0.0; config.hop_size],
        })
    }

    /// Mono engine with default parameters and the given attenuation limit.
    pub fn with_atten_lim(atten_lim_db: f32) -> Result<Self> {
        Self::new(&EngineConfig::with_channels(1, atten_lim_db))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn process_channel(&mut self, ch: usize, input: &[f32]) -> Result<()> {
        let state = &mut self.states[ch];
        state.stft.analysis(input, &mut self.work_spec)?;

        let rise = self.config.noise_rise;
        let fall = self.config.noise_fall;
        let smooth = self.config.gain_smoothing;
        let over = self.config.over_subtraction;
        for ((bin, noise), gain) in self
            .work_spec
            .iter_mut()
            .zip(state.noise.iter_mut())
            .zip(state.gain.iter_mut())
        {
            let power = bin.norm_sqr();
            if !state.primed {
                *noise = power;
            } else if power < *noise {
                *noise = fall * *noise + (1.0 - fall) * power;
            } else {
                *noise = rise * *noise + (1.0 - rise) * power;
            }
            let target = if power > 1e-12 {
                (1.0 - over * *noise / power).max(0.0)
            } else {
                0.0
            };
            *gain = smooth * *gain + (1.0 - smooth) * target;
            *bin *= gain.max(self.min_gain);
        }
        state.primed = true;

        state.istft.synthesis(&mut self.work_spec, &mut self.work_out)
    }
}

impl EnhancementEngine for SpectralGate {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn hop_size(&self) -> usize {
        self.config.hop_size
    }

    fn channels(&self) -> usize {
        self.config.channels
    }

    fn process_frames(&mut self, input: Frame) -> Result<Frame> {
        check_frame_shape(self, &input)?;
        let mut output = Frame::zeros(input.dim());
        for (ch, row) in input.rows().into_iter().enumerate() {
            // Rows of an owned frame are normally contiguous; copy otherwise.
            match row.as_slice() {
                Some(samples) => self.process_channel(ch, samples)?,
                None => {
                    let samples = row.to_vec();
                    self.process_channel(ch, &samples)?
                }
            }
            for (o, &s) in output.row_mut(ch).iter_mut().zip(self.work_out.iter()) {
                *o = s;
            }
        }
        Ok(output)
    }

    fn latency_samples(&self) -> usize {
        self.config.fft_size - self.config.hop_size
    }

    fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }
}
