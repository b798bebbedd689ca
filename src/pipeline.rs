//! Batch pipeline: normalize, resample, hop loop, resample back.

use crate::audio::AudioStream;
use crate::config::{LengthPolicy, PipelineConfig};
use crate::engine::EnhancementEngine;
use crate::framing::{check_mono_engine, enhance_hops, CancelToken, HopPlan};
use crate::resample::{resample_if_needed, Resampler, SincResampler};
use crate::timing::{FrameStats, Stopwatch, TimingRecord};
use crate::{EnhanceError, Result};

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct Enhanced {
    /// Mono output at the original sample rate.
    pub stream: AudioStream,
    pub timing: TimingRecord,
    pub frames: FrameStats,
    /// Hop split of the stream at the engine rate.
    pub plan: HopPlan,
    /// Engine delay in samples at the engine rate.
    pub latency_samples: usize,
    /// Whether the input had to be resampled to reach the engine rate.
    pub resampled: bool,
}

/// Drives one engine over whole streams.
///
/// The engine keeps its causal state between runs; call
/// [`engine_mut`](Self::engine_mut)`.reset()` when starting an unrelated stream.
pub struct Pipeline<E, R = SincResampler> {
    engine: E,
    resampler: R,
    config: PipelineConfig,
}

impl<E: EnhancementEngine> Pipeline<E, SincResampler> {
    pub fn new(engine: E, config: PipelineConfig) -> Result<Self> {
        let resampler = SincResampler::new(config.resample_quality);
        Self::with_resampler(engine, resampler, config)
    }
}

impl<E: EnhancementEngine, R: Resampler> Pipeline<E, R> {
    pub fn with_resampler(engine: E, resampler: R, config: PipelineConfig) -> Result<Self> {
        check_mono_engine(&engine)?;
        Ok(Self {
            engine,
            resampler,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn run(&mut self, input: &AudioStream) -> Result<Enhanced> {
        self.run_inner(input, None)
    }

    /// Like [`run`](Self::run), checking `cancel` before every hop.
    pub fn run_with_cancel(&mut self, input: &AudioStream, cancel: &CancelToken) -> Result<Enhanced> {
        self.run_inner(input, Some(cancel))
    }

    fn run_inner(&mut self, input: &AudioStream, cancel: Option<&CancelToken>) -> Result<Enhanced> {
        let mono = input.to_mono();
        let original_rate = mono.sample_rate();
        let original_len = mono.frames();
        let audio_duration = mono.duration_secs();
        let native_rate = self.engine.sample_rate();
        if input.channels() > 1 {
            log::info!("Downmixing {} channels to mono", input.channels());
        }

        let at_native =
            resample_if_needed(&mut self.resampler, mono.samples(), original_rate, native_rate)?;
        let plan = HopPlan::new(at_native.len(), self.engine.hop_size())?;

        let frames = if self.config.frame_budget_check {
            FrameStats::with_budget(plan.hop_size, native_rate)
        } else {
            FrameStats::unbudgeted()
        };
        let mut frames = frames.with_history();
        let stopwatch = Stopwatch::start();
        let enhanced = enhance_hops(&mut self.engine, &at_native, cancel, &mut frames)?;
        let timing = TimingRecord::new(audio_duration, stopwatch.elapsed());

        let mut output = if original_rate == native_rate {
            enhanced
        } else {
            log::info!("Resampling from {}Hz to {}Hz", native_rate, original_rate);
            self.resampler.resample(&enhanced, native_rate, original_rate)?
        };
        if self.config.length_policy == LengthPolicy::MatchInput && output.len() != original_len {
            log::debug!(
                "Reconciling output length {} to input length {}",
                output.len(),
                original_len
            );
            output.resize(original_len, 0.0);
        }

        log::info!(
            "Enhanced {:.2}s of audio in {} engine calls (RTF {:.3})",
            audio_duration,
            plan.engine_calls(),
            timing.rtf
        );
        if frames.underruns() > 0 {
            log::warn!("{} of {} frames exceeded the real-time budget", frames.underruns(), frames.frames());
        }

        Ok(Enhanced {
            stream: AudioStream::mono(output, original_rate)?,
            timing,
            frames,
            plan,
            latency_samples: self.engine.latency_samples(),
            resampled: original_rate != native_rate,
        })
    }
}
