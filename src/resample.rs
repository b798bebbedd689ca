//! Band-limited sample-rate conversion.
//!
//! The pipeline only talks to the [`Resampler`] trait. [`SincResampler`] is the
//! default backend (rubato windowed-sinc); tests substitute their own.

use crate::{EnhanceError, Result};
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};
use std::borrow::Cow;

/// Input block size fed to the sinc resampler.
const CHUNK_SIZE: usize = 1024;

/// Quality presets for audio resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResamplingQuality {
    High,
    Medium,
    Low,
}

impl ResamplingQuality {
    /// Convert quality preset to rubato interpolation parameters.
    pub fn to_parameters(&self) -> SincInterpolationParameters {
        match self {
            ResamplingQuality::High => SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Cubic,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            ResamplingQuality::Medium => SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::BlackmanHarris2,
            },
            ResamplingQuality::Low => SincInterpolationParameters {
                sinc_len: 64,
                f_cutoff: 0.90,
                interpolation: SincInterpolationType::Nearest,
                oversampling_factor: 64,
                window: WindowFunction::Blackman,
            },
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Some(ResamplingQuality::High),
            "medium" => Some(ResamplingQuality::Medium),
            "low" => Some(ResamplingQuality::Low),
            _ => None,
        }
    }
}

/// Converts a mono sample sequence between two rates.
///
/// Output length approximates `len * rate_to / rate_from`; callers must not rely
/// on an exact length.
pub trait Resampler {
    fn resample(&mut self, samples: &[f32], rate_from: u32, rate_to: u32) -> Result<Vec<f32>>;
}

impl<R: Resampler + ?Sized> Resampler for Box<R> {
    fn resample(&mut self, samples: &[f32], rate_from: u32, rate_to: u32) -> Result<Vec<f32>> {
        (**self).resample(samples, rate_from, rate_to)
    }
}

/// Resample only when the rates differ. Equal rates borrow the input untouched
/// and never invoke the resampler.
pub fn resample_if_needed<'a, R: Resampler + ?Sized>(
    resampler: &mut R,
    samples: &'a [f32],
    rate_from: u32,
    rate_to: u32,
) -> Result<Cow<'a, [f32]>> {
    if rate_from == rate_to {
        return Ok(Cow::Borrowed(samples));
    }
    log::info!("Resampling from {}Hz to {}Hz", rate_from, rate_to);
    resampler.resample(samples, rate_from, rate_to).map(Cow::Owned)
}

/// Offline whole-buffer resampler backed by rubato's `SincFixedIn`.
///
/// A fresh rubato instance is built per call, so one `SincResampler` can serve
/// any rate pair. The filter delay is removed and the output is cut to
/// `floor(len * rate_to / rate_from)` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SincResampler {
    quality: ResamplingQuality,
}

impl SincResampler {
    pub fn new(quality: ResamplingQuality) -> Self {
        Self { quality }
    }

    pub fn quality(&self) -> ResamplingQuality {
        self.quality
    }
}

impl Default for SincResampler {
    fn default() -> Self {
        Self::new(ResamplingQuality::High)
    }
}

impl Resampler for SincResampler {
    fn resample(&mut self, samples: &[f32], rate_from: u32, rate_to: u32) -> Result<Vec<f32>> {
        if rate_from == 0 || rate_to == 0 {
            return Err(EnhanceError::Resample(format!(
                "invalid rate pair {}Hz -> {}Hz",
                rate_from, rate_to
            )));
        }
        if let Some(pos) = samples.iter().position(|s| !s.is_finite()) {
            return Err(EnhanceError::Resample(format!(
                "non-finite sample at index {}",
                pos
            )));
        }
        let expected = expected_len(samples.len(), rate_from, rate_to);
        if rate_from == rate_to {
            return Ok(samples.to_vec());
        }
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let ratio = rate_to as f64 / rate_from as f64;
        let mut resampler =
            SincFixedIn::<f32>::new(ratio, 2.0, self.quality.to_parameters(), CHUNK_SIZE, 1)
                .map_err(|e| {
                    EnhanceError::Resample(format!("Failed to create resampler: {:?}", e))
                })?;

        let delay = resampler.output_delay();
        let mut output: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK_SIZE);
        let mut pos = 0;

        while samples.len() - pos >= resampler.input_frames_next() {
            let n = resampler.input_frames_next();
            let chunk: [&[f32]; 1] = [&samples[pos..pos + n]];
            let block = resampler
                .process(&chunk[..], None)
                .map_err(|e| EnhanceError::Resample(format!("Resampling failed: {:?}", e)))?;
            output.extend_from_slice(&block[0]);
            pos += n;
        }
        if pos < samples.len() {
            let tail: [&[f32]; 1] = [&samples[pos..]];
            let block = resampler
                .process_partial(Some(&tail[..]), None)
                .map_err(|e| EnhanceError::Resample(format!("Resampling failed: {:?}", e)))?;
            output.extend_from_slice(&block[0]);
        }
        // Drain the filter tail until the delayed signal is fully out.
        while output.len() < expected + delay {
            let block = resampler
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(|e| EnhanceError::Resample(format!("Resampling failed: {:?}", e)))?;
            if block[0].is_empty() {
                break;
            }
            output.extend_from_slice(&block[0]);
        }

        output.drain(..delay.min(output.len()));
        output.resize(expected, 0.0);
        Ok(output)
    }
}

fn expected_len(len: usize, rate_from: u32, rate_to: u32) -> usize {
    (len as u64 * rate_to as u64 / rate_from as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    struct Counting {
        calls: usize,
    }

    impl Resampler for Counting {
        fn resample(&mut self, samples: &[f32], _: u32, _: u32) -> Result<Vec<f32>> {
            self.calls += 1;
            Ok(samples.to_vec())
        }
    }

    #[test]
    fn test_identity_rate_borrows() {
        let input = vec![0.25f32; 100];
        let mut r = Counting { calls: 0 };
        let out = resample_if_needed(&mut r, &input, 16000, 16000).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out.len(), 100);
        assert_eq!(r.calls, 0);

        let out = resample_if_needed(&mut r, &input, 16000, 48000).unwrap();
        assert!(matches!(out, Cow::Owned(_)));
        assert_eq!(r.calls, 1);
    }

    #[test]
    fn test_upsample_length() {
        let input = sine(440.0, 16000, 16000);
        let out = SincResampler::new(ResamplingQuality::Medium)
            .resample(&input, 16000, 48000)
            .unwrap();
        assert_eq!(out.len(), 48000);
    }

    #[test]
    fn test_downsample_length_rounds_down() {
        let input = sine(440.0, 44100, 44101);
        let out = SincResampler::new(ResamplingQuality::Low)
            .resample(&input, 44100, 16000)
            .unwrap();
        assert_eq!(out.len(), 44101 * 16000 / 44100);
    }

    #[test]
    fn test_preserves_signal() {
        // A low tone survives a 16k -> 48k -> 16k trip with the delay removed.
        let input = sine(100.0, 16000, 8000);
        let mut r = SincResampler::default();
        let up = r.resample(&input, 16000, 48000).unwrap();
        let back = r.resample(&up, 48000, 16000).unwrap();
        assert_eq!(back.len(), input.len());
        let mid = &back[1000..7000];
        let err = mid
            .iter()
            .zip(&input[1000..7000])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(err < 0.05, "round trip error too large: {}", err);
    }

    #[test]
    fn test_empty_input() {
        let out = SincResampler::default().resample(&[], 16000, 48000).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_input() {
        let mut r = SincResampler::default();
        assert!(matches!(
            r.resample(&[0.0; 10], 0, 48000),
            Err(EnhanceError::Resample(_))
        ));
        let err = r.resample(&[0.0, f32::NAN, 0.0], 16000, 48000).unwrap_err();
        assert_eq!(err.stage(), "resample");
    }

    #[test]
    fn test_quality_parse() {
        assert_eq!(ResamplingQuality::parse("HIGH"), Some(ResamplingQuality::High));
        assert_eq!(ResamplingQuality::parse("ultra"), None);
    }
}
