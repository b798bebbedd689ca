//! Audio streams, sample-format normalization and WAV file glue.

use crate::{EnhanceError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Numeric sample representations accepted by the normalizer.
///
/// Conversion keeps the numeric value (`as f32`); no rescaling is applied. The
/// engines expect floats in [-1.0, 1.0], so integer PCM must be scaled by the
/// codec layer (see [`read_wav`]) or by the caller.
pub trait PcmSample: Copy {
    fn to_f32(self) -> f32;
}

macro_rules! impl_pcm_sample {
    ($($t:ty),*) => {
        $(impl PcmSample for $t {
            #[inline]
            fn to_f32(self) -> f32 {
                self as f32
            }
        })*
    };
}

impl_pcm_sample!(i8, u8, i16, i32, f32, f64);

/// Interleaved audio with its rate and layout.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStream {
    sample_rate: u32,
    channels: usize,
    samples: Vec<f32>,
}

impl AudioStream {
    /// Build a stream from interleaved samples of any numeric type.
    pub fn from_interleaved<S: PcmSample>(
        samples: &[S],
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EnhanceError::Format("sample rate must be positive".to_string()));
        }
        if channels == 0 {
            return Err(EnhanceError::Format("stream has no channels".to_string()));
        }
        if samples.len() % channels != 0 {
            return Err(EnhanceError::Format(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples: samples.iter().map(|&s| s.to_f32()).collect(),
        })
    }

    /// Mono stream from already-float samples, without copying.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(EnhanceError::Format("sample rate must be positive".to_string()));
        }
        Ok(Self {
            sample_rate,
            channels: 1,
            samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Fold all channels into one by sample-wise arithmetic mean.
    pub fn to_mono(&self) -> AudioStream {
        if self.channels == 1 {
            return self.clone();
        }
        let scale = 1.0 / self.channels as f32;
        let samples = self
            .samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect();
        AudioStream {
            sample_rate: self.sample_rate,
            channels: 1,
            samples,
        }
    }
}

/// Sample encoding used when writing WAV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavEncoding {
    /// 16-bit integer PCM, clamped to [-1.0, 1.0].
    #[default]
    Pcm16,
    /// 32-bit IEEE float, written as-is.
    Float32,
}

/// Decode a WAV file. Integer PCM is scaled to [-1.0, 1.0].
pub fn read_wav(path: impl AsRef<Path>) -> Result<AudioStream> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    log::debug!(
        "{}: {} Hz, {} channels, {}-bit {:?}",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        spec.sample_format
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = match spec.bits_per_sample {
                8 | 16 | 24 | 32 => 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32,
                bits => {
                    return Err(EnhanceError::Format(format!(
                        "unsupported bits per sample: {}",
                        bits
                    )))
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    AudioStream::from_interleaved(&samples, spec.channels as usize, spec.sample_rate)
}

/// Write a WAV file atomically.
///
/// Samples go to a sibling `<name>.partial` file which is renamed over `path`
/// only after the writer is finalized. On failure the partial file is removed.
pub fn write_wav(path: impl AsRef<Path>, stream: &AudioStream, encoding: WavEncoding) -> Result<()> {
    let path = path.as_ref();
    let partial = partial_path(path);
    match write_wav_inner(&partial, stream, encoding) {
        Ok(()) => {
            fs::rename(&partial, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn write_wav_inner(path: &Path, stream: &AudioStream, encoding: WavEncoding) -> Result<()> {
    let channels = u16::try_from(stream.channels())
        .map_err(|_| EnhanceError::Format(format!("too many channels: {}", stream.channels())))?;
    let spec = match encoding {
        WavEncoding::Pcm16 => hound::WavSpec {
            channels,
            sample_rate: stream.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
        WavEncoding::Float32 => hound::WavSpec {
            channels,
            sample_rate: stream.sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        },
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    match encoding {
        WavEncoding::Pcm16 => {
            for &sample in stream.samples() {
                writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
            }
        }
        WavEncoding::Float32 => {
            for &sample in stream.samples() {
                writer.write_sample(sample)?;
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_to_mono_mean() {
        let s = AudioStream::from_interleaved(&[1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0], 2, 8000).unwrap();
        assert_eq!(s.frames(), 3);
        let m = s.to_mono();
        assert_eq!(m.channels(), 1);
        assert_eq!(m.samples(), &[0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_int_samples_keep_scale() {
        let s = AudioStream::from_interleaved(&[100i16, -200, 300], 1, 16000).unwrap();
        assert_eq!(s.samples(), &[100.0, -200.0, 300.0]);
        let s = AudioStream::from_interleaved(&[0.25f64, -0.5], 1, 16000).unwrap();
        assert_eq!(s.samples(), &[0.25, -0.5]);
    }

    #[test]
    fn test_empty_stream_is_legal() {
        let s = AudioStream::from_interleaved::<f32>(&[], 2, 44100).unwrap();
        assert_eq!(s.frames(), 0);
        assert_eq!(s.to_mono().samples().len(), 0);
        assert_eq!(s.duration_secs(), 0.0);
    }

    #[test]
    fn test_malformed_streams() {
        assert!(AudioStream::from_interleaved(&[0.0f32; 3], 2, 16000).is_err());
        assert!(AudioStream::from_interleaved(&[0.0f32; 4], 0, 16000).is_err());
        let err = AudioStream::from_interleaved(&[0.0f32; 4], 1, 0).unwrap_err();
        assert_eq!(err.stage(), "format");
    }

    #[test]
    fn test_wav_roundtrip_pcm16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<f32> = (0..200).map(|i| ((i as f32) / 100.0 - 1.0) * 0.9).collect();
        let stream = AudioStream::from_interleaved(&samples, 2, 22050).unwrap();
        write_wav(&path, &stream, WavEncoding::Pcm16).unwrap();

        let back = read_wav(&path).unwrap();
        assert_eq!(back.sample_rate(), 22050);
        assert_eq!(back.channels(), 2);
        assert_eq!(back.frames(), 100);
        for (a, b) in back.samples().iter().zip(&samples) {
            assert!((a - b).abs() < 1e-3);
        }
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_wav_float_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let stream = AudioStream::mono(vec![0.125, -1.5, 2.0], 48000).unwrap();
        write_wav(&path, &stream, WavEncoding::Float32).unwrap();
        assert_eq!(read_wav(&path).unwrap().samples(), &[0.125, -1.5, 2.0]);
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("out.wav");
        let stream = AudioStream::mono(vec![0.0; 10], 16000).unwrap();
        assert!(write_wav(&path, &stream, WavEncoding::Pcm16).is_err());
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_read_missing_file_is_format_error() {
        let err = read_wav("/nonexistent/input.wav").unwrap_err();
        assert_eq!(err.stage(), "format");
    }
}
