//! Engine and pipeline configuration.
//!
//! Defaults match the DeepFilterNet model family. Values can be overridden from a
//! small INI file:
//!
//! ```text
//! [engine]
//! atten_lim = 12
//! noise_rise = 0.995
//!
//! [pipeline]
//! resample_quality = medium
//! length_policy = match_input
//! ```

use crate::resample::ResamplingQuality;
use crate::{EnhanceError, Result, DEFAULT_ATTEN_LIM_DB, FFT_SIZE, HOP_SIZE, SAMPLE_RATE};
use std::fs;
use std::path::Path;

/// Parameters fixed at engine construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub channels: usize,
    /// Maximum attenuation in dB, 0 (no suppression) to 100 (unlimited).
    pub atten_lim_db: f32,
    pub sample_rate: u32,
    pub fft_size: usize,
    pub hop_size: usize,
    /// Smoothing of the noise floor when the power rises above it (slow).
    pub noise_rise: f32,
    /// Smoothing of the noise floor when the power falls below it (fast).
    pub noise_fall: f32,
    /// Temporal smoothing of the per-bin gain.
    pub gain_smoothing: f32,
    /// Multiplier on the tracked noise floor when computing the gain.
    pub over_subtraction: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            atten_lim_db: DEFAULT_ATTEN_LIM_DB,
            sample_rate: SAMPLE_RATE,
            fft_size: FFT_SIZE,
            hop_size: HOP_SIZE,
            noise_rise: 0.99,
            noise_fall: 0.95,
            gain_smoothing: 0.6,
            over_subtraction: 2.0,
        }
    }
}

impl EngineConfig {
    pub fn with_channels(channels: usize, atten_lim_db: f32) -> Self {
        Self {
            channels,
            atten_lim_db,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(EnhanceError::Config("channel count must be at least 1".to_string()));
        }
        if !self.atten_lim_db.is_finite() || !(0.0..=100.0).contains(&self.atten_lim_db) {
            return Err(EnhanceError::Config(format!(
                "attenuation limit must be within [0, 100] dB, got {}",
                self.atten_lim_db
            )));
        }
        if self.sample_rate == 0 {
            return Err(EnhanceError::Config("sample rate must be positive".to_string()));
        }
        if self.hop_size == 0 {
            return Err(EnhanceError::Config("hop size must be positive".to_string()));
        }
        if self.fft_size % 2 != 0 || self.fft_size < 2 * self.hop_size {
            return Err(EnhanceError::Config(format!(
                "fft size must be even and at least twice the hop size ({}), got {}",
                2 * self.hop_size,
                self.fft_size
            )));
        }
        for (name, v) in [
            ("noise_rise", self.noise_rise),
            ("noise_fall", self.noise_fall),
            ("gain_smoothing", self.gain_smoothing),
        ] {
            if !(0.0..1.0).contains(&v) {
                return Err(EnhanceError::Config(format!("{} must be within [0, 1), got {}", name, v)));
            }
        }
        if !self.over_subtraction.is_finite() || self.over_subtraction < 1.0 {
            return Err(EnhanceError::Config(format!(
                "over_subtraction must be at least 1, got {}",
                self.over_subtraction
            )));
        }
        Ok(())
    }

    /// Linear gain floor derived from the attenuation limit.
    pub fn min_gain(&self) -> f32 {
        10f32.powf(-self.atten_lim_db / 20.0)
    }
}

/// What to do when the return trip through the resampler changes the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPolicy {
    /// Truncate or zero-pad to the original sample count.
    MatchInput,
    /// Keep whatever length the resampler produced.
    KeepResampled,
}

impl LengthPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "match_input" | "match-input" => Some(LengthPolicy::MatchInput),
            "keep_resampled" | "keep-resampled" => Some(LengthPolicy::KeepResampled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub resample_quality: ResamplingQuality,
    pub length_policy: LengthPolicy,
    /// Log frames whose processing time exceeds the hop duration.
    pub frame_budget_check: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resample_quality: ResamplingQuality::High,
            length_policy: LengthPolicy::MatchInput,
            frame_budget_check: true,
        }
    }
}

/// Both halves of a configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub engine: EngineConfig,
    pub pipeline: PipelineConfig,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EnhanceError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_ini(&content)
    }

    pub fn from_ini(content: &str) -> Result<Self> {
        let mut settings = Settings::default();
        for (key, value) in parse_ini(content) {
            settings.apply(&key, &value)?;
        }
        settings.engine.validate()?;
        Ok(settings)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let engine = &mut self.engine;
        match key {
            "engine.channels" => engine.channels = parse_value(key, value)?,
            "engine.atten_lim" => engine.atten_lim_db = parse_value(key, value)?,
            "engine.sample_rate" => engine.sample_rate = parse_value(key, value)?,
            "engine.fft_size" => engine.fft_size = parse_value(key, value)?,
            "engine.hop_size" => engine.hop_size = parse_value(key, value)?,
            "engine.noise_rise" => engine.noise_rise = parse_value(key, value)?,
            "engine.noise_fall" => engine.noise_fall = parse_value(key, value)?,
            "engine.gain_smoothing" => engine.gain_smoothing = parse_value(key, value)?,
            "engine.over_subtraction" => engine.over_subtraction = parse_value(key, value)?,
            "pipeline.resample_quality" => {
                self.pipeline.resample_quality = ResamplingQuality::parse(value)
                    .ok_or_else(|| invalid_value(key, value))?
            }
            "pipeline.length_policy" => {
                self.pipeline.length_policy =
                    LengthPolicy::parse(value).ok_or_else(|| invalid_value(key, value))?
            }
            "pipeline.frame_budget_check" => {
                self.pipeline.frame_budget_check = parse_value(key, value)?
            }
            _ => log::warn!("Ignoring unknown config key '{}'", key),
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| invalid_value(key, value))
}

fn invalid_value(key: &str, value: &str) -> EnhanceError {
    EnhanceError::Config(format!("invalid value '{}' for '{}'", value, key))
}

/// Minimal INI reader. Keys are returned as `section.key`, lowercased.
pub(crate) fn parse_ini(content: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut section = String::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_ascii_lowercase();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_ascii_lowercase();
            let key = if section.is_empty() { key } else { format!("{}.{}", section, key) };
            entries.push((key, value.trim().to_string()));
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.hop_size, 480);
        assert!(cfg.min_gain() < 1e-4);
    }

    #[test]
    fn test_atten_lim_range() {
        assert!(EngineConfig::with_channels(1, -1.0).validate().is_err());
        assert!(EngineConfig::with_channels(1, 100.5).validate().is_err());
        assert!(EngineConfig::with_channels(1, f32::NAN).validate().is_err());
        EngineConfig::with_channels(1, 0.0).validate().unwrap();
        assert!((EngineConfig::with_channels(1, 0.0).min_gain() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_channels_rejected() {
        let err = EngineConfig::with_channels(0, 100.0).validate().unwrap_err();
        assert_eq!(err.stage(), "config");
    }

    #[test]
    fn test_fft_must_cover_two_hops() {
        let cfg = EngineConfig {
            fft_size: 600,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_ini_sections() {
        let entries: HashMap<String, String> = parse_ini(
            "# comment\n[engine]\natten_lim = 12\n; other\n[Pipeline]\nlength_policy=keep_resampled\n",
        )
        .into_iter()
        .collect();
        assert_eq!(entries.get("engine.atten_lim").map(String::as_str), Some("12"));
        assert_eq!(
            entries.get("pipeline.length_policy").map(String::as_str),
            Some("keep_resampled")
        );
    }

    #[test]
    fn test_settings_from_ini() {
        let s = Settings::from_ini(
            "[engine]\natten_lim = 12.5\nchannels = 2\n[pipeline]\nresample_quality = low\nlength_policy = keep-resampled\nunknown = 1\n",
        )
        .unwrap();
        assert_eq!(s.engine.atten_lim_db, 12.5);
        assert_eq!(s.engine.channels, 2);
        assert_eq!(s.pipeline.resample_quality, ResamplingQuality::Low);
        assert_eq!(s.pipeline.length_policy, LengthPolicy::KeepResampled);
    }

    #[test]
    fn test_settings_bad_value() {
        let err = Settings::from_ini("[engine]\natten_lim = loud\n").unwrap_err();
        assert!(matches!(err, EnhanceError::Config(_)));
        let err = Settings::from_ini("[engine]\natten_lim = 300\n").unwrap_err();
        assert!(matches!(err, EnhanceError::Config(_)));
    }
}
