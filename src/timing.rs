//! Real-time factor and per-frame timing.

use std::fmt;
use std::time::{Duration, Instant};

/// Wall-clock summary of one pipeline run.
///
/// `audio_duration_secs` is measured on the original input (original rate and
/// sample count); `processing_secs` covers only the hop loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingRecord {
    pub audio_duration_secs: f64,
    pub processing_secs: f64,
    /// processing / audio; below 1.0 is faster than real time.
    pub rtf: f64,
    /// audio / processing.
    pub speed_multiplier: f64,
}

impl TimingRecord {
    /// Zero-length audio yields an RTF and speed of 0. A loop that took no
    /// measurable time on non-empty audio has an infinite speed multiplier.
    pub fn new(audio_duration_secs: f64, processing: Duration) -> Self {
        let processing_secs = processing.as_secs_f64();
        let (rtf, speed_multiplier) = if audio_duration_secs <= 0.0 {
            (0.0, 0.0)
        } else if processing_secs <= 0.0 {
            (0.0, f64::INFINITY)
        } else {
            (
                processing_secs / audio_duration_secs,
                audio_duration_secs / processing_secs,
            )
        };
        Self {
            audio_duration_secs,
            processing_secs,
            rtf,
            speed_multiplier,
        }
    }

    pub fn is_realtime(&self) -> bool {
        self.rtf < 1.0
    }
}

impl fmt::Display for TimingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Audio duration: {:.2} seconds", self.audio_duration_secs)?;
        writeln!(f, "Total processing time: {:.2} seconds", self.processing_secs)?;
        writeln!(f, "Real-time factor (RTF): {:.3}x", self.rtf)?;
        write!(f, "Processing speed: {:.2}x real-time", self.speed_multiplier)
    }
}

/// Starts on creation; `elapsed` reads without stopping.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Per-frame engine call times.
///
/// Running count, total, max and underruns are always kept. Individual frame
/// latencies are kept only after [`with_history`](Self::with_history), so a
/// long-running stream stays at constant memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Real-time budget per frame (one hop of audio), if checked.
    budget: Option<Duration>,
    keep_history: bool,
    latencies: Vec<Duration>,
    frames: usize,
    total: Duration,
    max: Duration,
    underruns: usize,
}

impl FrameStats {
    /// Stats checked against the duration of one hop at `sample_rate`.
    pub fn with_budget(hop_size: usize, sample_rate: u32) -> Self {
        Self {
            budget: Some(Duration::from_secs_f64(hop_size as f64 / sample_rate as f64)),
            ..Self::default()
        }
    }

    /// Stats without a real-time budget; no underruns are counted.
    pub fn unbudgeted() -> Self {
        Self::default()
    }

    /// Also keep every frame's latency, for [`to_csv`](Self::to_csv).
    pub fn with_history(mut self) -> Self {
        self.keep_history = true;
        self
    }

    /// Record one frame. Returns true when the frame exceeded the budget.
    pub fn record(&mut self, dt: Duration) -> bool {
        if self.keep_history {
            self.latencies.push(dt);
        }
        self.frames += 1;
        self.total += dt;
        self.max = self.max.max(dt);
        let over = self.budget.map_or(false, |b| dt > b);
        if over {
            self.underruns += 1;
        }
        over
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Per-frame latencies; empty unless history is kept.
    pub fn latencies(&self) -> &[Duration] {
        &self.latencies
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn mean(&self) -> Duration {
        if self.frames == 0 {
            Duration::ZERO
        } else {
            self.total / self.frames as u32
        }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn underruns(&self) -> usize {
        self.underruns
    }

    /// `frame,latency_us,latency_ms` rows with a header line.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("frame,latency_us,latency_ms\n");
        for (i, dt) in self.latencies.iter().enumerate() {
            let us = dt.as_micros();
            csv.push_str(&format!("{},{},{:.3}\n", i, us, us as f64 / 1000.0));
        }
        csv
    }
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frames: {}, avg: {:.2}ms, max: {:.2}ms",
            self.frames(),
            self.mean().as_secs_f64() * 1000.0,
            self.max.as_secs_f64() * 1000.0
        )?;
        if let Some(budget) = self.budget {
            write!(
                f,
                ", underruns: {} (budget {:.2}ms)",
                self.underruns,
                budget.as_secs_f64() * 1000.0
            )?;
        }
        Ok(())
    }
}
