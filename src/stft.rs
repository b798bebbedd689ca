//! Rolling (streaming) STFT and ISTFT.
//!
//! Overlap-add analysis/synthesis pair with a Vorbis window, matching the
//! DeepFilterNet `DFState` transform. Window and hop sizes are configurable as
//! long as `fft_size >= 2 * hop_size`.
//!
//! All memory is pre-allocated at construction time; [`RollingStft::analysis`] and
//! [`RollingIstft::synthesis`] perform zero heap allocations, which keeps them
//! usable inside an audio callback.

use crate::{EnhanceError, Result};
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

// ─────────────────────── RollingStft ────────────────────────────

/// Streaming STFT using overlap-add.
///
/// Uses a Vorbis window: `sin(π/2 · sin²(π·n/N))` and the `libDF` FFT
/// normalization, so that a following [`RollingIstft`] reconstructs the input
/// delayed by `fft_size - hop_size` samples.
pub struct RollingStft {
    hop_size: usize,
    /// Previous input samples (fft_size - hop_size).
    analysis_mem: Vec<f32>,
    /// Windowed FFT input buffer (fft_size samples).
    fft_buf: Vec<f32>,
    fft_scratch: Vec<Complex32>,
    window: Vec<f32>,
    /// Normalization factor applied after FFT.
    wnorm: f32,
    fft_forward: Arc<dyn RealToComplex<f32>>,
}

impl RollingStft {
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        debug_assert!(fft_size >= 2 * hop_size && fft_size % 2 == 0);
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_scratch = fft_forward.make_scratch_vec();

        Self {
            hop_size,
            analysis_mem: vec![0.0f32; fft_size - hop_size],
            fft_buf: vec![0.0f32; fft_size],
            fft_scratch,
            window: vorbis_window(fft_size),
            wnorm: 1.0 / (fft_size.pow(2) as f32 / (2 * hop_size) as f32),
            fft_forward,
        }
    }

    /// Number of complex bins produced per frame: `fft_size / 2 + 1`.
    pub fn freq_size(&self) -> usize {
        self.window.len() / 2 + 1
    }

    /// Analyse one hop of time-domain samples into `freq_size` complex bins.
    pub fn analysis(&mut self, input: &[f32], output: &mut [Complex32]) -> Result<()> {
        debug_assert_eq!(input.len(), self.hop_size);
        debug_assert_eq!(output.len(), self.freq_size());
        let overlap = self.analysis_mem.len();

        let (buf_first, buf_second) = self.fft_buf.split_at_mut(overlap);
        let (win_first, win_second) = self.window.split_at(overlap);
        for ((&mem, &w), buf) in self.analysis_mem.iter().zip(win_first).zip(buf_first.iter_mut()) {
            *buf = mem * w;
        }
        for ((&inp, &w), buf) in input.iter().zip(win_second).zip(buf_second.iter_mut()) {
            *buf = inp * w;
        }

        // Shift: drop the oldest hop, append the new input.
        let split = overlap - self.hop_size;
        if split > 0 {
            self.analysis_mem.rotate_left(self.hop_size);
        }
        self.analysis_mem[split..].copy_from_slice(input);

        self.fft_forward
            .process_with_scratch(&mut self.fft_buf, output, &mut self.fft_scratch)
            .map_err(|e| EnhanceError::Engine(format!("forward FFT failed: {}", e)))?;

        for x in output.iter_mut() {
            *x *= self.wnorm;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.analysis_mem.fill(0.0);
    }
}

// ─────────────────────── RollingIstft ───────────────────────────

/// Streaming ISTFT using overlap-add.
pub struct RollingIstft {
    hop_size: usize,
    /// Overlap-add memory from previous frames (fft_size - hop_size).
    synthesis_mem: Vec<f32>,
    ifft_buf: Vec<f32>,
    ifft_scratch: Vec<Complex32>,
    window: Vec<f32>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
}

impl RollingIstft {
    pub fn new(fft_size: usize, hop_size: usize) -> Self {
        debug_assert!(fft_size >= 2 * hop_size && fft_size % 2 == 0);
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let ifft_scratch = fft_inverse.make_scratch_vec();
        let ifft_buf = fft_inverse.make_output_vec();

        Self {
            hop_size,
            synthesis_mem: vec![0.0f32; fft_size - hop_size],
            ifft_buf,
            ifft_scratch,
            window: vorbis_window(fft_size),
            fft_inverse,
        }
    }

    /// Synthesise one hop from `freq_size` complex bins (the bins are used as
    /// FFT scratch and left modified).
    pub fn synthesis(&mut self, input: &mut [Complex32], output: &mut [f32]) -> Result<()> {
        debug_assert_eq!(output.len(), self.hop_size);
        let hop = self.hop_size;

        // The real inverse transform requires purely real DC and Nyquist bins.
        if let Some(first) = input.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = input.last_mut() {
            last.im = 0.0;
        }
        self.fft_inverse
            .process_with_scratch(input, &mut self.ifft_buf, &mut self.ifft_scratch)
            .map_err(|e| EnhanceError::Engine(format!("inverse FFT failed: {}", e)))?;

        for (x, &w) in self.ifft_buf.iter_mut().zip(self.window.iter()) {
            *x *= w;
        }

        let (x_first, x_second) = self.ifft_buf.split_at(hop);
        for ((&xi, &mem), out) in x_first.iter().zip(self.synthesis_mem.iter()).zip(output.iter_mut()) {
            *out = xi + mem;
        }

        let split = self.synthesis_mem.len() - hop;
        if split > 0 {
            self.synthesis_mem.rotate_left(hop);
        }
        let (s_first, s_second) = self.synthesis_mem.split_at_mut(split);
        let (xs_first, xs_second) = x_second.split_at(split);
        for (&xi, mem) in xs_first.iter().zip(s_first.iter_mut()) {
            *mem += xi;
        }
        for (&xi, mem) in xs_second.iter().zip(s_second.iter_mut()) {
            *mem = xi;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.synthesis_mem.fill(0.0);
    }
}

/// Compute the Vorbis window: sin(π/2 · sin²(π·n/N))
fn vorbis_window(size: usize) -> Vec<f32> {
    let pi = std::f64::consts::PI;
    let half = size / 2;
    (0..size)
        .map(|i| {
            let sin_val = (0.5 * pi * (i as f64 + 0.5) / half as f64).sin();
            (0.5 * pi * sin_val * sin_val).sin() as f32
        })
        .collect()
}
