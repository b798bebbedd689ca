//! Fixed-hop framing around an engine.
//!
//! The engine only accepts frames of exactly `hop_size` samples. A mono stream of
//! `N` samples is cut into `N / hop_size` full hops plus, when `N % hop_size > 0`,
//! one final zero-padded hop. Only the real prefix of that last enhanced hop is
//! kept, so the output always has exactly `N` samples.
//!
//! Hops are fed in strictly increasing order, one synchronous call at a time:
//! the engine's causal state depends on it.

use crate::engine::{EnhancementEngine, Frame};
use crate::timing::FrameStats;
use crate::{EnhanceError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// How a stream of `total` samples splits into hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopPlan {
    pub hop_size: usize,
    pub total: usize,
    pub full_hops: usize,
    pub remainder: usize,
}

impl HopPlan {
    pub fn new(total: usize, hop_size: usize) -> Result<Self> {
        if hop_size == 0 {
            return Err(EnhanceError::Config("hop size must be positive".to_string()));
        }
        Ok(Self {
            hop_size,
            total,
            full_hops: total / hop_size,
            remainder: total % hop_size,
        })
    }

    /// Engine calls needed, including the padded final hop.
    pub fn engine_calls(&self) -> usize {
        self.full_hops + usize::from(self.remainder > 0)
    }

    /// Zeros appended to the last hop.
    pub fn padding(&self) -> usize {
        if self.remainder > 0 {
            self.hop_size - self.remainder
        } else {
            0
        }
    }
}

/// Cooperative cancellation flag, checked between hops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reject engines the hop loop cannot drive: not mono, no rate or no hop.
pub(crate) fn check_mono_engine<E: EnhancementEngine + ?Sized>(engine: &E) -> Result<()> {
    if engine.channels() != 1 {
        return Err(EnhanceError::Config(format!(
            "hop framing feeds mono frames, engine expects {} channels",
            engine.channels()
        )));
    }
    if engine.sample_rate() == 0 {
        return Err(EnhanceError::Config("engine sample rate must be positive".to_string()));
    }
    if engine.hop_size() == 0 {
        return Err(EnhanceError::Config("engine hop size must be positive".to_string()));
    }
    Ok(())
}

/// Run one hop through the engine. `samples` may be shorter than a hop; the
/// rest of the frame is zero. Returns the full enhanced frame.
fn process_hop<E: EnhancementEngine + ?Sized>(
    engine: &mut E,
    samples: &[f32],
    stats: &mut FrameStats,
) -> Result<Frame> {
    let hop = engine.hop_size();
    let frame = if samples.len() == hop {
        Frame::from_shape_vec((1, hop), samples.to_vec())?
    } else {
        let mut frame = Frame::zeros((1, hop));
        for (dst, &src) in frame.row_mut(0).iter_mut().zip(samples) {
            *dst = src;
        }
        frame
    };

    let t0 = Instant::now();
    let enhanced = engine.process_frames(frame)?;
    let dt = t0.elapsed();
    if stats.record(dt) {
        log::debug!(
            "Frame {} over budget: {:.2}ms",
            stats.frames(),
            dt.as_secs_f64() * 1000.0
        );
    }

    if enhanced.dim() != (1, hop) {
        return Err(EnhanceError::Engine(format!(
            "engine returned frame shape {:?}, expected {:?}",
            enhanced.dim(),
            (1, hop)
        )));
    }
    Ok(enhanced)
}

fn copy_row(frame: &Frame, dst: &mut [f32]) {
    for (d, &s) in dst.iter_mut().zip(frame.row(0).iter()) {
        *d = s;
    }
}

/// Enhance a mono stream at the engine's native rate.
///
/// Returns exactly `input.len()` samples. The engine is called
/// [`HopPlan::engine_calls`] times; an empty input makes no calls.
pub fn enhance_hops<E: EnhancementEngine + ?Sized>(
    engine: &mut E,
    input: &[f32],
    cancel: Option<&CancelToken>,
    stats: &mut FrameStats,
) -> Result<Vec<f32>> {
    check_mono_engine(engine)?;
    let plan = HopPlan::new(input.len(), engine.hop_size())?;
    let hop = plan.hop_size;
    log::debug!(
        "Processing {} hops of {} samples ({} remainder)",
        plan.full_hops,
        hop,
        plan.remainder
    );

    let check_cancel = |completed_hops: usize| match cancel {
        Some(token) if token.is_cancelled() => Err(EnhanceError::Cancelled { completed_hops }),
        _ => Ok(()),
    };

    let mut output = vec![0.0f32; plan.total];
    for i in 0..plan.full_hops {
        check_cancel(i)?;
        let range = i * hop..(i + 1) * hop;
        let enhanced = process_hop(engine, &input[range.clone()], stats)?;
        copy_row(&enhanced, &mut output[range]);
    }

    if plan.remainder > 0 {
        check_cancel(plan.full_hops)?;
        let start = plan.full_hops * hop;
        let enhanced = process_hop(engine, &input[start..], stats)?;
        // Padded tail of the enhanced frame is dropped.
        copy_row(&enhanced, &mut output[start..]);
    }

    Ok(output)
}

/// Streaming front-end with internal hop buffering.
///
/// Pass any length of samples, get back every completed hop. Call
/// [`flush`](Self::flush) at the end of the stream for the zero-padded tail.
/// Over a whole stream the concatenated output equals [`enhance_hops`].
///
/// ```ignore
/// let mut stream = HopStream::new(SpectralGate::with_atten_lim(100.0)?)?;
/// let mut out = stream.process(&chunk)?;
/// out.extend(stream.flush()?);
/// ```
pub struct HopStream<E> {
    engine: E,
    input_buffer: Vec<f32>,
    stats: FrameStats,
}

impl<E: EnhancementEngine> HopStream<E> {
    pub fn new(engine: E) -> Result<Self> {
        check_mono_engine(&engine)?;
        let stats = FrameStats::with_budget(engine.hop_size(), engine.sample_rate());
        Ok(Self {
            input_buffer: Vec::with_capacity(engine.hop_size() * 2),
            engine,
            stats,
        })
    }

    /// Input: mono samples at the engine rate, any length.
    /// Output: enhanced samples for every hop completed so far.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let hop = self.engine.hop_size();
        self.input_buffer.extend_from_slice(input);
        let mut output = Vec::with_capacity(self.input_buffer.len() / hop * hop);

        while self.input_buffer.len() >= hop {
            // Taken out before the call: a failed hop is never fed again.
            let frame: Vec<f32> = self.input_buffer.drain(..hop).collect();
            let enhanced = process_hop(&mut self.engine, &frame, &mut self.stats)?;
            output.extend(enhanced.row(0).iter().copied());
        }
        Ok(output)
    }

    /// Process the buffered remainder as one zero-padded hop and return only
    /// its real samples.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.input_buffer.is_empty() {
            return Ok(Vec::new());
        }
        let tail: Vec<f32> = self.input_buffer.drain(..).collect();
        let enhanced = process_hop(&mut self.engine, &tail, &mut self.stats)?;
        Ok(enhanced.row(0).iter().take(tail.len()).copied().collect())
    }

    /// Samples waiting for a complete hop.
    pub fn buffered(&self) -> usize {
        self.input_buffer.len()
    }

    /// Reset engine state and clear buffers. Call between separate streams.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.input_buffer.clear();
        self.stats = FrameStats::with_budget(self.engine.hop_size(), self.engine.sample_rate());
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_inner(self) -> E {
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Passthrough;

    /// Records every input frame; output is input + call index.
    struct Recorder {
        hop: usize,
        rate: u32,
        inputs: Vec<Vec<f32>>,
        cancel_after: Option<(usize, CancelToken)>,
        /// Call index that returns an error.
        fail_at: Option<usize>,
    }

    impl Recorder {
        fn new(hop: usize) -> Self {
            Self {
                hop,
                rate: 16000,
                inputs: Vec::new(),
                cancel_after: None,
                fail_at: None,
            }
        }
    }

    impl EnhancementEngine for Recorder {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn hop_size(&self) -> usize {
            self.hop
        }

        fn channels(&self) -> usize {
            1
        }

        fn process_frames(&mut self, input: Frame) -> Result<Frame> {
            let idx = self.inputs.len() as f32;
            self.inputs.push(input.row(0).to_vec());
            if self.fail_at == Some(self.inputs.len() - 1) {
                return Err(EnhanceError::Engine("transient fault".to_string()));
            }
            if let Some((n, token)) = &self.cancel_after {
                if self.inputs.len() == *n {
                    token.cancel();
                }
            }
            Ok(input.mapv(|s| s + idx))
        }
    }

    /// Returns a frame one sample too short.
    struct Truncating;

    impl EnhancementEngine for Truncating {
        fn sample_rate(&self) -> u32 {
            16000
        }
        fn hop_size(&self) -> usize {
            4
        }
        fn channels(&self) -> usize {
            1
        }
        fn process_frames(&mut self, _input: Frame) -> Result<Frame> {
            Ok(Frame::zeros((1, 3)))
        }
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 + 1.0).collect()
    }

    #[test]
    fn test_plan_concrete_scenario() {
        let plan = HopPlan::new(56000, 480).unwrap();
        assert_eq!(plan.full_hops, 116);
        assert_eq!(plan.remainder, 320);
        assert_eq!(plan.engine_calls(), 117);
        assert_eq!(plan.padding(), 160);

        let mut engine = Recorder::new(480);
        let out = enhance_hops(&mut engine, &vec![0.1; 56000], None, &mut FrameStats::unbudgeted()).unwrap();
        assert_eq!(out.len(), 56000);
        assert_eq!(engine.inputs.len(), 117);
    }

    #[test]
    fn test_plan_rejects_zero_hop() {
        assert!(HopPlan::new(10, 0).is_err());
    }

    #[test]
    fn test_length_invariant() {
        for hop in [1, 3, 7, 160, 480] {
            for n in [0, 1, 2, hop - 1, hop, hop + 1, 3 * hop, 3 * hop + 2, 1001] {
                let mut engine = Passthrough::new(1, 16000, hop).unwrap();
                let input = ramp(n);
                let out = enhance_hops(&mut engine, &input, None, &mut FrameStats::unbudgeted()).unwrap();
                assert_eq!(out.len(), n, "hop {} n {}", hop, n);
                assert_eq!(out, input);
            }
        }
    }

    #[test]
    fn test_zero_length_makes_no_calls() {
        let mut engine = Recorder::new(8);
        let mut stats = FrameStats::unbudgeted();
        let out = enhance_hops(&mut engine, &[], None, &mut stats).unwrap();
        assert!(out.is_empty());
        assert!(engine.inputs.is_empty());
        assert_eq!(stats.frames(), 0);
    }

    #[test]
    fn test_exact_multiple_uses_no_padding() {
        let mut engine = Recorder::new(4);
        let input = ramp(12);
        let out = enhance_hops(&mut engine, &input, None, &mut FrameStats::unbudgeted()).unwrap();
        assert_eq!(engine.inputs.len(), 3);
        assert_eq!(engine.inputs[2], vec![9.0, 10.0, 11.0, 12.0]);
        assert_eq!(out[8..], [11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn test_partial_remainder_is_padded_and_trimmed() {
        let mut engine = Recorder::new(4);
        let input = ramp(10);
        let mut stats = FrameStats::unbudgeted();
        let out = enhance_hops(&mut engine, &input, None, &mut stats).unwrap();
        assert_eq!(engine.inputs.len(), 3);
        assert_eq!(stats.frames(), 3);
        // Last frame: 2 real samples then zeros.
        assert_eq!(engine.inputs[2], vec![9.0, 10.0, 0.0, 0.0]);
        // Only the real prefix of the last enhanced frame is kept.
        assert_eq!(out.len(), 10);
        assert_eq!(out[8..], [11.0, 12.0]);
    }

    #[test]
    fn test_hops_arrive_in_order() {
        let mut engine = Recorder::new(5);
        let input = ramp(23);
        let out = enhance_hops(&mut engine, &input, None, &mut FrameStats::unbudgeted()).unwrap();
        for (i, frame) in engine.inputs.iter().enumerate() {
            assert_eq!(frame[0], (i * 5 + 1) as f32);
        }
        let expected: Vec<f32> = input
            .iter()
            .enumerate()
            .map(|(i, s)| s + (i / 5) as f32)
            .collect();
        assert_eq!(out, expected);

        // Same input, fresh deterministic engine, same output.
        let mut again = Recorder::new(5);
        assert_eq!(
            enhance_hops(&mut again, &input, None, &mut FrameStats::unbudgeted()).unwrap(),
            out
        );
    }

    #[test]
    fn test_cancel_between_hops() {
        let token = CancelToken::new();
        let mut engine = Recorder::new(4);
        engine.cancel_after = Some((2, token.clone()));
        let err = enhance_hops(&mut engine, &ramp(40), Some(&token), &mut FrameStats::unbudgeted())
            .unwrap_err();
        assert!(matches!(err, EnhanceError::Cancelled { completed_hops: 2 }));
        assert_eq!(engine.inputs.len(), 2);
    }

    #[test]
    fn test_uncancelled_token_runs_to_completion() {
        let token = CancelToken::new();
        let mut engine = Recorder::new(4);
        let out = enhance_hops(&mut engine, &ramp(9), Some(&token), &mut FrameStats::unbudgeted()).unwrap();
        assert_eq!(out.len(), 9);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_multichannel_engine_rejected() {
        let mut engine = Passthrough::new(2, 16000, 4).unwrap();
        let err = enhance_hops(&mut engine, &ramp(8), None, &mut FrameStats::unbudgeted()).unwrap_err();
        assert_eq!(err.stage(), "config");
        assert!(HopStream::new(Passthrough::new(2, 16000, 4).unwrap()).is_err());
    }

    #[test]
    fn test_wrong_output_shape_is_engine_error() {
        let err = enhance_hops(&mut Truncating, &ramp(8), None, &mut FrameStats::unbudgeted()).unwrap_err();
        assert!(matches!(err, EnhanceError::Engine(_)));
    }

    #[test]
    fn test_stream_matches_batch() {
        let input = ramp(1234);
        let batch = enhance_hops(&mut Recorder::new(16), &input, None, &mut FrameStats::unbudgeted()).unwrap();
        for chunk in [1, 7, 16, 100, 2000] {
            let mut stream = HopStream::new(Recorder::new(16)).unwrap();
            let mut out = Vec::new();
            for piece in input.chunks(chunk) {
                out.extend(stream.process(piece).unwrap());
                assert!(stream.buffered() < 16);
            }
            out.extend(stream.flush().unwrap());
            assert_eq!(out, batch, "chunk size {}", chunk);
            assert_eq!(stream.stats().frames(), 78);
        }
    }

    #[test]
    fn test_stream_flush_empty_and_reset() {
        let mut stream = HopStream::new(Recorder::new(4)).unwrap();
        assert!(stream.flush().unwrap().is_empty());
        stream.process(&[1.0, 2.0]).unwrap();
        assert_eq!(stream.buffered(), 2);
        stream.reset();
        assert_eq!(stream.buffered(), 0);
        assert_eq!(stream.stats().frames(), 0);
        assert!(stream.into_inner().inputs.is_empty());
    }

    #[test]
    fn test_stream_failed_hop_is_not_replayed() {
        let mut engine = Recorder::new(4);
        engine.fail_at = Some(1);
        let mut stream = HopStream::new(engine).unwrap();

        let err = stream.process(&ramp(12)).unwrap_err();
        assert_eq!(err.stage(), "engine");
        // Hops 0 and 1 are gone, hop 2 is still waiting.
        assert_eq!(stream.buffered(), 4);

        let out = stream.process(&[]).unwrap();
        assert_eq!(out, vec![11.0, 12.0, 13.0, 14.0]);
        let firsts: Vec<f32> = stream.engine().inputs.iter().map(|f| f[0]).collect();
        assert_eq!(firsts, vec![1.0, 5.0, 9.0]);
    }

    #[test]
    fn test_stream_failed_flush_clears_tail() {
        let mut engine = Recorder::new(4);
        engine.fail_at = Some(0);
        let mut stream = HopStream::new(engine).unwrap();
        stream.process(&[1.0, 2.0]).unwrap();
        assert!(stream.flush().is_err());
        assert_eq!(stream.buffered(), 0);
        assert!(stream.flush().unwrap().is_empty());
        assert_eq!(stream.engine().inputs.len(), 1);
    }

    #[test]
    fn test_zero_rate_engine_rejected() {
        let mut engine = Recorder::new(4);
        engine.rate = 0;
        let err = HopStream::new(engine).err().unwrap();
        assert_eq!(err.stage(), "config");

        let mut engine = Recorder::new(4);
        engine.rate = 0;
        let err = enhance_hops(&mut engine, &ramp(8), None, &mut FrameStats::unbudgeted()).unwrap_err();
        assert_eq!(err.stage(), "config");
        assert!(engine.inputs.is_empty());
    }

    #[test]
    fn test_long_stream_keeps_no_history() {
        let mut stream = HopStream::new(Passthrough::new(1, 16000, 16).unwrap()).unwrap();
        let chunk = [0.0f32; 16];
        for _ in 0..10_000 {
            stream.process(&chunk).unwrap();
        }
        assert_eq!(stream.stats().frames(), 10_000);
        assert!(stream.stats().latencies().is_empty());
    }
}
