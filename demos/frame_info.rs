//! Example: Inspect an engine's frame contract
//!
//! Usage: cargo run --example frame_info -- [atten_lim_db]

use enhance_rt::{create_engine, EngineConfig, EngineKind, EnhancementEngine, Frame};
use std::time::Instant;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let atten_lim: f32 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => enhance_rt::DEFAULT_ATTEN_LIM_DB,
    };

    let mut engine = create_engine(EngineKind::SpectralGate, &EngineConfig::with_channels(2, atten_lim))?;
    let silence = Frame::zeros((engine.channels(), engine.hop_size()));

    let t0 = Instant::now();
    let enhanced = engine.process_frames(silence)?;
    let dt = t0.elapsed();

    println!("Output shape: {:?}", enhanced.dim());
    println!("Sample rate: {} Hz", engine.sample_rate());
    println!("Hop size: {} samples", engine.hop_size());
    println!("Channels: {}", engine.channels());
    println!("Latency: {} samples", engine.latency_samples());
    println!("Processing time: {:.3} ms", dt.as_secs_f64() * 1000.0);
    Ok(())
}
