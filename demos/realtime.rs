//! Example: Simulated real-time streaming through a HopStream
//!
//! Input must already be mono at the engine rate (48 kHz); small chunks stand
//! in for audio callbacks.
//!
//! Usage: cargo run --example realtime -- input.wav output.wav [atten_lim_db]

use enhance_rt::audio::{read_wav, write_wav};
use enhance_rt::{
    AudioStream, EnhancementEngine, HopStream, SpectralGate, WavEncoding, DEFAULT_ATTEN_LIM_DB, HOP_SIZE,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input.wav> <output.wav> [atten_lim_db]", args[0]);
        std::process::exit(1);
    }
    let atten_lim: f32 = match args.get(3) {
        Some(arg) => arg.parse()?,
        None => DEFAULT_ATTEN_LIM_DB,
    };

    let mut engine = SpectralGate::with_atten_lim(atten_lim)?;
    engine.warmup()?;
    let mut stream = HopStream::new(engine)?;
    let rate = stream.engine().sample_rate();

    let input = read_wav(&args[1])?.to_mono();
    if input.sample_rate() != rate {
        eprintln!(
            "Input sample rate {} != engine rate {}. Use the enhance-rt binary to resample.",
            input.sample_rate(),
            rate
        );
        std::process::exit(1);
    }
    println!(
        "Streaming {} samples ({:.2}s), budget {:?} per frame",
        input.frames(),
        input.duration_secs(),
        stream.stats().budget()
    );

    let start = std::time::Instant::now();
    let mut output = Vec::with_capacity(input.frames());
    for chunk in input.samples().chunks(HOP_SIZE / 3) {
        output.extend(stream.process(chunk)?);
    }
    output.extend(stream.flush()?);
    let elapsed = start.elapsed();

    println!(
        "Done in {:.2}s (RTF: {:.3}x realtime)",
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() / input.duration_secs().max(f64::EPSILON)
    );
    println!("{}", stream.stats());

    write_wav(&args[2], &AudioStream::mono(output, rate)?, WavEncoding::Pcm16)?;
    println!("Saved to {}", args[2]);
    Ok(())
}
