use std::f32::consts::TAU;

use config::shared::WorkloadConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use throttle::bail;
use throttle::error::{ErrorKind, PipelineResult};

/// Number of distinct dominant frequencies across the generated traces.
const FREQUENCY_BANDS: u64 = 8;

/// A single seismic trace.
#[derive(Debug, Clone)]
pub struct Trace {
    pub index: u64,
    pub samples: Vec<f32>,
}

impl Trace {
    /// Builds a noisy sine trace whose frequency and amplitude depend on `index`.
    fn synthetic<R: Rng>(index: u64, len: usize, noise_amplitude: f32, rng: &mut R) -> Self {
        let cycles = (1 + index % FREQUENCY_BANDS) as f32;
        let amplitude = 1.0 + (index % 5) as f32 * 0.25;

        let samples = (0..len)
            .map(|i| {
                let phase = TAU * cycles * i as f32 / len as f32;
                let noise = noise_amplitude * rng.gen_range(-1.0f32..=1.0);
                amplitude * phase.sin() + noise
            })
            .collect();

        Self { index, samples }
    }
}

/// Amplitude statistics of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TraceStats {
    pub index: u64,
    pub rms: f32,
    pub peak: f32,
}

/// Returns the reader producing the traces described by `config`.
///
/// Generation is deterministic for a given `seed` and runs on the thread pulling the iterator.
pub fn synthetic_traces(
    config: &WorkloadConfig,
) -> impl Iterator<Item = PipelineResult<Trace>> + Send + 'static {
    let len = config.samples_per_trace;
    let noise_amplitude = config.noise_amplitude;
    let mut rng = StdRng::seed_from_u64(config.seed);

    (0..config.traces)
        .map(move |index| Ok(Trace::synthetic(index, len, noise_amplitude, &mut rng)))
}

/// Computes the RMS and peak amplitude of `trace`.
pub fn trace_stats(trace: Trace) -> PipelineResult<TraceStats> {
    if trace.samples.is_empty() {
        bail!(
            ErrorKind::TransformFailed,
            "Trace has no samples",
            format!("trace {}", trace.index)
        );
    }

    let mut sum_of_squares = 0f64;
    let mut peak = 0f32;
    for sample in &trace.samples {
        if !sample.is_finite() {
            bail!(
                ErrorKind::TransformFailed,
                "Trace holds a non finite sample",
                format!("trace {}", trace.index)
            );
        }

        sum_of_squares += f64::from(*sample) * f64::from(*sample);
        peak = peak.max(sample.abs());
    }

    let rms = (sum_of_squares / trace.samples.len() as f64).sqrt() as f32;

    Ok(TraceStats {
        index: trace.index,
        rms,
        peak,
    })
}
