//! Assembly of per-band arrival lists into time-domain sample buffers and
//! the final band-limited impulse response.

use rayon::prelude::*;

use crate::filter::{bandpass_kernel, convolve_centered, mix_bands};
use crate::simulation::{Arrival, SimulationResult};

/// The rendered impulse response: the summed mono signal plus the filtered
/// per-band buffers it was mixed from.
pub struct ImpulseResponse {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
    pub band_samples: Vec<Vec<f32>>,
}

/// Shared buffer duration for all bands: the latest arrival anywhere plus
/// half a second of tail room, and at least one second.
pub fn buffer_duration(arrivals_by_band: &[Vec<Arrival>]) -> f32 {
    let tau_max = arrivals_by_band
        .iter()
        .flatten()
        .map(|a| a.time)
        .fold(0.0f32, f32::max);
    (tau_max + 0.5).max(1.0)
}

/// Spreads each arrival across the two neighboring samples in proportion
/// to its fractional position, then rescales if the peak exceeds 1.
pub fn assemble_band(arrivals: &[Arrival], sample_rate: u32, duration: f32) -> Vec<f32> {
    let len = (duration as f64 * sample_rate as f64).ceil() as usize;
    let mut buf = vec![0.0f32; len.max(1)];
    for arrival in arrivals {
        let x = arrival.time as f64 * sample_rate as f64;
        let index = x.floor() as usize;
        let frac = (x - x.floor()) as f32;
        if index + 1 < buf.len() {
            buf[index] += arrival.amplitude * (1.0 - frac);
            buf[index + 1] += arrival.amplitude * frac;
        } else if index < buf.len() {
            buf[index] += arrival.amplitude;
        }
    }

    let peak = buf.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    if peak > 1.0 {
        for v in &mut buf {
            *v /= peak;
        }
    }
    buf
}

/// Full pipeline: per band, place arrivals into a raw buffer, band-limit it
/// with the windowed-sinc kernel, then sum everything to the mono IR.
pub fn render_impulse_response(result: &SimulationResult, sample_rate: u32) -> ImpulseResponse {
    let duration = buffer_duration(&result.arrivals_by_band);
    let band_samples: Vec<Vec<f32>> = result
        .bands
        .par_iter()
        .zip(result.arrivals_by_band.par_iter())
        .map(|(band, arrivals)| {
            let raw = assemble_band(arrivals, sample_rate, duration);
            let kernel = bandpass_kernel(band.center_hz, sample_rate as f32);
            convolve_centered(&raw, &kernel)
        })
        .collect();
    let samples = mix_bands(&band_samples);
    ImpulseResponse {
        sample_rate,
        samples,
        band_samples,
    }
}
