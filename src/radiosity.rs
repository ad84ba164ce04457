//! Late-tail energy histograms and Poisson pulse synthesis.
//!
//! During tracing, bounces past the hybrid threshold deposit
//! receiver-visible diffuse energy into per-band time histograms. After all
//! rays finish, each occupied bin is expanded into a small group of signed
//! pulses whose count follows a Poisson draw and whose summed energy equals
//! the bin energy. The energy bookkeeping (amplitude squared, scaled by
//! diffuse gain and scattering) is a deliberate heuristic carried over from
//! the reference behavior rather than a physical model.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::RayRadiosityConfig;
use crate::rng::poisson_sample;
use crate::simulation::Arrival;

pub struct EnergyHistograms {
    bins: usize,
    resolution: f32,
    data: Vec<Vec<f32>>,
}

impl EnergyHistograms {
    pub fn new(num_bands: usize, config: &RayRadiosityConfig) -> EnergyHistograms {
        let bins = (config.max_time / config.histogram_resolution).ceil().max(1.0) as usize;
        EnergyHistograms {
            bins,
            resolution: config.histogram_resolution,
            data: vec![vec![0.0; bins]; num_bands],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins
    }

    pub fn add(&mut self, band: usize, bin: usize, energy: f32) {
        if bin < self.bins {
            self.data[band][bin] += energy;
        }
    }

    pub fn band(&self, band: usize) -> &[f32] {
        &self.data[band]
    }

    /// Expands occupied bins into signed pulses appended to each band's
    /// arrival list. Returns the number of pulses emitted. All draws come
    /// from the dedicated synthesis stream, so the tail is reproducible and
    /// independent of how the tracing was scheduled.
    pub fn synthesize(
        &self,
        config: &RayRadiosityConfig,
        rng: &mut ChaCha8Rng,
        arrivals_by_band: &mut [Vec<Arrival>],
    ) -> usize {
        let mut emitted = 0usize;
        for (band, hist) in self.data.iter().enumerate() {
            for (bin, &energy) in hist.iter().enumerate() {
                if energy <= config.min_energy_threshold {
                    continue;
                }
                let lambda = energy * config.poisson_density;
                let count = poisson_sample(rng, lambda).max(1);
                let amplitude = (energy / count as f32).sqrt();
                for _ in 0..count {
                    let time = bin as f32 * self.resolution + rng.gen::<f32>() * self.resolution;
                    let sign = if rng.gen::<f32>() < 0.5 { -1.0 } else { 1.0 };
                    arrivals_by_band[band].push(Arrival {
                        time,
                        amplitude: amplitude * sign,
                    });
                    emitted += 1;
                }
            }
        }
        log::debug!("radiosity synthesis: {emitted} pulses from {} bins", self.bins);
        emitted
    }
}
