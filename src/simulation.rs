//! The batched Monte-Carlo ray tracing driver.
//!
//! Rays are emitted uniformly from the point source and bounced through the
//! mesh until they reach the receiver sphere, escape, die out, or exhaust
//! the bounce budget. Per-band amplitudes decay by `1 - absorption` at every
//! wall hit. Past the hybrid bounce threshold, diffuse energy visible from
//! the receiver accumulates into time histograms that are later expanded
//! into the late tail.
//!
//! Batches run in parallel; each ray draws from its own pre-seeded
//! substream and per-ray outcomes are merged in ray-index order, so results
//! are bit-identical for any thread count.

use std::time::Instant;

use glam::Vec3;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{RayRadiosityConfig, SimulationParams};
use crate::error::{EngineError, Result};
use crate::geometry::{
    cosine_weighted_hemisphere, mix_reflection, ray_sphere_intersect, reflect,
    uniform_sphere_direction, OFFSET_EPS,
};
use crate::mesh::Mesh;
use crate::radiosity::EnergyHistograms;
use crate::rng;

/// The receiver: a sphere that rays terminate on.
#[derive(Debug, Clone, Copy)]
pub struct ReceiverSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl ReceiverSphere {
    pub fn validate(&self) -> Result<()> {
        if !(self.radius > 0.0) || !self.radius.is_finite() || !self.center.is_finite() {
            return Err(EngineError::InvalidGeometry(format!(
                "receiver radius {} must be positive and finite",
                self.radius
            )));
        }
        Ok(())
    }
}

/// One recorded arrival at the receiver. The sign of the amplitude is a
/// phase flag; its magnitude is the pressure-like contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub time: f32,
    pub amplitude: f32,
}

/// Progress snapshot emitted after every batch.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub fraction_done: f32,
    pub rays_per_second: u64,
    pub total_arrivals: usize,
}

/// Observer verdict after a progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationStats {
    /// Rays that left the mesh without reaching the receiver.
    pub escaped_rays: usize,
    /// Rays abandoned on numerical errors.
    pub aborted_rays: usize,
}

#[derive(Debug, Clone)]
pub struct RadiosityReport {
    pub enabled: bool,
    pub late_arrival_count: usize,
    pub histogram_bins: usize,
    pub config: RayRadiosityConfig,
}

pub struct SimulationResult {
    pub bands: Vec<crate::config::FrequencyBand>,
    /// Parallel to `bands`; each list ascending by time.
    pub arrivals_by_band: Vec<Vec<Arrival>>,
    /// Sum of all per-band arrival list lengths, early and late.
    pub total_arrivals: usize,
    pub avg_rays_per_second: u64,
    pub radiosity: RadiosityReport,
    pub stats: SimulationStats,
}

struct EarlyArrival {
    time: f32,
    /// Signed amplitude per band, parallel to the band set.
    amplitudes: Vec<f32>,
}

struct TailContribution {
    band: u16,
    bin: u32,
    energy: f32,
}

#[derive(Default)]
struct RayOutcome {
    arrival: Option<EarlyArrival>,
    tail: Vec<TailContribution>,
    escaped: bool,
    aborted: bool,
}

fn trace_ray(
    mesh: &Mesh,
    source: Vec3,
    receiver: ReceiverSphere,
    params: &SimulationParams,
    alphas: &[f32],
    seed: [u8; 32],
    ray_index: u64,
) -> RayOutcome {
    let mut outcome = RayOutcome::default();
    let mut rng = rng::stream_rng(seed, rng::ray_stream(ray_index));

    let mut origin = source;
    let mut direction = uniform_sphere_direction(&mut rng);
    let mut total_distance = 0.0f32;
    let mut amplitude = vec![1.0f32; alphas.len()];

    let rr = &params.rr_config;
    let scattering = rr.scattering_coeff;

    for bounce in 0..params.max_bounces {
        let receiver_t = ray_sphere_intersect(origin, direction, receiver.center, receiver.radius);
        let mesh_hit = mesh.closest_hit(origin, direction);

        let receiver_first = match (receiver_t, &mesh_hit) {
            (Some(t), Some(hit)) => t < hit.distance,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if receiver_first {
            total_distance += receiver_t.unwrap();
            let time = total_distance / params.speed_of_sound;
            if !time.is_finite() {
                outcome.aborted = true;
                return outcome;
            }
            let sign = if params.randomize_phase && bounce > params.phase_threshold {
                if rng.gen::<f32>() < 0.5 {
                    -1.0
                } else {
                    1.0
                }
            } else {
                1.0
            };
            outcome.arrival = Some(EarlyArrival {
                time,
                amplitudes: amplitude.iter().map(|a| a * sign).collect(),
            });
            return outcome;
        }

        let Some(hit) = mesh_hit else {
            outcome.escaped = true;
            return outcome;
        };
        if !hit.distance.is_finite() || !hit.point.is_finite() {
            outcome.aborted = true;
            return outcome;
        }

        total_distance += hit.distance;
        for (a, alpha) in amplitude.iter_mut().zip(alphas) {
            *a *= (1.0 - alpha).max(0.0);
        }

        if rr.enabled && bounce >= rr.hybrid_bounce_threshold {
            let d_rx = (hit.point - receiver.center)
                .length()
                .max((receiver.radius * 0.5).max(0.01));
            let tau_rx = (total_distance + d_rx) / params.speed_of_sound;
            if tau_rx <= rr.max_time {
                let bin = (tau_rx / rr.histogram_resolution) as u32;
                let inv_square = 1.0 / (4.0 * std::f32::consts::PI * d_rx * d_rx).max(1e-6);
                for (band, &a) in amplitude.iter().enumerate() {
                    if a > 0.0 {
                        let energy = a * a * rr.diffuse_gain * inv_square * scattering.max(1e-3);
                        if energy > rr.min_energy_threshold {
                            outcome.tail.push(TailContribution {
                                band: band as u16,
                                bin,
                                energy,
                            });
                        }
                    }
                }
            }
        }

        // fully absorbed in every band: the ray can contribute nothing more
        if amplitude.iter().all(|&a| a <= 0.0) {
            return outcome;
        }

        let specular = reflect(direction, hit.normal);
        direction = if scattering > 0.0 {
            let diffuse = cosine_weighted_hemisphere(&mut rng, hit.normal);
            mix_reflection(specular, diffuse, scattering)
        } else {
            specular
        };
        if !direction.is_finite() {
            outcome.aborted = true;
            return outcome;
        }
        origin = hit.point + direction * OFFSET_EPS;
    }

    // bounce budget exhausted without reaching the receiver
    outcome
}

/// Runs a full simulation against a built mesh. The observer is invoked
/// after every batch; returning [`SimControl::Stop`] cancels the run
/// (`Cancelled`, no result).
pub fn run_simulation(
    mesh: &Mesh,
    source: Vec3,
    receiver: ReceiverSphere,
    params: &SimulationParams,
    mut observer: impl FnMut(Progress) -> SimControl,
) -> Result<SimulationResult> {
    params.validate()?;
    receiver.validate()?;
    if !source.is_finite() {
        return Err(EngineError::InvalidParams("source position is not finite".into()));
    }

    let seed = rng::seed_from_str(&params.seed);
    let alphas: Vec<f32> = params.bands.iter().map(|b| b.absorption).collect();
    let num_bands = params.bands.len();

    let mut arrivals_by_band: Vec<Vec<Arrival>> = vec![Vec::new(); num_bands];
    let mut histograms = params
        .rr_config
        .enabled
        .then(|| EnergyHistograms::new(num_bands, &params.rr_config));
    let mut stats = SimulationStats::default();
    let mut arrival_count = 0usize;

    log::info!(
        "simulation start: {} rays, {} bounces, {} bands, seed {:?}",
        params.num_rays,
        params.max_bounces,
        num_bands,
        params.seed
    );

    let start = Instant::now();
    let mut done = 0usize;
    while done < params.num_rays {
        let count = params.batch_size.min(params.num_rays - done);
        let outcomes: Vec<RayOutcome> = (done..done + count)
            .into_par_iter()
            .map(|i| trace_ray(mesh, source, receiver, params, &alphas, seed, i as u64))
            .collect();

        // merge in ray-index order to keep accumulation deterministic
        for outcome in outcomes {
            if let Some(early) = outcome.arrival {
                for (band, &a) in early.amplitudes.iter().enumerate() {
                    arrivals_by_band[band].push(Arrival {
                        time: early.time,
                        amplitude: a,
                    });
                    arrival_count += 1;
                }
            }
            if let Some(hist) = histograms.as_mut() {
                for c in &outcome.tail {
                    hist.add(c.band as usize, c.bin as usize, c.energy);
                }
            }
            stats.escaped_rays += outcome.escaped as usize;
            stats.aborted_rays += outcome.aborted as usize;
        }
        done += count;

        let elapsed = start.elapsed().as_secs_f64();
        let rays_per_second = if elapsed > 0.0 {
            (done as f64 / elapsed) as u64
        } else {
            0
        };
        let progress = Progress {
            fraction_done: done as f32 / params.num_rays as f32,
            rays_per_second,
            total_arrivals: arrival_count,
        };
        if observer(progress) == SimControl::Stop {
            log::info!("simulation cancelled after {done} rays");
            return Err(EngineError::Cancelled);
        }
    }

    if stats.aborted_rays * 100 > params.num_rays {
        return Err(EngineError::Internal(format!(
            "{} of {} rays aborted on numerical errors",
            stats.aborted_rays, params.num_rays
        )));
    }

    let (late_count, histogram_bins) = match histograms.take() {
        Some(hist) => {
            let mut synth_rng = rng::stream_rng(seed, rng::SYNTHESIS_STREAM);
            let late = hist.synthesize(&params.rr_config, &mut synth_rng, &mut arrivals_by_band);
            (late, hist.bin_count())
        }
        None => (0, 0),
    };

    for list in &mut arrivals_by_band {
        list.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    let total_arrivals: usize = arrivals_by_band.iter().map(|l| l.len()).sum();
    let elapsed = start.elapsed().as_secs_f64();
    let avg_rays_per_second = if elapsed > 0.0 {
        (params.num_rays as f64 / elapsed) as u64
    } else {
        0
    };
    log::info!(
        "simulation done: {total_arrivals} arrivals ({late_count} late), {} escaped, {} aborted",
        stats.escaped_rays,
        stats.aborted_rays
    );

    Ok(SimulationResult {
        bands: params.bands.clone(),
        arrivals_by_band,
        total_arrivals,
        avg_rays_per_second,
        radiosity: RadiosityReport {
            enabled: params.rr_config.enabled,
            late_arrival_count: late_count,
            histogram_bins,
            config: params.rr_config,
        },
        stats,
    })
}
