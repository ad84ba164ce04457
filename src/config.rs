use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const DEFAULT_SPEED_OF_SOUND: f32 = 343.0;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Band centers used when the caller does not supply a set of their own.
pub const DEFAULT_BAND_CENTERS: [f32; 4] = [200.0, 800.0, 3200.0, 10_000.0];
/// Nominal center used for single-band (frequency-independent) runs.
pub const SINGLE_BAND_CENTER: f32 = 1000.0;

/// A frequency band: center in Hz plus the wall absorption applied per
/// bounce in that band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub center_hz: f32,
    pub absorption: f32,
}

impl FrequencyBand {
    pub fn default_set(absorption: f32) -> Vec<FrequencyBand> {
        DEFAULT_BAND_CENTERS
            .iter()
            .map(|&center_hz| FrequencyBand {
                center_hz,
                absorption,
            })
            .collect()
    }
}

fn default_scattering() -> f32 {
    0.3
}
fn default_histogram_resolution() -> f32 {
    2.5e-3
}
fn default_max_time() -> f32 {
    3.0
}
fn default_hybrid_bounce_threshold() -> u32 {
    3
}
fn default_poisson_density() -> f32 {
    10.0
}
fn default_diffuse_gain() -> f32 {
    1.0
}
fn default_min_energy_threshold() -> f32 {
    1e-9
}

/// Configuration of the hybrid radiosity late tail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RayRadiosityConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Specular/diffuse mix; also scales the diffuse energy contribution.
    #[serde(default = "default_scattering")]
    pub scattering_coeff: f32,
    /// Histogram bin width in seconds.
    #[serde(default = "default_histogram_resolution")]
    pub histogram_resolution: f32,
    /// Tail horizon in seconds; contributions beyond it are discarded.
    #[serde(default = "default_max_time")]
    pub max_time: f32,
    /// Bounce index at which diffuse accumulation begins.
    #[serde(default = "default_hybrid_bounce_threshold")]
    pub hybrid_bounce_threshold: u32,
    /// Maps histogram energy to an expected pulse count.
    #[serde(default = "default_poisson_density")]
    pub poisson_density: f32,
    #[serde(default = "default_diffuse_gain")]
    pub diffuse_gain: f32,
    /// Energy below this is dropped on accumulation and synthesis.
    #[serde(default = "default_min_energy_threshold")]
    pub min_energy_threshold: f32,
}

impl Default for RayRadiosityConfig {
    fn default() -> Self {
        RayRadiosityConfig {
            enabled: false,
            scattering_coeff: default_scattering(),
            histogram_resolution: default_histogram_resolution(),
            max_time: default_max_time(),
            hybrid_bounce_threshold: default_hybrid_bounce_threshold(),
            poisson_density: default_poisson_density(),
            diffuse_gain: default_diffuse_gain(),
            min_energy_threshold: default_min_energy_threshold(),
        }
    }
}

impl RayRadiosityConfig {
    fn validate(&self) -> Result<()> {
        let err = |msg: String| Err(EngineError::InvalidParams(msg));
        if !(0.0..=1.0).contains(&self.scattering_coeff) {
            return err(format!(
                "scatteringCoeff {} outside [0, 1]",
                self.scattering_coeff
            ));
        }
        if !(self.histogram_resolution >= 5e-4) {
            return err(format!(
                "histogramResolution {} below 5e-4 s",
                self.histogram_resolution
            ));
        }
        if !(self.max_time >= self.histogram_resolution) {
            return err(format!(
                "maxTime {} shorter than one histogram bin",
                self.max_time
            ));
        }
        if self.hybrid_bounce_threshold > 64 {
            return err(format!(
                "hybridBounceThreshold {} above 64",
                self.hybrid_bounce_threshold
            ));
        }
        if !(self.poisson_density >= 0.1) {
            return err(format!("poissonDensity {} below 0.1", self.poisson_density));
        }
        if !(self.diffuse_gain >= 0.01) {
            return err(format!("diffuseGain {} below 0.01", self.diffuse_gain));
        }
        if !(1e-12..=1e-3).contains(&self.min_energy_threshold) {
            return err(format!(
                "minEnergyThreshold {} outside [1e-12, 1e-3]",
                self.min_energy_threshold
            ));
        }
        Ok(())
    }
}

/// Everything one simulation invocation needs besides the geometry.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub num_rays: usize,
    pub max_bounces: u32,
    /// Sorted ascending by center frequency.
    pub bands: Vec<FrequencyBand>,
    pub seed: String,
    pub speed_of_sound: f32,
    /// Rays per batch; progress is reported and cancellation observed at
    /// batch boundaries.
    pub batch_size: usize,
    pub rr_config: RayRadiosityConfig,
    /// When set, arrivals past `phase_threshold` bounces get a random sign.
    pub randomize_phase: bool,
    pub phase_threshold: u32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            num_rays: 10_000,
            max_bounces: 32,
            bands: FrequencyBand::default_set(0.1),
            seed: "default".into(),
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
            batch_size: DEFAULT_BATCH_SIZE,
            rr_config: RayRadiosityConfig::default(),
            randomize_phase: false,
            phase_threshold: 3,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> Result<()> {
        let err = |msg: String| Err(EngineError::InvalidParams(msg));
        if self.num_rays == 0 {
            return err("numRays must be positive".into());
        }
        if self.max_bounces == 0 {
            return err("maxBounces must be positive".into());
        }
        if self.batch_size == 0 {
            return err("batchSize must be positive".into());
        }
        if !(self.speed_of_sound > 0.0) || !self.speed_of_sound.is_finite() {
            return err(format!("speedOfSound {} must be positive", self.speed_of_sound));
        }
        if self.bands.is_empty() {
            return err("band set is empty".into());
        }
        for band in &self.bands {
            if !(band.center_hz > 0.0) || !band.center_hz.is_finite() {
                return err(format!("band center {} must be positive", band.center_hz));
            }
            if !(0.0..=1.0).contains(&band.absorption) {
                return err(format!(
                    "absorption {} at {} Hz outside [0, 1]",
                    band.absorption, band.center_hz
                ));
            }
        }
        if self.rr_config.enabled {
            self.rr_config.validate()?;
        }
        Ok(())
    }
}
