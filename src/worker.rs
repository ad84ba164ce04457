//! The orchestrator: a command-driven state machine that owns the geometry
//! and runs simulations off the caller's thread.
//!
//! Commands arrive over a channel and events flow back through a sink.
//! While a simulation is running the command channel is polled at batch
//! boundaries, so `cancel` and `terminate` take effect within one batch.
//! `cancel` stops the current run and keeps the worker (and its geometry)
//! alive; `terminate` stops everything and ends the worker loop. A
//! cancelled run emits no `complete`.

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::{
    FrequencyBand, RayRadiosityConfig, SimulationParams, DEFAULT_BATCH_SIZE,
    DEFAULT_SPEED_OF_SOUND, SINGLE_BAND_CENTER,
};
use crate::error::{EngineError, Result};
use crate::mesh::Mesh;
use crate::simulation::{run_simulation, Arrival, ReceiverSphere, SimControl, SimulationResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Vec3Payload {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3Payload {
    fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomGeometry {
    pub positions: Vec<f32>,
    #[serde(default)]
    pub normals: Option<Vec<f32>>,
    #[serde(default)]
    pub indices: Option<Vec<u32>>,
}

/// Geometry message payload. `emitterPosition`/`emitterRadius` are the
/// receiver sphere under its legacy wire name; the emission point defaults
/// to the origin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeometryPayload {
    pub room_geometry: RoomGeometry,
    pub emitter_radius: f32,
    pub emitter_position: Vec3Payload,
    #[serde(default)]
    pub source_position: Option<Vec3Payload>,
}

fn default_true() -> bool {
    true
}
fn default_speed_of_sound() -> f32 {
    DEFAULT_SPEED_OF_SOUND
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_phase_threshold() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatePayload {
    pub num_rays: usize,
    pub max_bounces: u32,
    #[serde(default = "default_true")]
    pub use_freq_dependent: bool,
    /// Band center (Hz, as a string key) to absorption coefficient.
    pub absorption_coeffs: BTreeMap<String, f32>,
    pub seed: String,
    #[serde(default = "default_speed_of_sound")]
    pub speed_of_sound: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub rr_config: RayRadiosityConfig,
    #[serde(default)]
    pub randomize_phase: bool,
    #[serde(default = "default_phase_threshold")]
    pub phase_threshold: u32,
}

impl SimulatePayload {
    pub fn to_params(&self) -> Result<SimulationParams> {
        if self.absorption_coeffs.is_empty() {
            return Err(EngineError::InvalidParams("absorptionCoeffs is empty".into()));
        }
        let bands = if self.use_freq_dependent {
            let mut bands = Vec::with_capacity(self.absorption_coeffs.len());
            for (key, &absorption) in &self.absorption_coeffs {
                let center_hz: f32 = key.parse().map_err(|_| {
                    EngineError::InvalidParams(format!("band key {key:?} is not a frequency"))
                })?;
                bands.push(FrequencyBand {
                    center_hz,
                    absorption,
                });
            }
            bands.sort_by(|a, b| a.center_hz.total_cmp(&b.center_hz));
            bands
        } else {
            // frequency-independent run: one nominal band with the mean
            // absorption
            let mean = self.absorption_coeffs.values().sum::<f32>()
                / self.absorption_coeffs.len() as f32;
            vec![FrequencyBand {
                center_hz: SINGLE_BAND_CENTER,
                absorption: mean,
            }]
        };
        Ok(SimulationParams {
            num_rays: self.num_rays,
            max_bounces: self.max_bounces,
            bands,
            seed: self.seed.clone(),
            speed_of_sound: self.speed_of_sound,
            batch_size: self.batch_size,
            rr_config: self.rr_config,
            randomize_phase: self.randomize_phase,
            phase_threshold: self.phase_threshold,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    Init,
    SetGeometry { data: GeometryPayload },
    Simulate { data: SimulatePayload },
    Cancel,
    Terminate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadiosityReportWire {
    pub enabled: bool,
    pub late_arrival_count: usize,
    pub histogram_bins: usize,
    pub rr_config: RayRadiosityConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    Ready,
    GeometrySet,
    #[serde(rename_all = "camelCase")]
    Progress {
        progress: f32,
        rays_per_second: u64,
        current_arrivals: usize,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        #[serde(skip_serializing_if = "Option::is_none")]
        arrivals_by_band: Option<BTreeMap<String, Vec<Arrival>>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arrivals: Option<Vec<Arrival>>,
        freq_bands: Vec<u32>,
        total_arrivals: usize,
        avg_rays_per_second: u64,
        ray_radiosity: RadiosityReportWire,
    },
    Error {
        error: String,
    },
}

fn complete_event(result: SimulationResult, single_band: bool) -> Event {
    let freq_bands: Vec<u32> = result
        .bands
        .iter()
        .map(|b| b.center_hz.round() as u32)
        .collect();
    let ray_radiosity = RadiosityReportWire {
        enabled: result.radiosity.enabled,
        late_arrival_count: result.radiosity.late_arrival_count,
        histogram_bins: result.radiosity.histogram_bins,
        rr_config: result.radiosity.config,
    };
    let total_arrivals = result.total_arrivals;
    let avg_rays_per_second = result.avg_rays_per_second;

    let mut arrivals_by_band = result.arrivals_by_band;
    let (by_band, flat) = if single_band {
        (None, Some(arrivals_by_band.swap_remove(0)))
    } else {
        let map = freq_bands
            .iter()
            .zip(arrivals_by_band)
            .map(|(&hz, list)| (hz.to_string(), list))
            .collect();
        (Some(map), None)
    };

    Event::Complete {
        arrivals_by_band: by_band,
        arrivals: flat,
        freq_bands,
        total_arrivals,
        avg_rays_per_second,
        ray_radiosity,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Shutdown,
}

/// Worker state: geometry is retained across simulations until replaced.
pub struct Worker {
    mesh: Option<Mesh>,
    receiver: Option<ReceiverSphere>,
    source: Vec3,
}

impl Default for Worker {
    fn default() -> Self {
        Worker {
            mesh: None,
            receiver: None,
            source: Vec3::ZERO,
        }
    }
}

impl Worker {
    pub fn new() -> Worker {
        Worker::default()
    }

    fn set_geometry(&mut self, data: GeometryPayload) -> Result<()> {
        let geometry = &data.room_geometry;
        let mesh = Mesh::build(
            &geometry.positions,
            geometry.normals.as_deref(),
            geometry.indices.as_deref(),
        )?;
        let receiver = ReceiverSphere {
            center: data.emitter_position.to_vec3(),
            radius: data.emitter_radius,
        };
        receiver.validate()?;
        self.mesh = Some(mesh);
        self.receiver = Some(receiver);
        self.source = data
            .source_position
            .map(Vec3Payload::to_vec3)
            .unwrap_or(Vec3::ZERO);
        Ok(())
    }

    fn simulate(
        &self,
        payload: &SimulatePayload,
        commands: &Receiver<Command>,
        emit: &mut impl FnMut(Event),
    ) -> LoopControl {
        let (Some(mesh), Some(receiver)) = (self.mesh.as_ref(), self.receiver) else {
            emit(Event::Error {
                error: EngineError::NotReady.to_string(),
            });
            return LoopControl::Continue;
        };
        let params = match payload.to_params() {
            Ok(params) => params,
            Err(e) => {
                emit(Event::Error {
                    error: e.to_string(),
                });
                return LoopControl::Continue;
            }
        };

        let mut shutdown = false;
        let result = run_simulation(mesh, self.source, receiver, &params, |progress| {
            emit(Event::Progress {
                progress: progress.fraction_done,
                rays_per_second: progress.rays_per_second,
                current_arrivals: progress.total_arrivals,
            });
            let mut stop = false;
            loop {
                match commands.try_recv() {
                    // stop consuming once cancelled so queued commands stay
                    // in line for the main loop
                    Ok(Command::Cancel) => {
                        stop = true;
                        break;
                    }
                    Ok(Command::Terminate) => {
                        stop = true;
                        shutdown = true;
                        break;
                    }
                    Ok(_) => emit(Event::Error {
                        error: "simulation in progress".into(),
                    }),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        stop = true;
                        shutdown = true;
                        break;
                    }
                }
            }
            if stop {
                SimControl::Stop
            } else {
                SimControl::Continue
            }
        });

        match result {
            Ok(result) => emit(complete_event(result, !payload.use_freq_dependent)),
            Err(EngineError::Cancelled) => {} // silent per protocol
            Err(e) => emit(Event::Error {
                error: e.to_string(),
            }),
        }

        if shutdown {
            LoopControl::Shutdown
        } else {
            LoopControl::Continue
        }
    }

    /// Drives the worker until `terminate` or channel disconnect.
    pub fn run(commands: Receiver<Command>, mut emit: impl FnMut(Event)) {
        let mut worker = Worker::new();
        while let Ok(command) = commands.recv() {
            match command {
                Command::Init => emit(Event::Ready),
                Command::SetGeometry { data } => match worker.set_geometry(data) {
                    Ok(()) => emit(Event::GeometrySet),
                    Err(e) => emit(Event::Error {
                        error: e.to_string(),
                    }),
                },
                Command::Simulate { data } => {
                    if worker.simulate(&data, &commands, &mut emit) == LoopControl::Shutdown {
                        break;
                    }
                }
                Command::Cancel => {} // nothing running between commands
                Command::Terminate => break,
            }
        }
        log::info!("worker loop ended");
    }
}

/// In-process worker handle: a dedicated thread plus command/event
/// channels.
pub struct WorkerHandle {
    commands: Sender<Command>,
    events: Receiver<Event>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn() -> WorkerHandle {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let thread = std::thread::Builder::new()
            .name("roomverb-worker".into())
            .spawn(move || {
                Worker::run(command_rx, move |event| {
                    let _ = event_tx.send(event);
                })
            })
            .expect("worker thread failed to spawn");
        WorkerHandle {
            commands: command_tx,
            events: event_rx,
            thread: Some(thread),
        }
    }

    /// Returns false when the worker has already terminated.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Terminate);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
