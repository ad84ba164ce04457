//! roomverb: acoustic Monte-Carlo ray tracing for room impulse responses.
//!
//! A triangle-mesh enclosure, a point source, and a spherical receiver go
//! in; a multi-band impulse response comes out. Rays bounce specularly and
//! diffusely with per-band absorption, early arrivals are recorded
//! directly, and the diffuse late field is reconstructed from energy
//! histograms as a Poisson process of signed pulses. Arrivals are placed
//! with fractional-sample accuracy, band-limited with windowed-sinc FIR
//! filters, and mixed to a mono IR suitable for convolution reverb.
//!
//! The engine can be driven directly ([`run_simulation`] +
//! [`render_impulse_response`]) or through the message-protocol worker
//! ([`WorkerHandle`], or the `roomverb-worker` binary speaking JSON lines
//! over stdio).

pub mod bvh;
pub mod config;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod ir;
pub mod mesh;
pub mod radiosity;
pub mod rng;
pub mod simulation;
pub mod wav;
pub mod worker;

pub use config::{FrequencyBand, RayRadiosityConfig, SimulationParams};
pub use error::{EngineError, Result};
pub use ir::{render_impulse_response, ImpulseResponse};
pub use mesh::Mesh;
pub use simulation::{
    run_simulation, Arrival, Progress, ReceiverSphere, SimControl, SimulationResult,
};
pub use worker::{Command, Event, Worker, WorkerHandle};
