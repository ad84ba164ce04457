//! End-to-end tests of the simulation driver and the IR pipeline.

mod common;

use common::{cube_mesh, icosahedron_mesh};
use glam::Vec3;
use roomverb::{
    render_impulse_response, run_simulation, FrequencyBand, RayRadiosityConfig, ReceiverSphere,
    SimControl, SimulationParams,
};

const SPEED_OF_SOUND: f32 = 343.0;

fn receiver() -> ReceiverSphere {
    ReceiverSphere {
        center: Vec3::new(3.0, 0.0, 0.0),
        radius: 0.5,
    }
}

fn keep_going(_: roomverb::Progress) -> SimControl {
    SimControl::Continue
}

#[test]
fn identical_seeds_give_identical_results() {
    let mesh = cube_mesh(10.0);
    let params = SimulationParams {
        num_rays: 2_000,
        max_bounces: 16,
        seed: "abcdef".into(),
        rr_config: RayRadiosityConfig {
            enabled: true,
            ..RayRadiosityConfig::default()
        },
        ..SimulationParams::default()
    };

    let a = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going).unwrap();
    let b = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going).unwrap();
    assert_eq!(a.arrivals_by_band, b.arrivals_by_band);
    assert_eq!(
        a.radiosity.late_arrival_count,
        b.radiosity.late_arrival_count
    );
    assert_eq!(a.total_arrivals, b.total_arrivals);

    // per-ray substreams make the result independent of the thread count
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap();
    let c = pool
        .install(|| run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going))
        .unwrap();
    assert_eq!(a.arrivals_by_band, c.arrivals_by_band);
}

#[test]
fn different_seeds_differ() {
    let mesh = cube_mesh(10.0);
    let base = SimulationParams {
        num_rays: 1_000,
        max_bounces: 8,
        seed: "one".into(),
        ..SimulationParams::default()
    };
    let other = SimulationParams {
        seed: "two".into(),
        ..base.clone()
    };
    let a = run_simulation(&mesh, Vec3::ZERO, receiver(), &base, keep_going).unwrap();
    let b = run_simulation(&mesh, Vec3::ZERO, receiver(), &other, keep_going).unwrap();
    assert_ne!(a.arrivals_by_band, b.arrivals_by_band);
}

#[test]
fn closed_room_amplitudes_follow_absorption_powers() {
    let alpha = 0.3f32;
    let mesh = cube_mesh(10.0);
    let params = SimulationParams {
        num_rays: 2_000,
        max_bounces: 26,
        bands: FrequencyBand::default_set(alpha),
        seed: "decay".into(),
        ..SimulationParams::default()
    };
    let result = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going).unwrap();

    let base: f32 = 1.0 - alpha;
    for list in &result.arrivals_by_band {
        assert!(!list.is_empty());
        for arrival in list {
            let a = arrival.amplitude;
            assert!(a > 0.0 && a <= 1.0);
            // amplitude must be an integer power of (1 - alpha)
            let bounces = a.ln() / base.ln();
            assert!((bounces - bounces.round()).abs() < 1e-3, "amplitude {a}");
            assert!(bounces.round() >= 0.0 && bounces.round() <= 26.0);
        }
    }
}

#[test]
fn no_absorption_means_no_escape() {
    let mesh = cube_mesh(10.0);
    let params = SimulationParams {
        num_rays: 2_000,
        max_bounces: 64,
        bands: FrequencyBand::default_set(0.0),
        seed: "conserve".into(),
        ..SimulationParams::default()
    };
    let result = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going).unwrap();
    assert_eq!(result.stats.escaped_rays, 0);
    assert_eq!(result.stats.aborted_rays, 0);
}

#[test]
fn direct_path_arrives_in_every_band() {
    let mesh = cube_mesh(10.0);
    let params = SimulationParams {
        num_rays: 5_000,
        max_bounces: 8,
        seed: "direct".into(),
        ..SimulationParams::default()
    };
    let result = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going).unwrap();

    let lo = 2.5 / SPEED_OF_SOUND;
    let hi = 3.5 / SPEED_OF_SOUND;
    for (band, list) in result.bands.iter().zip(&result.arrivals_by_band) {
        assert!(
            list.iter().any(|a| a.time >= lo && a.time <= hi),
            "no direct arrival in {} Hz band",
            band.center_hz
        );
    }
}

#[test]
fn band_amplitudes_decay_in_lockstep() {
    let mesh = cube_mesh(10.0);
    let alpha_lo = 0.1f32;
    let alpha_hi = 0.5f32;
    let params = SimulationParams {
        num_rays: 2_000,
        max_bounces: 10,
        bands: vec![
            FrequencyBand {
                center_hz: 200.0,
                absorption: alpha_lo,
            },
            FrequencyBand {
                center_hz: 10_000.0,
                absorption: alpha_hi,
            },
        ],
        seed: "bands".into(),
        ..SimulationParams::default()
    };
    let result = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going).unwrap();

    let low = &result.arrivals_by_band[0];
    let high = &result.arrivals_by_band[1];
    assert_eq!(low.len(), high.len());
    assert!(!low.is_empty());

    let ratio_base = ((1.0 - alpha_hi) / (1.0 - alpha_lo)) as f64;
    for (a, b) in low.iter().zip(high) {
        // both bands record the same ray at the same instant
        assert_eq!(a.time, b.time);
        let bounces = (b.amplitude as f64 / a.amplitude as f64).ln() / ratio_base.ln();
        assert!(
            (bounces - bounces.round()).abs() < 1e-3,
            "ratio {} not a power of {}",
            b.amplitude / a.amplitude,
            ratio_base
        );
        let expected = a.amplitude as f64 * ratio_base.powi(bounces.round() as i32);
        assert!((expected - b.amplitude as f64).abs() < 1e-6);
    }
}

#[test]
fn anechoic_room_yields_only_unit_direct_arrivals() {
    let mesh = cube_mesh(100.0);
    let receiver = ReceiverSphere {
        center: Vec3::new(5.0, 0.0, 0.0),
        radius: 1.0,
    };
    let params = SimulationParams {
        num_rays: 1_000,
        max_bounces: 8,
        bands: FrequencyBand::default_set(1.0),
        seed: "anechoic".into(),
        ..SimulationParams::default()
    };
    let result = run_simulation(&mesh, Vec3::ZERO, receiver, &params, keep_going).unwrap();

    assert_eq!(result.radiosity.late_arrival_count, 0);
    let direct_max = 5.0 / SPEED_OF_SOUND;
    let counts: Vec<usize> = result.arrivals_by_band.iter().map(|l| l.len()).collect();
    assert!(counts.iter().all(|&c| c == counts[0]));
    assert!(counts[0] > 0);
    for list in &result.arrivals_by_band {
        for arrival in list {
            assert_eq!(arrival.amplitude, 1.0);
            assert!(arrival.time <= direct_max);
        }
    }
}

#[test]
fn radiosity_tail_is_present_and_bounded() {
    let mesh = icosahedron_mesh(5.0);
    let receiver = ReceiverSphere {
        center: Vec3::new(1.0, 0.0, 0.0),
        radius: 0.5,
    };
    let params = SimulationParams {
        num_rays: 5_000,
        max_bounces: 20,
        bands: FrequencyBand::default_set(0.2),
        seed: "tail".into(),
        rr_config: RayRadiosityConfig {
            enabled: true,
            scattering_coeff: 0.3,
            histogram_resolution: 2.5e-3,
            max_time: 3.0,
            hybrid_bounce_threshold: 3,
            poisson_density: 10.0,
            diffuse_gain: 1.0,
            min_energy_threshold: 1e-9,
        },
        ..SimulationParams::default()
    };
    let result = run_simulation(&mesh, Vec3::ZERO, receiver, &params, keep_going).unwrap();

    assert!(result.radiosity.late_arrival_count > 0);
    assert_eq!(result.radiosity.histogram_bins, 1_200);
    for list in &result.arrivals_by_band {
        for arrival in list {
            assert!(arrival.time <= 3.0 + 1e-6);
        }
        // sorted ascending after synthesis
        for pair in list.windows(2) {
            assert!(pair[0].time <= pair[1].time);
        }
    }
}

#[test]
fn higher_poisson_density_grows_the_tail() {
    let mesh = cube_mesh(10.0);
    let base = SimulationParams {
        num_rays: 300,
        max_bounces: 12,
        bands: FrequencyBand::default_set(0.2),
        rr_config: RayRadiosityConfig {
            enabled: true,
            hybrid_bounce_threshold: 1,
            poisson_density: 1.0,
            ..RayRadiosityConfig::default()
        },
        ..SimulationParams::default()
    };

    let mut late_low = 0usize;
    let mut late_high = 0usize;
    for seed in 0..20 {
        let mut low = base.clone();
        low.seed = format!("density{seed}");
        let mut high = low.clone();
        high.rr_config.poisson_density = 50.0;

        late_low += run_simulation(&mesh, Vec3::ZERO, receiver(), &low, keep_going)
            .unwrap()
            .radiosity
            .late_arrival_count;
        late_high += run_simulation(&mesh, Vec3::ZERO, receiver(), &high, keep_going)
            .unwrap()
            .radiosity
            .late_arrival_count;
    }
    assert!(late_high > late_low, "{late_high} vs {late_low}");
}

#[test]
fn progress_is_monotone_and_reaches_one() {
    let mesh = cube_mesh(10.0);
    let params = SimulationParams {
        num_rays: 5_000,
        max_bounces: 8,
        batch_size: 500,
        seed: "progress".into(),
        ..SimulationParams::default()
    };
    let mut fractions = Vec::new();
    run_simulation(&mesh, Vec3::ZERO, receiver(), &params, |p| {
        fractions.push(p.fraction_done);
        SimControl::Continue
    })
    .unwrap();

    assert_eq!(fractions.len(), 10);
    for pair in fractions.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    assert!(*fractions.last().unwrap() >= 0.999);
}

#[test]
fn cancellation_stops_the_run() {
    let mesh = cube_mesh(10.0);
    let params = SimulationParams {
        num_rays: 100_000,
        max_bounces: 16,
        batch_size: 1_000,
        seed: "cancel".into(),
        ..SimulationParams::default()
    };
    let mut batches = 0;
    let result = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, |_| {
        batches += 1;
        if batches >= 3 {
            SimControl::Stop
        } else {
            SimControl::Continue
        }
    });
    assert!(matches!(result, Err(roomverb::EngineError::Cancelled)));
    assert_eq!(batches, 3);
}

#[test]
fn rendered_ir_peaks_at_headroom_near_the_direct_path() {
    let mesh = cube_mesh(10.0);
    let params = SimulationParams {
        num_rays: 3_000,
        max_bounces: 12,
        // band set kept under the 4 kHz Nyquist of the render below
        bands: [200.0f32, 800.0, 3_200.0]
            .iter()
            .map(|&center_hz| FrequencyBand {
                center_hz,
                absorption: 0.1,
            })
            .collect(),
        seed: "render".into(),
        ..SimulationParams::default()
    };
    let result = run_simulation(&mesh, Vec3::ZERO, receiver(), &params, keep_going).unwrap();

    let sample_rate = 8_000u32;
    let ir = render_impulse_response(&result, sample_rate);
    assert_eq!(ir.band_samples.len(), result.bands.len());
    assert!(!ir.samples.is_empty());

    let peak = ir.samples.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    assert!((peak - 0.98).abs() < 1e-4);

    // strongest energy sits at the direct arrival
    let peak_index = ir
        .samples
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .unwrap()
        .0;
    let direct_index = (2.5 / SPEED_OF_SOUND * sample_rate as f32).round() as isize;
    assert!(
        (peak_index as isize - direct_index).abs() <= 12,
        "peak at {peak_index}, direct at {direct_index}"
    );
}
