//! Seedable random streams.
//!
//! All randomness flows through explicitly threaded [`ChaCha8Rng`] values;
//! nothing touches a process-wide RNG. A single string seed is hashed into
//! key material, and independent logical streams are carved out of it with
//! `set_stream`: stream 0 belongs to the late-tail pulse synthesis, stream
//! `i + 1` to the ray with global index `i`. Keying rays by their global
//! index makes runs bit-identical for any thread count.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Stream reserved for radiosity pulse synthesis.
pub const SYNTHESIS_STREAM: u64 = 0;

pub fn seed_from_str(seed: &str) -> [u8; 32] {
    let digest = Sha256::digest(seed.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn stream_rng(seed: [u8; 32], stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::from_seed(seed);
    rng.set_stream(stream);
    rng
}

pub fn ray_stream(ray_index: u64) -> u64 {
    ray_index + 1
}

/// Poisson-distributed sample with mean `lambda`.
///
/// Knuth's multiplicative method below lambda 30; above that the product
/// of uniforms underflows, so a rounded normal approximation (Box-Muller)
/// takes over.
pub fn poisson_sample<R: Rng>(rng: &mut R, lambda: f32) -> u32 {
    if !(lambda > 0.0) {
        return 0;
    }
    if lambda < 30.0 {
        let limit = (-lambda).exp();
        let mut k = 0u32;
        let mut p = 1.0f32;
        loop {
            p *= rng.gen::<f32>();
            if p <= limit {
                return k;
            }
            k += 1;
        }
    } else {
        let u1 = rng.gen::<f32>().max(f32::MIN_POSITIVE);
        let u2 = rng.gen::<f32>();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos();
        (lambda + lambda.sqrt() * z).round().max(0.0) as u32
    }
}
