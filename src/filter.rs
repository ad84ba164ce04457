//! Linear-phase FIR bandpass filtering and the multi-band mixer.

pub const NUM_TAPS: usize = 257;
/// Final mix is scaled so its peak sits at this level.
pub const MIX_HEADROOM: f32 = 0.98;

/// Band edges: one octave-equivalent bandwidth centered on `center`,
/// clamped to the audible floor and just under Nyquist. The low edge never
/// crosses the high edge, so a band pushed against Nyquist degrades to a
/// sliver instead of inverting.
pub fn band_edges(center: f32, sample_rate: f32) -> (f32, f32) {
    let f_high = (center + center / 2.0).min(sample_rate / 2.0 - 1.0);
    let f_low = (center - center / 2.0).max(20.0).min(f_high);
    (f_low, f_high)
}

/// Windowed-sinc bandpass kernel: difference of two sinc low-passes under a
/// Hann window, normalized to unit magnitude response at `center` so narrow
/// low bands are not penalized by the fixed transition width.
pub fn bandpass_kernel(center: f32, sample_rate: f32) -> Vec<f32> {
    let (f_low, f_high) = band_edges(center, sample_rate);
    let fl = f_low / sample_rate;
    let fh = f_high / sample_rate;
    let mid = (NUM_TAPS - 1) / 2;

    let mut kernel = vec![0.0f32; NUM_TAPS];
    for (n, tap) in kernel.iter_mut().enumerate() {
        let k = n as f32 - mid as f32;
        let ideal = if n == mid {
            2.0 * (fh - fl)
        } else {
            ((std::f32::consts::TAU * fh * k).sin() - (std::f32::consts::TAU * fl * k).sin())
                / (std::f32::consts::PI * k)
        };
        let window =
            0.5 - 0.5 * (std::f32::consts::TAU * n as f32 / (NUM_TAPS - 1) as f32).cos();
        *tap = ideal * window;
    }

    // normalize at the center, pulled inside the band when Nyquist
    // clamping moved the edges past it
    let eval = center.clamp(f_low, f_high);
    let gain = magnitude_response(&kernel, eval, sample_rate);
    if gain > 1e-12 {
        for tap in &mut kernel {
            *tap /= gain;
        }
    }
    kernel
}

/// Magnitude of the kernel's frequency response at `freq`.
pub fn magnitude_response(kernel: &[f32], freq: f32, sample_rate: f32) -> f32 {
    let omega = std::f64::consts::TAU * freq as f64 / sample_rate as f64;
    let mut re = 0.0f64;
    let mut im = 0.0f64;
    for (n, &c) in kernel.iter().enumerate() {
        let phase = omega * n as f64;
        re += c as f64 * phase.cos();
        im -= c as f64 * phase.sin();
    }
    (re * re + im * im).sqrt() as f32
}

/// Convolution with the linear-phase group delay compensated, so filtered
/// output stays time-aligned with the input. Output length equals input
/// length.
pub fn convolve_centered(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    let mid = (kernel.len() - 1) / 2;
    let n = signal.len();
    let mut out = vec![0.0f32; n];
    for (i, sample) in out.iter_mut().enumerate() {
        let base = i + mid;
        let j_start = base.saturating_sub(n - 1);
        let j_end = kernel.len().min(base + 1);
        let mut acc = 0.0f32;
        for j in j_start..j_end {
            acc += kernel[j] * signal[base - j];
        }
        *sample = acc;
    }
    out
}

/// Point-wise sum of the band buffers (shorter ones zero-extended), scaled
/// so the peak lands exactly at [`MIX_HEADROOM`].
pub fn mix_bands(bands: &[Vec<f32>]) -> Vec<f32> {
    let len = bands.iter().map(|b| b.len()).max().unwrap_or(0);
    let mut sum = vec![0.0f32; len];
    for band in bands {
        for (out, &v) in sum.iter_mut().zip(band) {
            *out += v;
        }
    }
    let peak = sum.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
    if peak > 0.0 {
        let scale = MIX_HEADROOM / peak;
        for v in &mut sum {
            *v *= scale;
        }
    }
    sum
}
