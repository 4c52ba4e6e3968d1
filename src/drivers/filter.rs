use std::f64::consts::PI;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use crate::drivers::NeuroError;
/// Line-noise rejection filters available for the sample buffer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    /// Single RBJ notch section.
    Notch { freq_hz: f64, q: f64 },
    /// Digital Butterworth band-stop of the given prototype order, one biquad
    /// per pole pair of the transformed prototype.
    Bandstop { low_hz: f64, high_hz: f64, order: usize },
}
impl Default for FilterKind {
    fn default() -> Self {
        // 4th-order 55-65 Hz band-stop, centred on 60 Hz mains.
        FilterKind::Bandstop {
            low_hz: 55.0,
            high_hz: 65.0,
            order: 4,
        }
    }
}
/// Normalised second-order section (a0 == 1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}
impl BiquadCoeffs {
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}
/// Transposed direct form II delay line of one section.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BiquadState {
    z1: f64,
    z2: f64,
}
/// Delay lines carried between chunks.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FilterState {
    #[default]
    Uninitialized,
    Active(Vec<BiquadState>),
}
impl FilterState {
    pub fn is_active(&self) -> bool {
        matches!(self, FilterState::Active(_))
    }
}
/// Cascade of biquad sections. Holds coefficients only; the delay lines are
/// threaded through [`FilterChain::process`] by the caller.
#[derive(Clone, Debug)]
pub struct FilterChain {
    sections: Vec<BiquadCoeffs>,
}
impl FilterChain {
    pub fn design(sample_rate_hz: f64, kind: FilterKind) -> Result<Self, NeuroError> {
        if sample_rate_hz <= 0.0 {
            return Err(NeuroError::InvalidSampleRate);
        }
        let sections = match kind {
            FilterKind::Notch { freq_hz, q } => {
                check_below_nyquist(freq_hz, sample_rate_hz)?;
                if q <= 0.0 {
                    return Err(NeuroError::InvalidFilter(format!(
                        "notch quality factor must be positive, got {q}"
                    )));
                }
                vec![notch(freq_hz, sample_rate_hz, q)]
            }
            FilterKind::Bandstop {
                low_hz,
                high_hz,
                order,
            } => butterworth_bandstop(sample_rate_hz, low_hz, high_hz, order)?,
        };
        Ok(Self { sections })
    }
    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }
    /// Delay lines at rest for a constant input equal to `first_sample`, so
    /// the output starts without a step transient.
    pub fn steady_state(&self, first_sample: f64) -> Vec<BiquadState> {
        let mut x = first_sample;
        self.sections
            .iter()
            .map(|c| {
                let y = c.dc_gain() * x;
                let z2 = c.b2 * x - c.a2 * y;
                let z1 = c.b1 * x - c.a1 * y + z2;
                x = y;
                BiquadState { z1, z2 }
            })
            .collect()
    }
    /// Filters one chunk, continuing from `state`. An empty chunk leaves the
    /// state untouched, including an uninitialized one.
    pub fn process(&self, input: &[f64], state: FilterState) -> (Vec<f64>, FilterState) {
        let Some(&first) = input.first() else {
            return (Vec::new(), state);
        };
        let mut delay = match state {
            FilterState::Active(delay) if delay.len() == self.sections.len() => delay,
            _ => self.steady_state(first),
        };
        let output = input
            .iter()
            .map(|&sample| {
                let mut value = sample;
                for (c, s) in self.sections.iter().zip(delay.iter_mut()) {
                    let y = c.b0 * value + s.z1;
                    s.z1 = c.b1 * value - c.a1 * y + s.z2;
                    s.z2 = c.b2 * value - c.a2 * y;
                    value = y;
                }
                value
            })
            .collect();
        (output, FilterState::Active(delay))
    }
}
fn check_below_nyquist(freq_hz: f64, sample_rate_hz: f64) -> Result<(), NeuroError> {
    let nyquist = sample_rate_hz * 0.5;
    if freq_hz <= 0.0 || freq_hz >= nyquist {
        return Err(NeuroError::InvalidFilter(format!(
            "{freq_hz} Hz is outside (0, {nyquist}) Hz"
        )));
    }
    Ok(())
}
fn notch(center_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * center_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let a0_inv = 1.0 / (1.0 + alpha);
    BiquadCoeffs {
        b0: a0_inv,
        b1: -2.0 * cos_w0 * a0_inv,
        b2: a0_inv,
        a1: -2.0 * cos_w0 * a0_inv,
        a2: (1.0 - alpha) * a0_inv,
    }
}
fn butterworth_bandstop(
    sample_rate_hz: f64,
    low_hz: f64,
    high_hz: f64,
    order: usize,
) -> Result<Vec<BiquadCoeffs>, NeuroError> {
    if order == 0 {
        return Err(NeuroError::InvalidFilter("order must be at least 1".into()));
    }
    if low_hz >= high_hz {
        return Err(NeuroError::InvalidFilter(format!(
            "band edges must be increasing, got {low_hz}..{high_hz} Hz"
        )));
    }
    check_below_nyquist(low_hz, sample_rate_hz)?;
    check_below_nyquist(high_hz, sample_rate_hz)?;
    // Pre-warped analog edges for the bilinear transform.
    let two_fs = 2.0 * sample_rate_hz;
    let w_low = two_fs * (PI * low_hz / sample_rate_hz).tan();
    let w_high = two_fs * (PI * high_hz / sample_rate_hz).tan();
    let bandwidth = w_high - w_low;
    let w0 = (w_low * w_high).sqrt();
    let mut pole_pairs: Vec<(Complex64, Complex64)> = Vec::with_capacity(order);
    for k in 0..order {
        let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
        let p = Complex64::from_polar(1.0, theta);
        if p.im > 1e-12 {
            // Its conjugate prototype pole yields the conjugate pair.
            let (s1, s2) = bandstop_poles(p, bandwidth, w0);
            pole_pairs.push((s1, s1.conj()));
            pole_pairs.push((s2, s2.conj()));
        } else if p.im.abs() <= 1e-12 {
            pole_pairs.push(bandstop_poles(p, bandwidth, w0));
        }
    }
    // Zeros at +/- j*w0 land on the unit circle.
    let zero = bilinear(Complex64::new(0.0, w0), two_fs);
    let b1_unit = -2.0 * zero.re;
    let sections = pole_pairs
        .into_iter()
        .map(|(s1, s2)| {
            let z1 = bilinear(s1, two_fs);
            let z2 = bilinear(s2, two_fs);
            let a1 = -(z1 + z2).re;
            let a2 = (z1 * z2).re;
            let gain = (1.0 + a1 + a2) / (2.0 + b1_unit);
            BiquadCoeffs {
                b0: gain,
                b1: b1_unit * gain,
                b2: gain,
                a1,
                a2,
            }
        })
        .collect();
    Ok(sections)
}
/// Roots of `s^2 - (bw / p) s + w0^2`, the image of prototype pole `p` under
/// the low-pass to band-stop substitution.
fn bandstop_poles(p: Complex64, bandwidth: f64, w0: f64) -> (Complex64, Complex64) {
    let b = Complex64::new(bandwidth, 0.0) / p;
    let disc = (b * b - 4.0 * w0 * w0).sqrt();
    ((b + disc) * 0.5, (b - disc) * 0.5)
}
fn bilinear(s: Complex64, two_fs: f64) -> Complex64 {
    (two_fs + s) / (two_fs - s)
}
