use std::sync::Arc;
use ndarray::{Array1, ArrayView1};
use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use crate::drivers::NeuroError;
use crate::types::{Band, BandPowers, BAND_COUNT};
/// Largest FFT the estimator will plan.
pub const MAX_FFT_LEN: usize = 1 << 22;
/// `next_power_of_two(epoch_len * zero_pad_factor)`, or `None` when it
/// overflows or exceeds [`MAX_FFT_LEN`].
pub fn fft_len_for(epoch_len: usize, zero_pad_factor: usize) -> Option<usize> {
    epoch_len
        .checked_mul(zero_pad_factor)
        .and_then(usize::checked_next_power_of_two)
        .filter(|&len| len <= MAX_FFT_LEN)
}
/// One-sided power spectrum of a single epoch.
#[derive(Clone, Debug)]
pub struct FrequencySpectrum {
    pub sample_rate_hz: f64,
    pub frequencies_hz: Vec<f64>,
    pub power: Vec<f64>,
}
impl FrequencySpectrum {
    pub fn resolution_hz(&self) -> f64 {
        self.frequencies_hz.get(1).copied().unwrap_or(self.sample_rate_hz)
    }
    /// Sum of bin power per band. Bins are assigned by centre frequency to
    /// the half-open band ranges, so each bin counts at most once.
    pub fn band_sums(&self) -> BandPowers {
        let mut sums = [0.0; BAND_COUNT];
        for (&freq, &power) in self.frequencies_hz.iter().zip(&self.power) {
            if let Some(band) = Band::for_frequency(freq) {
                sums[band.index()] += power;
            }
        }
        BandPowers::from_array(sums)
    }
}
/// Converts fixed-length epochs into log10 band powers.
///
/// Detrend, symmetric Hamming taper, zero-padded FFT of
/// `next_power_of_two(epoch_len * zero_pad_factor)` points, then one-sided
/// power `2|X[k]|^2 / (nfft * sum(w^2))`, which sums to the variance of the
/// detrended epoch.
pub struct BandPowerEstimator {
    sample_rate_hz: f64,
    epoch_len: usize,
    fft_len: usize,
    window: Array1<f64>,
    window_energy: f64,
    log_floor: f64,
    fft: Arc<dyn Fft<f64>>,
}
impl BandPowerEstimator {
    pub fn new(
        sample_rate_hz: f64,
        epoch_len: usize,
        zero_pad_factor: usize,
        log_floor: f64,
    ) -> Result<Self, NeuroError> {
        if sample_rate_hz <= 0.0 {
            return Err(NeuroError::InvalidSampleRate);
        }
        if epoch_len == 0 || zero_pad_factor == 0 {
            return Err(NeuroError::InvalidConfig(
                "epoch length and zero-pad factor must be non-zero".into(),
            ));
        }
        if !(log_floor > 0.0) {
            return Err(NeuroError::InvalidConfig(format!(
                "log floor must be positive, got {log_floor}"
            )));
        }
        let fft_len = fft_len_for(epoch_len, zero_pad_factor).ok_or_else(|| {
            NeuroError::InvalidConfig(format!(
                "FFT of {epoch_len} x {zero_pad_factor} samples exceeds {MAX_FFT_LEN} points"
            ))
        })?;
        let window = hamming(epoch_len);
        let window_energy = window.dot(&window);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(fft_len);
        Ok(Self {
            sample_rate_hz,
            epoch_len,
            fft_len,
            window,
            window_energy,
            log_floor,
            fft,
        })
    }
    pub fn epoch_len(&self) -> usize {
        self.epoch_len
    }
    pub fn fft_len(&self) -> usize {
        self.fft_len
    }
    pub fn resolution_hz(&self) -> f64 {
        self.sample_rate_hz / self.fft_len as f64
    }
    pub fn log_floor(&self) -> f64 {
        self.log_floor
    }
    pub fn power_spectrum(&self, epoch: &[f64]) -> Result<FrequencySpectrum, NeuroError> {
        if epoch.len() != self.epoch_len {
            return Err(NeuroError::EpochLength {
                expected: self.epoch_len,
                actual: epoch.len(),
            });
        }
        let samples = ArrayView1::from(epoch);
        let mean = samples.sum() / self.epoch_len as f64;
        let tapered = (&samples - mean) * &self.window;
        let mut buffer: Vec<Complex64> = tapered
            .iter()
            .map(|&v| Complex64::new(v, 0.0))
            .collect();
        buffer.resize(self.fft_len, Complex64::new(0.0, 0.0));
        self.fft.process(&mut buffer);
        let half = self.fft_len / 2;
        let scale = 1.0 / (self.fft_len as f64 * self.window_energy);
        let resolution = self.resolution_hz();
        let mut frequencies = Vec::with_capacity(half + 1);
        let mut power = Vec::with_capacity(half + 1);
        for (k, bin) in buffer.iter().take(half + 1).enumerate() {
            // DC and Nyquist have no mirrored negative-frequency bin.
            let one_sided = if k == 0 || k == half { 1.0 } else { 2.0 };
            frequencies.push(k as f64 * resolution);
            power.push(one_sided * bin.norm_sqr() * scale);
        }
        Ok(FrequencySpectrum {
            sample_rate_hz: self.sample_rate_hz,
            frequencies_hz: frequencies,
            power,
        })
    }
    /// Band sums before log compression.
    pub fn linear_band_powers(&self, epoch: &[f64]) -> Result<BandPowers, NeuroError> {
        Ok(self.power_spectrum(epoch)?.band_sums())
    }
    /// `log10` band powers, each floored at the configured epsilon first.
    pub fn band_powers(&self, epoch: &[f64]) -> Result<BandPowers, NeuroError> {
        let linear = self.linear_band_powers(epoch)?;
        Ok(BandPowers::from_array(
            linear.to_array().map(|p| p.max(self.log_floor).log10()),
        ))
    }
}
fn hamming(len: usize) -> Array1<f64> {
    if len == 1 {
        return Array1::ones(1);
    }
    let denom = (len - 1) as f64;
    Array1::from_shape_fn(len, |n| {
        0.54 - 0.46 * (2.0 * std::f64::consts::PI * n as f64 / denom).cos()
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    fn sine(freq_hz: f64, fs: f64, len: usize, amplitude: f64) -> Vec<f64> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * freq_hz * n as f64 / fs).sin())
            .collect()
    }
    #[test]
    fn resolution_follows_padding() {
        let plain = BandPowerEstimator::new(256.0, 256, 1, 1e-12).unwrap();
        assert_eq!(plain.fft_len(), 256);
        assert!((plain.resolution_hz() - 1.0).abs() < 1e-12);
        let padded = BandPowerEstimator::new(256.0, 200, 2, 1e-12).unwrap();
        assert_eq!(padded.fft_len(), 512);
        assert!((padded.resolution_hz() - 0.5).abs() < 1e-12);
    }
    #[test]
    fn alpha_sine_lands_in_alpha_band() {
        let amplitude = 10.0;
        let estimator = BandPowerEstimator::new(256.0, 256, 1, 1e-12).unwrap();
        let linear = estimator
            .linear_band_powers(&sine(10.0, 256.0, 256, amplitude))
            .unwrap();
        let analytic = amplitude * amplitude / 2.0;
        assert!(
            (linear.total() - analytic).abs() < 0.02 * analytic,
            "total {} vs {analytic}",
            linear.total()
        );
        assert!(linear.alpha > 0.99 * linear.total());
        let logged = estimator.band_powers(&sine(10.0, 256.0, 256, amplitude)).unwrap();
        assert!((logged.alpha - linear.alpha.log10()).abs() < 1e-12);
        assert!(logged.alpha > logged.delta);
        assert!(logged.alpha > logged.beta);
    }
    #[test]
    fn padded_spectrum_keeps_total_power() {
        let estimator = BandPowerEstimator::new(256.0, 256, 4, 1e-12).unwrap();
        let linear = estimator
            .linear_band_powers(&sine(20.0, 256.0, 256, 4.0))
            .unwrap();
        assert!((linear.total() - 8.0).abs() < 0.02 * 8.0);
        assert!(linear.beta > 0.99 * linear.total());
    }
    #[test]
    fn dc_offset_is_removed() {
        let estimator = BandPowerEstimator::new(256.0, 256, 1, 1e-12).unwrap();
        let spectrum = estimator.power_spectrum(&[5.0; 256]).unwrap();
        assert!(spectrum.power.iter().all(|&p| p < 1e-20));
        let logged = estimator.band_powers(&[5.0; 256]).unwrap();
        for band in Band::ALL {
            assert!((logged.get(band) - (1e-12f64).log10()).abs() < 1e-12);
        }
    }
    #[test]
    fn band_edges_are_half_open() {
        let estimator = BandPowerEstimator::new(256.0, 256, 1, 1e-12).unwrap();
        let spectrum = estimator.power_spectrum(&[0.0; 256]).unwrap();
        let members = |band: Band| {
            spectrum
                .frequencies_hz
                .iter()
                .filter(|&&f| band.contains(f))
                .count()
        };
        // 1 Hz bins: delta 1..=3, theta 4..=7, alpha 8..=11, beta 12..=29.
        assert_eq!(members(Band::Delta), 3);
        assert_eq!(members(Band::Theta), 4);
        assert_eq!(members(Band::Alpha), 4);
        assert_eq!(members(Band::Beta), 18);
        assert_eq!(spectrum.frequencies_hz.len(), 129);
    }
    #[test]
    fn oversized_fft_is_a_config_error() {
        for pad in [usize::MAX / 2, MAX_FFT_LEN] {
            let err = BandPowerEstimator::new(256.0, 256, pad, 1e-12).err().unwrap();
            assert!(matches!(err, NeuroError::InvalidConfig(_)));
        }
        assert_eq!(fft_len_for(256, 4), Some(1024));
        assert_eq!(fft_len_for(MAX_FFT_LEN, 1), Some(MAX_FFT_LEN));
    }
    #[test]
    fn rejects_partial_epoch() {
        let estimator = BandPowerEstimator::new(256.0, 256, 1, 1e-12).unwrap();
        let err = estimator.band_powers(&[0.0; 100]).unwrap_err();
        assert!(matches!(
            err,
            NeuroError::EpochLength {
                expected: 256,
                actual: 100
            }
        ));
    }
}
