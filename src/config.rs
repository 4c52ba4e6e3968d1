//! Operator parameters for one run. Built once, validated against the
//! source's sample rate, then passed by value into the pipeline.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::brainflow::BrainFlowSettings;
use crate::drivers::fft::fft_len_for;
use crate::drivers::filter::{FilterChain, FilterKind};
use crate::drivers::NeuroError;

// Absorbs float noise in products such as 0.2 * 256 before flooring.
const SAMPLE_EPSILON: f64 = 1e-9;
/// Largest raw sample buffer accepted (about 18 h at 256 Hz).
pub const MAX_BUFFER_SAMPLES: usize = 1 << 24;
/// Largest number of band-power rows kept for smoothing.
pub const MAX_SMOOTHING_ROWS: usize = 1 << 16;
/// Longest pull or discovery timeout accepted, in seconds.
pub const MAX_TIMEOUT_S: f64 = 3600.0;

/// Signal-processing and detection parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeurofeedbackConfig {
    /// Length of the raw sample buffer in seconds (default: 5.0)
    pub buffer_length_s: f64,

    /// Length of each analysed epoch in seconds (default: 1.0)
    pub epoch_length_s: f64,

    /// Overlap between consecutive epochs in seconds (default: 0.8)
    pub overlap_length_s: f64,

    /// Source channel to analyse (default: 0, left ear on a Muse)
    pub channel_index: usize,

    /// Peak-to-peak amplitude above which a chunk counts as a blink (default: 200.0)
    pub blink_threshold: f64,

    /// Line-noise filter for the sample buffer; `None` disables filtering
    pub notch: Option<FilterKind>,

    /// FFT length is `next_power_of_two(epoch_samples * zero_pad_factor)` (default: 1)
    pub zero_pad_factor: usize,

    /// Floor applied to band power before `log10` (default: 1e-12)
    pub log_floor: f64,

    /// Longest a single pull may block, in seconds (default: 1.0)
    pub pull_timeout_s: f64,

    /// Seconds allowed for the board session to come up (default: 10.0)
    pub discovery_timeout_s: f64,

    /// Board connection parameters for the BrainFlow source
    pub brainflow: BrainFlowSettings,
}

impl Default for NeurofeedbackConfig {
    fn default() -> Self {
        Self {
            buffer_length_s: 5.0,
            epoch_length_s: 1.0,
            overlap_length_s: 0.8,
            channel_index: 0,
            blink_threshold: 200.0,
            notch: Some(FilterKind::default()),
            zero_pad_factor: 1,
            log_floor: 1e-12,
            pull_timeout_s: 1.0,
            discovery_timeout_s: 10.0,
            brainflow: BrainFlowSettings::default(),
        }
    }
}

impl NeurofeedbackConfig {
    /// Reads a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, NeuroError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            NeuroError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn shift_length_s(&self) -> f64 {
        self.epoch_length_s - self.overlap_length_s
    }

    pub fn buffer_samples(&self, sample_rate_hz: u32) -> usize {
        seconds_to_samples(self.buffer_length_s, sample_rate_hz)
    }

    pub fn epoch_samples(&self, sample_rate_hz: u32) -> usize {
        seconds_to_samples(self.epoch_length_s, sample_rate_hz)
    }

    /// Samples requested per pull: one epoch shift.
    pub fn shift_samples(&self, sample_rate_hz: u32) -> usize {
        seconds_to_samples(self.shift_length_s(), sample_rate_hz).max(1)
    }

    /// Number of epochs that fit in the buffer at the configured shift.
    pub fn band_buffer_len(&self) -> usize {
        let epochs =
            (self.buffer_length_s - self.epoch_length_s) / self.shift_length_s() + 1.0;
        (epochs + SAMPLE_EPSILON).floor().max(1.0) as usize
    }

    pub fn pull_timeout(&self) -> Duration {
        bounded_duration(self.pull_timeout_s)
    }

    pub fn discovery_timeout(&self) -> Duration {
        bounded_duration(self.discovery_timeout_s)
    }

    pub fn validate(&self, sample_rate_hz: u32) -> Result<(), NeuroError> {
        if sample_rate_hz == 0 {
            return Err(NeuroError::InvalidSampleRate);
        }
        let invalid = |msg: String| Err(NeuroError::InvalidConfig(msg));
        if !(self.epoch_length_s > 0.0) {
            return invalid(format!("epoch length must be positive, got {}", self.epoch_length_s));
        }
        if !(self.buffer_length_s >= self.epoch_length_s) {
            return invalid(format!(
                "buffer ({} s) must hold at least one epoch ({} s)",
                self.buffer_length_s, self.epoch_length_s
            ));
        }
        if !(self.overlap_length_s >= 0.0 && self.overlap_length_s < self.epoch_length_s) {
            return invalid(format!(
                "overlap must be in [0, {}) s, got {}",
                self.epoch_length_s, self.overlap_length_s
            ));
        }
        let epoch_samples = self.epoch_samples(sample_rate_hz);
        if epoch_samples == 0 {
            return invalid(format!(
                "epoch of {} s is shorter than one sample at {sample_rate_hz} Hz",
                self.epoch_length_s
            ));
        }
        if seconds_to_samples(self.shift_length_s(), sample_rate_hz) == 0 {
            return invalid(format!(
                "epoch shift of {} s is shorter than one sample at {sample_rate_hz} Hz",
                self.shift_length_s()
            ));
        }
        let buffer_samples = self.buffer_samples(sample_rate_hz);
        if buffer_samples > MAX_BUFFER_SAMPLES {
            return invalid(format!(
                "buffer of {buffer_samples} samples exceeds the limit of {MAX_BUFFER_SAMPLES}"
            ));
        }
        let rows = self.band_buffer_len();
        if rows > MAX_SMOOTHING_ROWS {
            return invalid(format!(
                "{rows} smoothing rows exceed the limit of {MAX_SMOOTHING_ROWS}"
            ));
        }
        if self.zero_pad_factor == 0 {
            return invalid("zero-pad factor must be at least 1".into());
        }
        if fft_len_for(epoch_samples, self.zero_pad_factor).is_none() {
            return invalid(format!(
                "zero-pad factor {} is too large for an epoch of {epoch_samples} samples",
                self.zero_pad_factor
            ));
        }
        if !self.blink_threshold.is_finite() {
            return invalid("blink threshold must be finite".into());
        }
        if !(self.log_floor > 0.0) {
            return invalid(format!("log floor must be positive, got {}", self.log_floor));
        }
        for timeout in [self.pull_timeout_s, self.discovery_timeout_s] {
            if !(0.0..=MAX_TIMEOUT_S).contains(&timeout) {
                return invalid(format!("timeouts must be within [0, {MAX_TIMEOUT_S}] s, got {timeout}"));
            }
        }
        if let Some(kind) = self.notch {
            FilterChain::design(sample_rate_hz as f64, kind)
                .map_err(|e| NeuroError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }
}

// NaN and negative values map to zero, anything longer to MAX_TIMEOUT_S.
fn bounded_duration(seconds: f64) -> Duration {
    if seconds > 0.0 {
        Duration::from_secs_f64(seconds.min(MAX_TIMEOUT_S))
    } else {
        Duration::ZERO
    }
}

fn seconds_to_samples(seconds: f64, sample_rate_hz: u32) -> usize {
    (seconds * sample_rate_hz as f64 + SAMPLE_EPSILON).floor().max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_muse_sizes() {
        let config = NeurofeedbackConfig::default();
        config.validate(256).unwrap();
        assert_eq!(config.buffer_samples(256), 1280);
        assert_eq!(config.epoch_samples(256), 256);
        assert_eq!(config.shift_samples(256), 51);
        assert_eq!(config.band_buffer_len(), 21);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: NeurofeedbackConfig =
            serde_json::from_str(r#"{ "blink_threshold": 150.0, "notch": null }"#).unwrap();
        assert_eq!(config.blink_threshold, 150.0);
        assert!(config.notch.is_none());
        assert_eq!(config.buffer_length_s, 5.0);
    }

    #[test]
    fn notch_kind_round_trips_through_json() {
        let json = r#"{ "notch": { "kind": "notch", "freq_hz": 50.0, "q": 30.0 } }"#;
        let config: NeurofeedbackConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.notch, Some(FilterKind::Notch { freq_hz: 50.0, q: 30.0 }));
    }

    #[test]
    fn rejects_overlap_not_shorter_than_epoch() {
        let config = NeurofeedbackConfig {
            overlap_length_s: 1.0,
            ..NeurofeedbackConfig::default()
        };
        assert!(matches!(config.validate(256), Err(NeuroError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_epoch_longer_than_buffer() {
        let config = NeurofeedbackConfig {
            epoch_length_s: 6.0,
            ..NeurofeedbackConfig::default()
        };
        assert!(config.validate(256).is_err());
        assert!(matches!(
            NeurofeedbackConfig::default().validate(0),
            Err(NeuroError::InvalidSampleRate)
        ));
    }

    #[test]
    fn rejects_shift_shorter_than_one_sample() {
        let config = NeurofeedbackConfig {
            overlap_length_s: 1.0 - 1e-10,
            ..NeurofeedbackConfig::default()
        };
        assert!(matches!(config.validate(256), Err(NeuroError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_oversized_derived_lengths() {
        let huge_pad = NeurofeedbackConfig {
            zero_pad_factor: usize::MAX / 2,
            ..NeurofeedbackConfig::default()
        };
        assert!(matches!(huge_pad.validate(256), Err(NeuroError::InvalidConfig(_))));
        let huge_buffer = NeurofeedbackConfig {
            buffer_length_s: 1e9,
            ..NeurofeedbackConfig::default()
        };
        assert!(matches!(huge_buffer.validate(256), Err(NeuroError::InvalidConfig(_))));
        let many_rows = NeurofeedbackConfig {
            buffer_length_s: 60_000.0,
            overlap_length_s: 1.0 - 1.0 / 256.0,
            ..NeurofeedbackConfig::default()
        };
        assert!(matches!(many_rows.validate(256), Err(NeuroError::InvalidConfig(_))));
        let endless_pull = NeurofeedbackConfig {
            pull_timeout_s: f64::INFINITY,
            discovery_timeout_s: f64::NAN,
            ..NeurofeedbackConfig::default()
        };
        assert!(matches!(endless_pull.validate(256), Err(NeuroError::InvalidConfig(_))));
        assert_eq!(endless_pull.pull_timeout(), Duration::from_secs_f64(MAX_TIMEOUT_S));
        assert_eq!(endless_pull.discovery_timeout(), Duration::ZERO);
    }

    #[test]
    fn rejects_filter_band_above_nyquist() {
        let config = NeurofeedbackConfig::default();
        // 55-65 Hz does not fit below the 50 Hz Nyquist limit of 100 Hz.
        assert!(matches!(config.validate(100), Err(NeuroError::InvalidConfig(_))));
        let unfiltered = NeurofeedbackConfig {
            notch: None,
            ..NeurofeedbackConfig::default()
        };
        unfiltered.validate(100).unwrap();
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = NeurofeedbackConfig::from_json_file("/nonexistent/neurofeedback.json").unwrap_err();
        assert!(matches!(err, NeuroError::InvalidConfig(_)));
    }
}
