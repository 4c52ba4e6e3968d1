// src/types.rs
use std::fmt;
use serde::{Deserialize, Serialize};

pub const BAND_COUNT: usize = 4;

/// Canonical EEG bands, in report order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
}

impl Band {
    pub const ALL: [Band; BAND_COUNT] = [Band::Delta, Band::Theta, Band::Alpha, Band::Beta];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Half-open `[low, high)` range in Hz.
    pub fn range_hz(self) -> (f64, f64) {
        match self {
            Band::Delta => (1.0, 4.0),
            Band::Theta => (4.0, 8.0),
            Band::Alpha => (8.0, 12.0),
            Band::Beta => (12.0, 30.0),
        }
    }

    pub fn contains(self, freq_hz: f64) -> bool {
        let (low, high) = self.range_hz();
        freq_hz >= low && freq_hz < high
    }

    /// The band a bin centred at `freq_hz` belongs to, if any.
    pub fn for_frequency(freq_hz: f64) -> Option<Band> {
        Band::ALL.into_iter().find(|band| band.contains(freq_hz))
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Delta => "Delta",
            Band::Theta => "Theta",
            Band::Alpha => "Alpha",
            Band::Beta => "Beta",
        }
    }
}

/// One value per band: log10 power from the estimator, or the linear sums
/// before compression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    pub delta: f64,
    pub theta: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl BandPowers {
    pub fn from_array(values: [f64; BAND_COUNT]) -> Self {
        let [delta, theta, alpha, beta] = values;
        Self { delta, theta, alpha, beta }
    }

    pub fn to_array(self) -> [f64; BAND_COUNT] {
        [self.delta, self.theta, self.alpha, self.beta]
    }

    pub fn get(&self, band: Band) -> f64 {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
        }
    }

    pub fn total(&self) -> f64 {
        self.to_array().iter().sum()
    }
}

impl fmt::Display for BandPowers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Delta: {:.2}, Theta: {:.2}, Alpha: {:.2}, Beta: {:.2}",
            self.delta, self.theta, self.alpha, self.beta
        )
    }
}

/// What one loop iteration emits.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub iteration: u64,
    pub chunk_len: usize,
    /// Peak-to-peak amplitude of the raw chunk; `None` for an empty pull.
    pub signal_diff: Option<f64>,
    pub blink: bool,
    /// Band powers of the newest epoch.
    pub latest: BandPowers,
    /// Mean over the smoothing buffer.
    pub smoothed: BandPowers,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal_diff {
            Some(diff) => writeln!(f, "Signal Difference: {diff:.2}")?,
            None => writeln!(f, "Signal Difference: n/a (empty chunk)")?,
        }
        if self.blink {
            writeln!(f, "Blink detected!")?;
        }
        write!(f, "{}", self.smoothed)
    }
}

/// Totals accumulated over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub iterations: u64,
    pub blinks: u64,
    pub samples: u64,
    pub empty_pulls: u64,
}
