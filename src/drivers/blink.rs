/// Outcome of checking one chunk.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlinkReading {
    /// `max - min` of the chunk, `None` when the chunk was empty.
    pub signal_diff: Option<f64>,
    pub blink: bool,
}
/// Stateless peak-to-peak detector. Every chunk is judged on its own, with no
/// debounce, so a blink spanning several chunks fires once per chunk.
#[derive(Clone, Copy, Debug)]
pub struct BlinkDetector {
    threshold: f64,
}
impl BlinkDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
    pub fn evaluate(&self, chunk: &[f64]) -> BlinkReading {
        let signal_diff = peak_to_peak(chunk);
        BlinkReading {
            signal_diff,
            blink: signal_diff.map_or(false, |diff| diff > self.threshold),
        }
    }
}
pub fn peak_to_peak(chunk: &[f64]) -> Option<f64> {
    let (&first, rest) = chunk.split_first()?;
    let (min, max) = rest
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    Some(max - min)
}
/// True iff the chunk's peak-to-peak amplitude strictly exceeds `threshold`.
/// An empty chunk is never a blink.
pub fn is_blink(chunk: &[f64], threshold: f64) -> bool {
    BlinkDetector::new(threshold).evaluate(chunk).blink
}
