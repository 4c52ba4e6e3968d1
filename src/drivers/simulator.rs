use std::f64::consts::PI;
use std::thread;
use std::time::Duration;
use rand::{rngs::StdRng, Rng, SeedableRng};
use crate::drivers::source::{SignalChunk, SignalSource};
use crate::drivers::NeuroError;
/// Synthetic 4-channel headset: alpha-dominant background, 60 Hz mains hum,
/// uniform noise, and a blink bump on every channel at a fixed interval.
pub struct SimulatedSource {
    sample_rate_hz: u32,
    channels: usize,
    rng: StdRng,
    sample_index: u64,
    blink_every: Option<u64>,
    blink_len: u64,
    blink_amplitude: f64,
    realtime: bool,
}
impl SimulatedSource {
    pub fn new(sample_rate_hz: u32, seed: u64) -> Self {
        Self {
            sample_rate_hz,
            channels: 4,
            rng: StdRng::seed_from_u64(seed),
            sample_index: 0,
            blink_every: Some(u64::from(sample_rate_hz) * 4),
            blink_len: u64::from(sample_rate_hz) * 3 / 10,
            blink_amplitude: 400.0,
            realtime: true,
        }
    }
    /// Blink bump period; `None` disables blinks.
    pub fn with_blink_interval(mut self, interval: Option<Duration>) -> Self {
        self.blink_every = interval
            .map(|d| (d.as_secs_f64() * self.sample_rate_hz as f64) as u64)
            .filter(|&n| n > 0);
        self
    }
    /// When off, pulls return immediately instead of pacing at `fs`.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
    fn sample(&mut self, channel: usize) -> f64 {
        let t = self.sample_index as f64 / self.sample_rate_hz as f64;
        let phase = channel as f64 * 0.3;
        let mut value = 20.0 * (2.0 * PI * 10.0 * t + phase).sin()
            + 8.0 * (2.0 * PI * 6.0 * t + phase).sin()
            + 5.0 * (2.0 * PI * 20.0 * t).sin()
            + 2.0 * (2.0 * PI * 2.0 * t).sin()
            + 10.0 * (2.0 * PI * 60.0 * t).sin()
            + self.rng.gen_range(-5.0..5.0);
        if let Some(every) = self.blink_every {
            let offset = self.sample_index % every;
            if offset < self.blink_len {
                value += self.blink_amplitude * (PI * offset as f64 / self.blink_len as f64).sin();
            }
        }
        value
    }
}
impl SignalSource for SimulatedSource {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
    fn channel_count(&self) -> usize {
        self.channels
    }
    fn pull_chunk(
        &mut self,
        timeout: Duration,
        max_samples: usize,
    ) -> Result<Option<SignalChunk>, NeuroError> {
        let fs = self.sample_rate_hz as f64;
        let mut count = max_samples;
        if self.realtime {
            let wanted = Duration::from_secs_f64(max_samples as f64 / fs);
            let waited = wanted.min(timeout);
            thread::sleep(waited);
            count = count.min((waited.as_secs_f64() * fs).round() as usize);
        }
        let mut chunk = SignalChunk::empty(self.channels);
        for _ in 0..count {
            chunk.timestamps.push(self.sample_index as f64 / fs);
            for channel in 0..self.channels {
                let value = self.sample(channel);
                chunk.samples[channel].push(value);
            }
            self.sample_index += 1;
        }
        Ok(Some(chunk))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::blink::is_blink;
    #[test]
    fn produces_requested_chunk_shape() {
        let mut source = SimulatedSource::new(256, 7).with_realtime(false);
        let chunk = source.pull_chunk(Duration::from_secs(1), 51).unwrap().unwrap();
        assert_eq!(chunk.num_channels(), 4);
        assert_eq!(chunk.samples_per_channel(), 51);
        assert_eq!(chunk.timestamps.len(), 51);
    }
    #[test]
    fn blink_bump_exceeds_threshold_and_background_does_not() {
        let mut source = SimulatedSource::new(256, 7)
            .with_realtime(false)
            .with_blink_interval(Some(Duration::from_secs(2)));
        let blink = source.pull_chunk(Duration::from_secs(1), 51).unwrap().unwrap();
        assert!(is_blink(blink.channel(0).unwrap(), 200.0));
        let _ = source.pull_chunk(Duration::from_secs(1), 51).unwrap();
        let quiet = source.pull_chunk(Duration::from_secs(1), 51).unwrap().unwrap();
        assert!(!is_blink(quiet.channel(0).unwrap(), 200.0));
    }
}
