use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use log::{debug, info, warn};
use crate::config::NeurofeedbackConfig;
use crate::drivers::blink::BlinkDetector;
use crate::drivers::buffer::SampleBuffer;
use crate::drivers::error::NeuroError;
use crate::drivers::fft::BandPowerEstimator;
use crate::drivers::filter::FilterChain;
use crate::drivers::smoothing::SmoothingBuffer;
use crate::drivers::source::{SignalChunk, SignalSource};
use crate::trigger::ActionTrigger;
use crate::types::{BandPowers, Report, RunSummary};
// Warn on the first failed pull of a streak, then once per this many.
const FAILURE_WARN_EVERY: u32 = 50;
/// Per-chunk processing chain: blink detection on the raw chunk, then
/// filtered buffering, epoch band powers and smoothing.
pub struct BandPowerTracker {
    channel_index: usize,
    epoch_samples: usize,
    buffer: SampleBuffer,
    estimator: BandPowerEstimator,
    smoothing: SmoothingBuffer,
    detector: BlinkDetector,
    iterations: u64,
}
impl BandPowerTracker {
    pub fn new(
        config: &NeurofeedbackConfig,
        sample_rate_hz: u32,
        channel_count: usize,
    ) -> Result<Self, NeuroError> {
        config.validate(sample_rate_hz)?;
        if config.channel_index >= channel_count {
            return Err(NeuroError::ChannelOutOfRange {
                index: config.channel_index,
                available: channel_count,
            });
        }
        let fs = sample_rate_hz as f64;
        let filter = config
            .notch
            .map(|kind| FilterChain::design(fs, kind))
            .transpose()?;
        let epoch_samples = config.epoch_samples(sample_rate_hz);
        Ok(Self {
            channel_index: config.channel_index,
            epoch_samples,
            buffer: SampleBuffer::new(config.buffer_samples(sample_rate_hz), filter),
            estimator: BandPowerEstimator::new(
                fs,
                epoch_samples,
                config.zero_pad_factor,
                config.log_floor,
            )?,
            smoothing: SmoothingBuffer::new(config.band_buffer_len()),
            detector: BlinkDetector::new(config.blink_threshold),
            iterations: 0,
        })
    }
    /// Runs one iteration on the configured channel of `chunk`. A chunk that
    /// lacks the channel is processed as empty.
    pub fn process_chunk(
        &mut self,
        chunk: &SignalChunk,
        trigger: &mut dyn ActionTrigger,
    ) -> Result<Report, NeuroError> {
        let samples = chunk.channel(self.channel_index).unwrap_or(&[]);
        self.process_samples(samples, trigger)
    }
    pub fn process_samples(
        &mut self,
        samples: &[f64],
        trigger: &mut dyn ActionTrigger,
    ) -> Result<Report, NeuroError> {
        let reading = self.detector.evaluate(samples);
        if let Some(diff) = reading.signal_diff {
            debug!("Signal Difference: {diff:.2}");
        }
        if reading.blink {
            trigger.fire();
        }
        self.buffer.push_chunk(samples);
        let epoch = self.buffer.epoch(self.epoch_samples);
        let latest = self.estimator.band_powers(&epoch)?;
        self.smoothing.push(latest);
        self.iterations += 1;
        Ok(Report {
            iteration: self.iterations,
            chunk_len: samples.len(),
            signal_diff: reading.signal_diff,
            blink: reading.blink,
            latest,
            smoothed: self.smoothing.mean(),
        })
    }
    pub fn smoothed(&self) -> BandPowers {
        self.smoothing.mean()
    }
    pub fn sample_buffer(&self) -> &SampleBuffer {
        &self.buffer
    }
    pub fn smoothing(&self) -> &SmoothingBuffer {
        &self.smoothing
    }
}
/// Pulls chunks from a source and drives a [`BandPowerTracker`].
pub struct NeurofeedbackPipeline<S: SignalSource> {
    source: S,
    tracker: BandPowerTracker,
    config: NeurofeedbackConfig,
    pull_size: usize,
    consecutive_failures: u32,
}
impl<S: SignalSource> NeurofeedbackPipeline<S> {
    pub fn new(source: S, config: NeurofeedbackConfig) -> Result<Self, NeuroError> {
        let sample_rate_hz = source.sample_rate_hz();
        let tracker = BandPowerTracker::new(&config, sample_rate_hz, source.channel_count())?;
        let pull_size = config.shift_samples(sample_rate_hz);
        info!(
            "{} Hz, buffer {} samples, epoch {} samples, {} epochs smoothed, pull {} samples",
            sample_rate_hz,
            config.buffer_samples(sample_rate_hz),
            config.epoch_samples(sample_rate_hz),
            config.band_buffer_len(),
            pull_size
        );
        Ok(Self {
            source,
            tracker,
            config,
            pull_size,
            consecutive_failures: 0,
        })
    }
    pub fn config(&self) -> &NeurofeedbackConfig {
        &self.config
    }
    pub fn tracker(&self) -> &BandPowerTracker {
        &self.tracker
    }
    /// Failed pulls since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
    /// One blocking pull plus processing. `Ok(None)` once the source has ended.
    /// A failed pull is processed as an empty chunk after waiting out the pull
    /// timeout, so a dead source cannot spin the loop.
    pub fn pump_once(
        &mut self,
        trigger: &mut dyn ActionTrigger,
    ) -> Result<Option<Report>, NeuroError> {
        let chunk = match self
            .source
            .pull_chunk(self.config.pull_timeout(), self.pull_size)
        {
            Ok(Some(chunk)) => {
                if self.consecutive_failures > 0 {
                    info!("source recovered after {} failed pull(s)", self.consecutive_failures);
                    self.consecutive_failures = 0;
                }
                chunk
            }
            Ok(None) => return Ok(None),
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures % FAILURE_WARN_EVERY == 1 {
                    warn!(
                        "{e}; treating as an empty chunk ({} failed in a row)",
                        self.consecutive_failures
                    );
                } else {
                    debug!("{e}; treating as an empty chunk");
                }
                thread::sleep(self.config.pull_timeout());
                SignalChunk::default()
            }
        };
        self.tracker.process_chunk(&chunk, trigger).map(Some)
    }
    /// Loops until `cancel` is set or the source ends, handing every report
    /// to `sink`.
    pub fn run<F: FnMut(&Report)>(
        &mut self,
        trigger: &mut dyn ActionTrigger,
        cancel: &AtomicBool,
        mut sink: F,
    ) -> Result<RunSummary, NeuroError> {
        let mut summary = RunSummary::default();
        while !cancel.load(Ordering::SeqCst) {
            let Some(report) = self.pump_once(trigger)? else {
                info!("source ended");
                return Ok(summary);
            };
            summary.iterations += 1;
            summary.samples += report.chunk_len as u64;
            if report.blink {
                summary.blinks += 1;
            }
            if report.chunk_len == 0 {
                summary.empty_pulls += 1;
            }
            sink(&report);
        }
        info!("Closing!");
        Ok(summary)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::ManualSource;
    use crate::trigger::RecordingTrigger;
    use crate::types::Band;
    use std::f64::consts::PI;
    fn zero_chunks(count: usize, len: usize) -> Vec<SignalChunk> {
        (0..count)
            .map(|_| SignalChunk::single_channel(vec![0.0; len]))
            .collect()
    }
    #[test]
    fn silent_stream_settles_at_log_floor() {
        let config = NeurofeedbackConfig::default();
        let source = ManualSource::new(256, 1, zero_chunks(40, 50));
        let mut pipeline = NeurofeedbackPipeline::new(source, config.clone()).unwrap();
        let mut trigger = RecordingTrigger::default();
        let mut last = None;
        let cancel = AtomicBool::new(false);
        let summary = pipeline
            .run(&mut trigger, &cancel, |r| last = Some(r.clone()))
            .unwrap();
        assert_eq!(summary.iterations, 40);
        assert_eq!(summary.blinks, 0);
        assert_eq!(trigger.fired(), 0);
        let report = last.unwrap();
        let floor = config.log_floor.log10();
        for band in Band::ALL {
            assert!((report.smoothed.get(band) - floor).abs() < 1e-9);
            assert!((report.latest.get(band) - floor).abs() < 1e-9);
        }
        assert_eq!(pipeline.tracker().sample_buffer().capacity(), 256 * 5);
        assert_eq!(pipeline.tracker().smoothing().rows().len(), 21);
    }
    #[test]
    fn spike_chunk_fires_trigger() {
        let mut chunk = vec![0.0; 50];
        chunk[10] = 300.0;
        let source = ManualSource::new(256, 1, vec![SignalChunk::single_channel(chunk)]);
        let config = NeurofeedbackConfig {
            blink_threshold: 200.0,
            ..NeurofeedbackConfig::default()
        };
        let mut pipeline = NeurofeedbackPipeline::new(source, config).unwrap();
        let mut trigger = RecordingTrigger::default();
        let report = pipeline.pump_once(&mut trigger).unwrap().unwrap();
        assert!(report.blink);
        assert_eq!(report.signal_diff, Some(300.0));
        assert_eq!(trigger.fired(), 1);
        assert!(pipeline.pump_once(&mut trigger).unwrap().is_none());
    }
    #[test]
    fn consecutive_blink_chunks_each_fire() {
        let spike: Vec<f64> = (0..20).map(|n| if n % 2 == 0 { 0.0 } else { 250.0 }).collect();
        let chunks = vec![SignalChunk::single_channel(spike); 3];
        let source = ManualSource::new(256, 1, chunks);
        let mut pipeline = NeurofeedbackPipeline::new(source, NeurofeedbackConfig::default()).unwrap();
        let mut trigger = RecordingTrigger::default();
        let cancel = AtomicBool::new(false);
        let summary = pipeline.run(&mut trigger, &cancel, |_| {}).unwrap();
        assert_eq!(summary.blinks, 3);
        assert_eq!(trigger.fired(), 3);
    }
    #[test]
    fn empty_and_oversized_chunks_are_tolerated() {
        let chunks = vec![
            SignalChunk::empty(1),
            SignalChunk::single_channel(vec![1.0; 5000]),
            SignalChunk::empty(0),
        ];
        let source = ManualSource::new(256, 1, chunks);
        let mut pipeline = NeurofeedbackPipeline::new(source, NeurofeedbackConfig::default()).unwrap();
        let mut trigger = RecordingTrigger::default();
        let cancel = AtomicBool::new(false);
        let summary = pipeline.run(&mut trigger, &cancel, |_| {}).unwrap();
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.empty_pulls, 2);
        assert_eq!(summary.samples, 5000);
        assert_eq!(pipeline.tracker().sample_buffer().capacity(), 1280);
        assert_eq!(pipeline.tracker().sample_buffer().samples().len(), 1280);
    }
    struct FlakySource {
        failures_left: usize,
        chunks: ManualSource,
    }
    impl SignalSource for FlakySource {
        fn sample_rate_hz(&self) -> u32 {
            256
        }
        fn channel_count(&self) -> usize {
            1
        }
        fn pull_chunk(
            &mut self,
            timeout: std::time::Duration,
            max_samples: usize,
        ) -> Result<Option<SignalChunk>, NeuroError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(NeuroError::Source("device dropped".into()));
            }
            self.chunks.pull_chunk(timeout, max_samples)
        }
    }
    #[test]
    fn failed_pulls_count_as_empty_and_reset_on_recovery() {
        let source = FlakySource {
            failures_left: 3,
            chunks: ManualSource::new(256, 1, zero_chunks(1, 10)),
        };
        let config = NeurofeedbackConfig {
            pull_timeout_s: 0.0,
            ..NeurofeedbackConfig::default()
        };
        let mut pipeline = NeurofeedbackPipeline::new(source, config).unwrap();
        let mut trigger = RecordingTrigger::default();
        for _ in 0..3 {
            let report = pipeline.pump_once(&mut trigger).unwrap().unwrap();
            assert_eq!(report.chunk_len, 0);
            assert!(!report.blink);
        }
        assert_eq!(pipeline.consecutive_failures(), 3);
        let report = pipeline.pump_once(&mut trigger).unwrap().unwrap();
        assert_eq!(report.chunk_len, 10);
        assert_eq!(pipeline.consecutive_failures(), 0);
        assert!(pipeline.pump_once(&mut trigger).unwrap().is_none());
    }
    #[test]
    fn failed_pull_waits_out_the_timeout() {
        let source = FlakySource {
            failures_left: 1,
            chunks: ManualSource::new(256, 1, Vec::new()),
        };
        let config = NeurofeedbackConfig {
            pull_timeout_s: 0.05,
            ..NeurofeedbackConfig::default()
        };
        let mut pipeline = NeurofeedbackPipeline::new(source, config).unwrap();
        let started = std::time::Instant::now();
        pipeline
            .pump_once(&mut RecordingTrigger::default())
            .unwrap()
            .unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_millis(50));
    }
    #[test]
    fn alpha_stream_raises_smoothed_alpha() {
        let fs = 256.0;
        let signal: Vec<f64> = (0..256 * 6)
            .map(|n| 30.0 * (2.0 * PI * 10.0 * n as f64 / fs).sin())
            .collect();
        let chunks: Vec<SignalChunk> = signal
            .chunks(51)
            .map(|c| SignalChunk::single_channel(c.to_vec()))
            .collect();
        let source = ManualSource::new(256, 1, chunks);
        let mut pipeline = NeurofeedbackPipeline::new(source, NeurofeedbackConfig::default()).unwrap();
        let mut trigger = RecordingTrigger::default();
        let cancel = AtomicBool::new(false);
        let mut last = None;
        pipeline
            .run(&mut trigger, &cancel, |r| last = Some(r.clone()))
            .unwrap();
        let smoothed = last.unwrap().smoothed;
        assert!(smoothed.alpha > smoothed.delta);
        assert!(smoothed.alpha > smoothed.theta);
        assert!(smoothed.alpha > smoothed.beta);
    }
    #[test]
    fn cancelled_run_stops_before_pulling() {
        let source = ManualSource::new(256, 1, zero_chunks(5, 10));
        let mut pipeline = NeurofeedbackPipeline::new(source, NeurofeedbackConfig::default()).unwrap();
        let cancel = AtomicBool::new(true);
        let summary = pipeline
            .run(&mut RecordingTrigger::default(), &cancel, |_| {})
            .unwrap();
        assert_eq!(summary.iterations, 0);
    }
    #[test]
    fn selects_configured_channel() {
        let chunk = SignalChunk {
            samples: vec![vec![0.0; 8], vec![0.0, 500.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]],
            timestamps: Vec::new(),
        };
        let config = NeurofeedbackConfig {
            channel_index: 1,
            ..NeurofeedbackConfig::default()
        };
        let mut tracker = BandPowerTracker::new(&config, 256, 2).unwrap();
        let report = tracker
            .process_chunk(&chunk, &mut RecordingTrigger::default())
            .unwrap();
        assert!(report.blink);
    }
    #[test]
    fn rejects_missing_channel() {
        let source = ManualSource::new(256, 4, Vec::new());
        let config = NeurofeedbackConfig {
            channel_index: 4,
            ..NeurofeedbackConfig::default()
        };
        let err = NeurofeedbackPipeline::new(source, config).err().unwrap();
        assert!(matches!(
            err,
            NeuroError::ChannelOutOfRange {
                index: 4,
                available: 4
            }
        ));
    }
}
