use std::collections::VecDeque;
use std::time::Duration;
use crate::drivers::NeuroError;
/// One pull worth of samples from a source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalChunk {
    pub samples: Vec<Vec<f64>>, // channels x samples
    pub timestamps: Vec<f64>,
}
impl SignalChunk {
    pub fn empty(channels: usize) -> Self {
        Self {
            samples: vec![Vec::new(); channels],
            timestamps: Vec::new(),
        }
    }
    pub fn single_channel(samples: Vec<f64>) -> Self {
        Self {
            samples: vec![samples],
            timestamps: Vec::new(),
        }
    }
    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }
    pub fn samples_per_channel(&self) -> usize {
        self.samples.first().map(|c| c.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.samples_per_channel() == 0
    }
    /// Samples of one channel; `None` when the chunk does not carry it.
    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.samples.get(index).map(|c| c.as_slice())
    }
}
/// Something that can be pulled for chunks of samples.
///
/// `pull_chunk` blocks for at most `timeout` and returns at most about
/// `max_samples` samples per channel; an empty chunk is a valid answer.
/// `Ok(None)` means the stream has ended.
pub trait SignalSource {
    fn sample_rate_hz(&self) -> u32;
    fn channel_count(&self) -> usize;
    fn pull_chunk(
        &mut self,
        timeout: Duration,
        max_samples: usize,
    ) -> Result<Option<SignalChunk>, NeuroError>;
}
impl<S: SignalSource + ?Sized> SignalSource for Box<S> {
    fn sample_rate_hz(&self) -> u32 {
        (**self).sample_rate_hz()
    }
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }
    fn pull_chunk(
        &mut self,
        timeout: Duration,
        max_samples: usize,
    ) -> Result<Option<SignalChunk>, NeuroError> {
        (**self).pull_chunk(timeout, max_samples)
    }
}
/// In-memory source useful for tests and deterministic playback. Chunks are
/// handed out exactly as queued, regardless of the size hint.
pub struct ManualSource {
    sample_rate_hz: u32,
    channel_count: usize,
    queue: VecDeque<SignalChunk>,
}
impl ManualSource {
    pub fn new(
        sample_rate_hz: u32,
        channel_count: usize,
        chunks: impl IntoIterator<Item = SignalChunk>,
    ) -> Self {
        Self {
            sample_rate_hz,
            channel_count,
            queue: chunks.into_iter().collect(),
        }
    }
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}
impl SignalSource for ManualSource {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
    fn channel_count(&self) -> usize {
        self.channel_count
    }
    fn pull_chunk(
        &mut self,
        _timeout: Duration,
        _max_samples: usize,
    ) -> Result<Option<SignalChunk>, NeuroError> {
        Ok(self.queue.pop_front())
    }
}
