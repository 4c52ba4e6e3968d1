use std::collections::VecDeque;
use log::warn;
use crate::drivers::filter::{FilterChain, FilterState};
/// Fixed-length drop-oldest buffer. Always holds exactly `capacity` items;
/// it starts pre-filled and every update evicts as many items as it inserts.
#[derive(Clone, Debug)]
pub struct RollingBuffer<T> {
    data: VecDeque<T>,
    capacity: usize,
}
impl<T: Clone + Default> RollingBuffer<T> {
    pub fn filled(capacity: usize) -> Self {
        Self::with_fill(capacity, T::default())
    }
}
impl<T: Clone> RollingBuffer<T> {
    pub fn with_fill(capacity: usize, fill: T) -> Self {
        let mut data = VecDeque::with_capacity(capacity);
        data.resize(capacity, fill);
        Self { data, capacity }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
    /// Appends `incoming` and drops the same number of items from the front.
    /// When `incoming` is longer than the buffer only its tail is kept.
    pub fn update(&mut self, incoming: &[T]) {
        if incoming.is_empty() {
            return;
        }
        if incoming.len() >= self.capacity {
            self.data.clear();
            self.data
                .extend(incoming[incoming.len() - self.capacity..].iter().cloned());
        } else {
            self.data.drain(..incoming.len());
            self.data.extend(incoming.iter().cloned());
        }
    }
    /// The newest `n` items, oldest first. Clamps to the whole buffer when
    /// `n` exceeds the capacity.
    pub fn last(&self, n: usize) -> Vec<T> {
        let take = if n > self.data.len() {
            warn!(
                "requested last {n} items from a buffer of {}; clamping",
                self.data.len()
            );
            self.data.len()
        } else {
            n
        };
        self.data.range(self.data.len() - take..).cloned().collect()
    }
}
/// Filters `chunk` (when a filter is given) and pushes it into `buffer`,
/// returning the filter state to carry into the next call.
pub fn update_buffer(
    buffer: &mut RollingBuffer<f64>,
    chunk: &[f64],
    filter: Option<&FilterChain>,
    state: FilterState,
) -> FilterState {
    match filter {
        Some(chain) => {
            let (filtered, state) = chain.process(chunk, state);
            buffer.update(&filtered);
            state
        }
        None => {
            buffer.update(chunk);
            state
        }
    }
}
/// Raw sample history of the analysed channel, with optional line-noise
/// filtering applied on the way in.
pub struct SampleBuffer {
    samples: RollingBuffer<f64>,
    filter: Option<FilterChain>,
    filter_state: FilterState,
}
impl SampleBuffer {
    pub fn new(capacity: usize, filter: Option<FilterChain>) -> Self {
        Self {
            samples: RollingBuffer::filled(capacity),
            filter,
            filter_state: FilterState::Uninitialized,
        }
    }
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }
    pub fn filter_state(&self) -> &FilterState {
        &self.filter_state
    }
    pub fn push_chunk(&mut self, chunk: &[f64]) {
        let state = std::mem::take(&mut self.filter_state);
        self.filter_state = update_buffer(&mut self.samples, chunk, self.filter.as_ref(), state);
    }
    /// The most recent `len` samples.
    pub fn epoch(&self, len: usize) -> Vec<f64> {
        self.samples.last(len)
    }
    pub fn samples(&self) -> &RollingBuffer<f64> {
        &self.samples
    }
}
