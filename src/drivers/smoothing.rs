use ndarray::{Array2, Axis};
use crate::drivers::buffer::RollingBuffer;
use crate::types::{BandPowers, BAND_COUNT};
/// Recent band-power vectors with a running column mean.
///
/// Starts with `capacity` zero rows and averages over all of them, so the
/// mean is pulled toward zero until `capacity` epochs have been pushed.
pub struct SmoothingBuffer {
    rows: RollingBuffer<BandPowers>,
}
impl SmoothingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: RollingBuffer::filled(capacity),
        }
    }
    pub fn capacity(&self) -> usize {
        self.rows.capacity()
    }
    pub fn push(&mut self, row: BandPowers) {
        self.rows.update(&[row]);
    }
    pub fn rows(&self) -> &RollingBuffer<BandPowers> {
        &self.rows
    }
    pub fn mean(&self) -> BandPowers {
        let matrix = Array2::from_shape_fn((self.rows.len(), BAND_COUNT), |(row, col)| {
            self.rows
                .get(row)
                .map(|r| r.to_array()[col])
                .unwrap_or_default()
        });
        match matrix.mean_axis(Axis(0)) {
            Some(mean) => BandPowers::from_array([mean[0], mean[1], mean[2], mean[3]]),
            None => BandPowers::default(),
        }
    }
}
