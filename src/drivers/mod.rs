// src/drivers/mod.rs
// 信号处理链：滤波 -> 缓冲 -> 频带功率 -> 平滑 / 眨眼检测
pub mod blink;
pub mod buffer;
pub mod error;
pub mod fft;
pub mod filter;
pub mod pipeline;
pub mod simulator;
pub mod smoothing;
pub mod source;
// 公开导出常用类型
pub use blink::{BlinkDetector, BlinkReading};
pub use buffer::{update_buffer, RollingBuffer, SampleBuffer};
pub use error::NeuroError;
pub use fft::{BandPowerEstimator, FrequencySpectrum};
pub use filter::{FilterChain, FilterKind, FilterState};
pub use pipeline::{BandPowerTracker, NeurofeedbackPipeline};
pub use simulator::SimulatedSource;
pub use smoothing::SmoothingBuffer;
pub use source::{ManualSource, SignalChunk, SignalSource};
