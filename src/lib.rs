// src/lib.rs
pub mod brainflow;
pub mod config;
pub mod drivers;
pub mod trigger;
pub mod types;

pub use config::NeurofeedbackConfig;
pub use drivers::{NeuroError, NeurofeedbackPipeline, SignalSource};
pub use trigger::{ActionTrigger, KeyPressTrigger, LogTrigger};
pub use types::{Band, BandPowers, Report, RunSummary};
