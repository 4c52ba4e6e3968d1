// src/main.rs
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{info, warn};

use neurofeedback::brainflow::BrainFlowSource;
use neurofeedback::drivers::{SimulatedSource, SignalSource};
use neurofeedback::{
    ActionTrigger, KeyPressTrigger, LogTrigger, NeurofeedbackConfig, NeurofeedbackPipeline, Report,
};

const SIMULATED_RATE_HZ: u32 = 256;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    /// Synthetic headset with periodic blinks
    Sim,
    /// Live board through the BrainFlow board controller
    Brainflow,
}

#[derive(Parser)]
#[command(name = "neurofeedback", about = "Stream EEG band powers and detect blinks")]
struct Cli {
    /// JSON config file; flags below override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "sim")]
    source: SourceKind,

    /// BrainFlow board id (38 = Muse 2)
    #[arg(long)]
    board_id: Option<i32>,

    #[arg(long)]
    serial_port: Option<String>,

    /// Peak-to-peak blink threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Channel index to analyse
    #[arg(long)]
    channel: Option<usize>,

    /// Emit one JSON object per report instead of text
    #[arg(long)]
    json: bool,

    /// Disable the line-noise filter
    #[arg(long)]
    no_notch: bool,

    /// Press space on every blink (Windows only)
    #[arg(long)]
    key_press: bool,

    /// Seed for the simulated source
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

impl Cli {
    fn load_config(&self) -> Result<NeurofeedbackConfig> {
        let mut config = match &self.config {
            Some(path) => NeurofeedbackConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NeurofeedbackConfig::default(),
        };
        if let Some(board_id) = self.board_id {
            config.brainflow.board_id = board_id;
        }
        if let Some(port) = &self.serial_port {
            config.brainflow.serial_port = port.clone();
        }
        if let Some(threshold) = self.threshold {
            config.blink_threshold = threshold;
        }
        if let Some(channel) = self.channel {
            config.channel_index = channel;
        }
        if self.no_notch {
            config.notch = None;
        }
        Ok(config)
    }
}

fn open_source(kind: SourceKind, config: &NeurofeedbackConfig, seed: u64) -> Result<Box<dyn SignalSource>> {
    let source: Box<dyn SignalSource> = match kind {
        SourceKind::Sim => Box::new(SimulatedSource::new(SIMULATED_RATE_HZ, seed)),
        SourceKind::Brainflow => Box::new(
            BrainFlowSource::connect(&config.brainflow, config.discovery_timeout())
                .context("Can't find EEG stream.")?,
        ),
    };
    Ok(source)
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("failed to encode report: {e}"),
        }
    } else {
        println!("{report}");
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let source = open_source(cli.source, &config, cli.seed)?;
    let mut pipeline = NeurofeedbackPipeline::new(source, config)?;
    let mut trigger: Box<dyn ActionTrigger> = if cli.key_press {
        Box::new(KeyPressTrigger::new())
    } else {
        Box::new(LogTrigger)
    };

    info!("Press Ctrl-C in the console to break the while loop.");
    let json = cli.json;
    let summary = pipeline.run(trigger.as_mut(), &cancel, |report| print_report(report, json))?;
    info!(
        "{} iteration(s), {} blink(s), {} sample(s), {} empty pull(s)",
        summary.iterations, summary.blinks, summary.samples, summary.empty_pulls
    );
    Ok(())
}
