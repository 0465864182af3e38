use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use spectral_dominance_core::{
    AnalysisConfig, AppConfig, DominanceError, DominanceListener, DominancePipeline, RangeSeed,
    WavSource, WindowFunction,
};
use tracing_subscriber::EnvFilter;

fn main() -> spectral_dominance_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { input, analysis } => run_analyze(&input, &analysis),
        Commands::Live { seconds, analysis } => run_live(seconds, &analysis),
    }
}

fn run_analyze(input: &Path, args: &AnalysisArgs) -> spectral_dominance_core::Result<()> {
    let config = args.resolve()?;
    tracing::info!(?input, "analysing file");

    let mut pipeline = DominancePipeline::new(config)?;
    let path = input.to_path_buf();
    pipeline.start(
        move |config: &AnalysisConfig| WavSource::open(&path, config),
        Printer::new(args.json),
    )?;
    pipeline.join()?;

    let stats = pipeline.stats();
    tracing::info!(
        frames = stats.frames_processed,
        indeterminate = stats.indeterminate_frames,
        emitted = stats.values_emitted,
        "analysis finished"
    );
    Ok(())
}

fn run_live(seconds: Option<u64>, args: &AnalysisArgs) -> spectral_dominance_core::Result<()> {
    let config = args.resolve()?;
    tracing::info!(seconds, "starting live analysis");

    let mut pipeline = DominancePipeline::new(config)?;
    pipeline.start(open_live, Printer::new(args.json))?;

    if let Some(seconds) = seconds {
        std::thread::sleep(Duration::from_secs(seconds));
        pipeline.cancel();
    }
    pipeline.join()
}

#[cfg(feature = "live")]
fn open_live(
    config: &AnalysisConfig,
) -> spectral_dominance_core::Result<spectral_dominance_core::LiveSource> {
    spectral_dominance_core::LiveSource::open(config)
}

#[cfg(not(feature = "live"))]
fn open_live(
    _config: &AnalysisConfig,
) -> spectral_dominance_core::Result<spectral_dominance_core::ChunkSource> {
    Err(DominanceError::acquisition(
        "live capture is not compiled in; rebuild with `--features live`",
    ))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Writes one line per dominance index to stdout.
struct Printer {
    json: bool,
    index: u64,
}

#[derive(Serialize)]
struct Reading {
    index: u64,
    dominance_index: f32,
}

impl Printer {
    fn new(json: bool) -> Self {
        Self { json, index: 0 }
    }
}

impl DominanceListener for Printer {
    fn on_dominance_index(&mut self, value: f32) {
        if self.json {
            let reading = Reading {
                index: self.index,
                dominance_index: value,
            };
            match serde_json::to_string(&reading) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("failed to encode reading: {e}"),
            }
        } else {
            println!("{value:.2}");
        }
        self.index += 1;
    }

    fn on_failure(&mut self, error: &DominanceError) {
        tracing::error!("analysis aborted: {error}");
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live spectral dominance index analyser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse a WAV file and print one dominance index per frame.
    Analyze {
        /// WAV file recorded at the configured sample rate.
        input: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Analyse the default input device.
    Live {
        /// Stop after this many seconds instead of running until interrupted.
        #[arg(short, long)]
        seconds: Option<u64>,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// JSON configuration file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    sample_rate: Option<u32>,
    #[arg(long)]
    buffer_size: Option<usize>,
    #[arg(long)]
    overlap: Option<usize>,
    /// Minimum raw magnitude range for a frame to produce a value.
    #[arg(long)]
    threshold: Option<f32>,
    #[arg(long, value_enum)]
    window: Option<WindowArg>,
    /// Seed the magnitude range scan from zero instead of the first bin.
    #[arg(long)]
    zero_seed: bool,
    /// Print readings as JSON lines.
    #[arg(long)]
    json: bool,
}

impl AnalysisArgs {
    fn resolve(&self) -> spectral_dominance_core::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::info!(?path, "loading configuration");
                AppConfig::load(path)?.analysis
            }
            None => AnalysisConfig::default(),
        };

        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(overlap) = self.overlap {
            config.overlap = overlap;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(window) = self.window {
            config.window = window.into();
        }
        if self.zero_seed {
            config.range_seed = RangeSeed::Zero;
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WindowArg {
    Rectangular,
    Hann,
    Hamming,
}

impl From<WindowArg> for WindowFunction {
    fn from(value: WindowArg) -> Self {
        match value {
            WindowArg::Rectangular => WindowFunction::Rectangular,
            WindowArg::Hann => WindowFunction::Hann,
            WindowArg::Hamming => WindowFunction::Hamming,
        }
    }
}
