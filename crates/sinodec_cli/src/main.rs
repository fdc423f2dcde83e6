//! sinodec: restore OPT projection directories from the command line.
//!
//! - `sinodec shift <DIR>` prints the centering shift of one slice
//! - `sinodec restore <DIR> -o <OUT>` corrects a slice range and writes
//!   16-bit projections
//! - `sinodec config` prints the effective configuration as JSON
//!
//! Logging goes through `env_logger` (`RUST_LOG`, default `info`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use sinodec_core::orchestration::resolve_shift;
use sinodec_core::{
    assemble_sinogram, read_drift_csv, DriftCorrectedSource, ImageSource, LogProgress,
    OutOfCoreVolumePipeline, PipelineConfig, ScanLog, ShiftMode, TiffDirectorySource,
    TiffProjectionSink,
};

/// Output name prefix when no scan log names the run.
const DEFAULT_PREFIX: &str = "proj_";

#[derive(Parser)]
#[command(name = "sinodec")]
#[command(about = "Sinogram restoration for optical projection tomography")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON pipeline configuration (missing keys take defaults)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Scanner log providing pixel size and rotation range
    #[arg(long)]
    scan_log: Option<PathBuf>,

    /// Wiener regularization
    #[arg(long)]
    noise_level: Option<f64>,

    /// Median window of the wavelet suppressor
    #[arg(long)]
    sigma: Option<usize>,

    /// Fixed centering shift instead of auto-detection
    #[arg(long, allow_hyphen_values = true)]
    shift: Option<i32>,

    /// Skip spectral deconvolution
    #[arg(long)]
    no_deconvolution: bool,

    /// Skip wavelet artifact removal
    #[arg(long)]
    no_artifact_removal: bool,
}

#[derive(Args)]
struct ScanArgs {
    /// Directory with the projection TIFFs (`*_0*.tif`)
    input: PathBuf,

    /// Per-projection drift table (CSV with Y1/Y2 columns)
    #[arg(long)]
    drift: Option<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the centering shift of one slice
    Shift {
        #[command(flatten)]
        scan: ScanArgs,

        /// Slice (detector row) to inspect
        #[arg(long, default_value_t = 0)]
        slice: usize,
    },

    /// Restore a slice range and write corrected 16-bit projections
    Restore {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output directory for the corrected projections
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// File name prefix (default: scan log name, else `proj_`)
        #[arg(long)]
        prefix: Option<String>,

        /// First slice to process
        #[arg(long)]
        low: Option<usize>,

        /// One past the last slice to process
        #[arg(long)]
        high: Option<usize>,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            PipelineConfig::from_json_str(&text)?
        }
        None => PipelineConfig::default(),
    };

    if let Some(path) = &args.scan_log {
        ScanLog::from_path(path)?.apply(&mut config);
    }
    if let Some(noise) = args.noise_level {
        config.noise_level = noise;
    }
    if let Some(sigma) = args.sigma {
        config.sigma = sigma;
    }
    if let Some(shift) = args.shift {
        config.shift = ShiftMode::Override(shift);
    }
    config.apply_deconvolution &= !args.no_deconvolution;
    config.apply_artifact_removal &= !args.no_artifact_removal;

    config.validate()?;
    Ok(config)
}

/// Open the projection directory, wrapped in drift correction when a table
/// is given, and hand it to `f`.
fn with_source<T>(
    scan: &ScanArgs,
    f: impl FnOnce(&dyn ImageSource<f32>) -> Result<T>,
) -> Result<T> {
    let tiffs = TiffDirectorySource::open(&scan.input)?;
    match &scan.drift {
        Some(path) => {
            let drift = read_drift_csv(path)?;
            let corrected = DriftCorrectedSource::<f32, _>::new(&tiffs, drift)?;
            f(&corrected)
        }
        None => f(&tiffs),
    }
}

fn run_shift(scan: &ScanArgs, slice: usize) -> Result<()> {
    let config = load_config(&scan.config)?;
    let shift = with_source(scan, |source| {
        let sinogram = assemble_sinogram(source, slice)?;
        Ok(resolve_shift(sinogram.view(), &config)?)
    })?;
    info!("slice {slice}: centering shift {shift}");
    println!("{shift}");
    Ok(())
}

fn output_prefix(prefix: Option<&str>, scan_log: Option<&Path>) -> String {
    prefix
        .map(str::to_string)
        .or_else(|| {
            scan_log
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string())
}

fn run_restore(
    scan: &ScanArgs,
    output: &Path,
    prefix: Option<&str>,
    low: Option<usize>,
    high: Option<usize>,
) -> Result<()> {
    let mut config = load_config(&scan.config)?;
    let scan_log = scan.config.scan_log.as_deref();
    let mut sink = TiffProjectionSink::new(output, output_prefix(prefix, scan_log))?;

    if let Some(path) = scan_log {
        if let Some(name) = path.file_name() {
            fs::copy(path, output.join(name))
                .with_context(|| format!("copying scan log {}", path.display()))?;
        }
    }

    let summary = with_source(scan, |source| {
        if low.is_some() || high.is_some() {
            config.slice_range = Some((low.unwrap_or(0), high.unwrap_or(source.slice_count())));
        }
        let pipeline = OutOfCoreVolumePipeline::new(config)?.with_observer(Arc::new(LogProgress));
        Ok(pipeline.run(source, &mut sink)?)
    })?;

    info!(
        "restored slices [{}, {}) into {} projections in {}",
        summary.slice_range.0,
        summary.slice_range.1,
        summary.projections,
        output.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Shift { scan, slice } => run_shift(scan, *slice),
        Commands::Restore {
            scan,
            output,
            prefix,
            low,
            high,
        } => run_restore(scan, output, prefix.as_deref(), *low, *high),
        Commands::Config { config } => {
            println!("{}", load_config(config)?.to_json_string()?);
            Ok(())
        }
    }
}
