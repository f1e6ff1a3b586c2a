use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use scopestack_core::consts::{METADATA_CSV_FILE_NAME, RUN_LOG_FILE_NAME};
use scopestack_core::io::imagej::ImageJTiffWriter;
use scopestack_core::io::lut::Lut;
use scopestack_core::pipeline::config::{ConversionConfig, InstrumentChoice};
use scopestack_core::pipeline::{
    archive_folders, discover_folders, run_folders, CancelToken, FolderOutcome, FolderSummary,
    PipelineStage, ProgressReporter, RunLog,
};
use scopestack_core::stack::projection::Projection;

use crate::metadata_csv::append_metadata_csv;
use crate::summary::{print_conversion_plan, print_run_summary};

#[derive(Clone, Copy, ValueEnum)]
pub enum InstrumentArg {
    Auto,
    Bruker,
    Olympus,
    Flamingo,
}

impl From<InstrumentArg> for InstrumentChoice {
    fn from(arg: InstrumentArg) -> Self {
        match arg {
            InstrumentArg::Auto => Self::Auto,
            InstrumentArg::Bruker => Self::Bruker,
            InstrumentArg::Olympus => Self::Olympus,
            InstrumentArg::Flamingo => Self::Flamingo,
        }
    }
}

/// Options shared by `convert` and `inspect`.
#[derive(Args)]
pub struct AcquisitionArgs {
    /// Instrument that wrote the data (detected per folder by default)
    #[arg(long, value_enum)]
    pub instrument: Option<InstrumentArg>,

    /// Maximum-intensity projection along Z
    #[arg(long)]
    pub max: bool,

    /// Average-intensity projection along Z
    #[arg(long)]
    pub avg: bool,

    /// Data is single-plane (required for Bruker single-plane series)
    #[arg(long)]
    pub single_plane: bool,
}

impl AcquisitionArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut ConversionConfig) {
        if let Some(instrument) = self.instrument {
            config.instrument = instrument.into();
        }
        if self.max || self.avg {
            config.projection = Projection::from_flags(self.max, self.avg);
        }
        if self.single_plane {
            config.single_plane = true;
        }
    }
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Dataset root holding one subfolder per acquisition
    pub root: PathBuf,

    /// Convert only these subfolders of the root (repeatable)
    #[arg(long)]
    pub folder: Vec<String>,

    #[command(flatten)]
    pub acquisition: AcquisitionArgs,

    /// Skip reading acquisition metadata sidecars
    #[arg(long)]
    pub no_metadata: bool,

    /// Comma-separated channel ids in output order
    #[arg(long, value_delimiter = ',')]
    pub channel_order: Vec<u32>,

    /// Comma-separated display LUTs in output channel order
    #[arg(long = "lut", value_delimiter = ',')]
    pub luts: Vec<Lut>,

    /// Move converted folders into the archive directory
    #[arg(long)]
    pub archive: bool,

    /// Conversion config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: &ConvertArgs) -> Result<()> {
    let config = build_config(args)?;
    let root = &args.root;

    let folders = if args.folder.is_empty() {
        discover_folders(root)?
    } else {
        args.folder.iter().map(|name| root.join(name)).collect()
    };
    print_conversion_plan(root, &config, folders.len());

    let reporter = BarReporter::new(folders.len())?;
    let mut log = RunLog::new();
    let result = run_folders(
        root,
        &folders,
        &config,
        &ImageJTiffWriter,
        &reporter,
        &CancelToken::new(),
        &mut log,
    );
    reporter.bar.finish_and_clear();

    let output_dir = root.join(&config.output_dir_name);
    let summaries = match result {
        Ok(summaries) => summaries,
        Err(e) => {
            if output_dir.is_dir() {
                log.write(&output_dir.join(RUN_LOG_FILE_NAME))?;
            }
            return Err(e).context("Conversion run aborted");
        }
    };

    let bookkeeping = write_bookkeeping(root, &config, &summaries, &mut log);
    if let Err(e) = &bookkeeping {
        log.issue(format!("{e:#}"));
    }

    let log_path = output_dir.join(RUN_LOG_FILE_NAME);
    log.write(&log_path)
        .with_context(|| format!("Failed to write {}", log_path.display()))?;
    bookkeeping?;

    print_run_summary(&summaries, &log, &log_path);
    Ok(())
}

/// Metadata CSV and archiving; the run log is written afterwards either way.
fn write_bookkeeping(
    root: &Path,
    config: &ConversionConfig,
    summaries: &[FolderSummary],
    log: &mut RunLog,
) -> Result<()> {
    let csv_path = root
        .join(&config.output_dir_name)
        .join(METADATA_CSV_FILE_NAME);
    append_metadata_csv(&csv_path, summaries)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    if config.archive_sources {
        let processed = log.processed().to_vec();
        archive_folders(root, &processed, log).context("Failed to archive folders")?;
    }
    Ok(())
}

fn build_config(args: &ConvertArgs) -> Result<ConversionConfig> {
    let mut config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid conversion config")?
    } else {
        ConversionConfig::default()
    };

    args.acquisition.apply(&mut config);
    if args.no_metadata {
        config.extract_metadata = false;
    }
    if !args.channel_order.is_empty() {
        config.channel_order = Some(args.channel_order.clone());
    }
    if !args.luts.is_empty() {
        config.luts = args.luts.clone();
    }
    if args.archive {
        config.archive_sources = true;
    }

    config.validate()?;
    Ok(config)
}

/// Folder-level progress bar; the stage shows as the bar message.
struct BarReporter {
    bar: ProgressBar,
    ok: Style,
    skipped: Style,
    failed: Style,
}

impl BarReporter {
    fn new(folders: usize) -> Result<Self> {
        let bar = ProgressBar::new(folders as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:24} [{bar:40}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        Ok(Self {
            bar,
            ok: Style::new().green(),
            skipped: Style::new().dim().yellow(),
            failed: Style::new().red().bold(),
        })
    }
}

impl ProgressReporter for BarReporter {
    fn begin_run(&self, folders: usize) {
        self.bar.set_length(folders as u64);
    }

    fn begin_folder(&self, name: &str) {
        self.bar.set_prefix(name.to_string());
    }

    fn begin_stage(&self, stage: PipelineStage, _total_items: Option<usize>) {
        self.bar.set_message(stage.to_string());
    }

    fn finish_folder(&self, name: &str, outcome: Result<&FolderOutcome, &str>) {
        let line = match outcome {
            Ok(FolderOutcome::Processed(summary)) => format!(
                "  {} {name} -> {}",
                self.ok.apply_to("converted"),
                summary.output.display()
            ),
            Ok(FolderOutcome::AlreadyExists { .. }) => {
                format!("  {} {name}", self.skipped.apply_to("exists   "))
            }
            Err(reason) => format!("  {} {name}: {reason}", self.failed.apply_to("failed   ")),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }
}
