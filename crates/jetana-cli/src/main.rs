//! jetana CLI

mod cleanup;
mod config;
mod jobs;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use jetana_core::paths::{InputSelection, PathResolver};
use jetana_core::{AxisRange, Histogram};
use jetana_reduce::{
    Bound, GaussianFit, MomentsFit, ProjectionSpec, SliceFit, SliceFitConfig, fit_slices, project, project_range,
    ratio,
};
use jetana_root::{HistogramBackend, MmapBackend, Reader, RootFileWriter, StreamerBackend};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "jetana")]
#[command(about = "jetana - dijet histogram access, projection and JES/JER extraction")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// YAML/JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every object in a ROOT file, subdirectories included
    Inspect {
        /// Input ROOT file
        input: PathBuf,
    },

    /// Read one histogram and print it as JSON
    Read {
        /// Input ROOT file
        input: PathBuf,

        /// Object path (`dir/sub/name[;cycle]`)
        name: String,

        /// Which reader to use
        #[arg(long, value_enum, default_value = "auto")]
        backend: BackendChoice,

        /// Normalize to unit area before printing
        #[arg(long)]
        normalize: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Project a sparse histogram onto 1 to 3 axes
    Project {
        /// Input ROOT file
        input: PathBuf,

        /// Sparse object path
        name: String,

        /// Target axes, outermost first (e.g. `2,0`)
        #[arg(long, value_delimiter = ',', required = true)]
        targets: Vec<usize>,

        /// Cut `AXIS:LOW:HIGH` on a non-target axis; repeatable
        #[arg(long = "range", value_parser = parse_axis_range)]
        ranges: Vec<AxisRange>,

        /// Name of the projected histogram. Defaults to the object name.
        #[arg(long)]
        label: Option<String>,

        /// Also store the result in this ROOT file
        #[arg(long)]
        root_out: Option<PathBuf>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fit every x slice of a 2D histogram (JES/JER profiles)
    Slices {
        /// Input ROOT file
        input: PathBuf,

        /// 2D object path, or a sparse one together with `--targets`
        name: String,

        /// Project a sparse object onto these two axes first
        #[arg(long, value_delimiter = ',')]
        targets: Vec<usize>,

        /// Cut `AXIS:LOW:HIGH` applied with `--targets`; repeatable
        #[arg(long = "range", value_parser = parse_axis_range)]
        ranges: Vec<AxisRange>,

        /// Use per-slice mean/RMS instead of a Gaussian fit
        #[arg(long)]
        moments: bool,

        /// Skip slices with fewer entries
        #[arg(long, default_value = "0")]
        min_entries: f64,

        /// Refit within mean ± N sigma of the first fit
        #[arg(long)]
        fit_range_sigma: Option<f64>,

        /// Also store the profiles in this ROOT file
        #[arg(long)]
        root_out: Option<PathBuf>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Forward/backward ratio of two 1D histograms
    FbRatio {
        /// Input ROOT file
        input: PathBuf,

        /// Forward histogram path
        #[arg(long)]
        forward: String,

        /// Backward histogram path
        #[arg(long)]
        backward: String,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sum a range of x bins of a 2D histogram into a 1D histogram over y
    ProjectRange {
        /// Input ROOT file
        input: PathBuf,

        /// 2D object path
        name: String,

        /// Lower x bound (value, or bin number with `--bins`)
        #[arg(long, allow_negative_numbers = true)]
        low: Option<f64>,

        /// Upper x bound (value, or bin number with `--bins`)
        #[arg(long, allow_negative_numbers = true)]
        high: Option<f64>,

        /// Interpret `--low`/`--high` as ROOT bin numbers
        #[arg(long)]
        bins: bool,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compose the input file path for a set of analysis parameters
    Resolve {
        /// `embedding`, `pythia` or a data directory such as `exp`
        #[arg(long, default_value = "embedding")]
        category: String,

        /// `pgoing`, `Pbgoing` or `sum`
        #[arg(long, default_value = "sum")]
        direction: String,

        /// Pseudorapidity cut (×10)
        #[arg(long, default_value = "19")]
        eta_cut: i32,

        /// Jet-selection token
        #[arg(long, default_value = "jetId")]
        jet_selection: String,

        /// Systematics token
        #[arg(long)]
        systematics: Option<String>,

        /// Trigger token (required for experimental data)
        #[arg(long)]
        trigger: Option<String>,

        /// Base data directory (overrides config and JETANA_DATA_DIR)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Fail when the file does not exist
        #[arg(long)]
        check: bool,
    },

    /// Resubmit batch jobs whose error logs show a known failure
    Resubmit {
        /// Directory with `*.err` job logs
        #[arg(long)]
        log: PathBuf,

        /// Directory with the `.sub` submission files
        #[arg(long)]
        sub: PathBuf,

        /// Where submission files are copied to (overrides config)
        #[arg(long)]
        processing_dir: Option<PathBuf>,
    },

    /// Delete superseded files and copy the systematics file onto its targets
    Clean {
        /// Working directory
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Print version information
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendChoice {
    /// Memory-mapped reader, then streamer
    Auto,
    Mmap,
    Streamer,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).with_writer(std::io::stderr).init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { input } => cmd_inspect(&input),
        Commands::Read { input, name, backend, normalize, output } => {
            cmd_read(&input, &name, backend, normalize, output.as_ref())
        }
        Commands::Project { input, name, targets, ranges, label, root_out, output } => {
            let label = label.unwrap_or_else(|| leaf_name(&name).to_string());
            cmd_project(&input, &name, targets, ranges, &label, root_out.as_ref(), output.as_ref())
        }
        Commands::Slices {
            input,
            name,
            targets,
            ranges,
            moments,
            min_entries,
            fit_range_sigma,
            root_out,
            output,
        } => {
            let fit_config = SliceFitConfig { min_entries, fit_range_sigma };
            cmd_slices(&input, &name, targets, ranges, moments, &fit_config, root_out.as_ref(), output.as_ref())
        }
        Commands::FbRatio { input, forward, backward, output } => {
            cmd_fb_ratio(&input, &forward, &backward, output.as_ref())
        }
        Commands::ProjectRange { input, name, low, high, bins, output } => {
            let to_bound = |v: f64| if bins { Bound::Bin(v.round() as i64) } else { Bound::Value(v) };
            cmd_project_range(&input, &name, low.map(to_bound), high.map(to_bound), output.as_ref())
        }
        Commands::Resolve { category, direction, eta_cut, jet_selection, systematics, trigger, data_dir, check } => {
            let sel = InputSelection {
                category: &category,
                direction: &direction,
                eta_cut,
                jet_selection: &jet_selection,
                systematics: systematics.as_deref(),
                trigger: trigger.as_deref(),
            };
            cmd_resolve(&config, data_dir, &sel, check)
        }
        Commands::Resubmit { log, sub, processing_dir } => {
            let mut cfg = config.resubmit.clone();
            if let Some(dir) = processing_dir {
                cfg.processing_dir = dir;
            }
            let report = jobs::resubmit(&cfg, &log, &sub)?;
            write_json(None, serde_json::to_value(report)?)
        }
        Commands::Clean { dir } => {
            let report = cleanup::clean(&config.cleanup, &dir)?;
            write_json(None, serde_json::to_value(report)?)
        }
        Commands::Version => {
            println!("jetana {}", jetana_core::VERSION);
            Ok(())
        }
    }
}

fn parse_axis_range(s: &str) -> std::result::Result<AxisRange, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [axis, low, high] = parts.as_slice() else {
        return Err(format!("expected AXIS:LOW:HIGH, got '{}'", s));
    };
    let axis = axis.parse::<usize>().map_err(|e| format!("axis '{}': {}", axis, e))?;
    let low = low.parse::<f64>().map_err(|e| format!("low '{}': {}", low, e))?;
    let high = high.parse::<f64>().map_err(|e| format!("high '{}': {}", high, e))?;
    Ok(AxisRange::new(axis, low, high))
}

fn leaf_name(path: &str) -> &str {
    let leaf = path.rsplit('/').next().unwrap_or(path);
    leaf.split(';').next().unwrap_or(leaf)
}

fn cmd_inspect(input: &Path) -> Result<()> {
    let keys = jetana_root::list_keys(input).with_context(|| format!("list keys of {}", input.display()))?;
    let entries: Vec<serde_json::Value> = keys
        .iter()
        .map(|k| {
            serde_json::json!({
                "path": k.path,
                "class": k.class_name,
                "title": k.title,
                "cycle": k.cycle,
            })
        })
        .collect();
    tracing::info!("{} keys in {}", entries.len(), input.display());
    write_json(None, serde_json::Value::Array(entries))
}

fn cmd_read(
    input: &Path,
    name: &str,
    backend: BackendChoice,
    normalize: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    let h = match backend {
        BackendChoice::Auto => Reader::default().read(input, name),
        BackendChoice::Mmap => MmapBackend.read(input, name),
        BackendChoice::Streamer => StreamerBackend.read(input, name),
    }
    .with_context(|| format!("read '{}' from {}", name, input.display()))?;
    tracing::info!("read '{}' ({:?}, {} bins) via {}", h.name, h.kind, h.len(), h.source.as_str());
    let h = if normalize { h.normalize_to_unit_area() } else { h };
    write_json(output, serde_json::to_value(&h)?)
}

fn project_from_file(input: &Path, name: &str, targets: Vec<usize>, ranges: Vec<AxisRange>, label: &str) -> Result<Histogram> {
    let mut handle = jetana_root::read_sparse(input, name)
        .with_context(|| format!("read sparse '{}' from {}", name, input.display()))?;
    let spec = ProjectionSpec { targets, ranges };
    let h = project(&mut handle, &spec, label).with_context(|| format!("project '{}'", name))?;
    tracing::info!("projected '{}' onto {:?}: shape {:?}", name, spec.targets, h.shape());
    Ok(h)
}

fn cmd_project(
    input: &Path,
    name: &str,
    targets: Vec<usize>,
    ranges: Vec<AxisRange>,
    label: &str,
    root_out: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let h = project_from_file(input, name, targets, ranges, label)?;
    if let Some(path) = root_out {
        store(path, &[&h])?;
    }
    write_json(output, serde_json::to_value(&h)?)
}

#[allow(clippy::too_many_arguments)]
fn cmd_slices(
    input: &Path,
    name: &str,
    targets: Vec<usize>,
    ranges: Vec<AxisRange>,
    moments: bool,
    fit_config: &SliceFitConfig,
    root_out: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let h2 = if targets.is_empty() {
        if !ranges.is_empty() {
            bail!("--range needs --targets");
        }
        jetana_root::read(input, name).with_context(|| format!("read '{}' from {}", name, input.display()))?
    } else {
        project_from_file(input, name, targets, ranges, leaf_name(name))?
    };
    let fitter: Box<dyn SliceFit> = if moments { Box::new(MomentsFit) } else { Box::new(GaussianFit::default()) };
    let profiles = fit_slices(&h2, fitter.as_ref(), fit_config).with_context(|| format!("fit slices of '{}'", h2.name))?;
    if let Some(path) = root_out {
        store(path, &[&profiles.constant, &profiles.mean, &profiles.width, &profiles.chi2])?;
    }
    write_json(output, serde_json::to_value(&profiles)?)
}

fn cmd_fb_ratio(input: &Path, forward: &str, backward: &str, output: Option<&PathBuf>) -> Result<()> {
    let hs = jetana_root::load_histograms(input, &[forward, backward])?;
    let [f, b] = hs.as_slice() else {
        bail!("need both '{}' and '{}' in {}", forward, backward, input.display());
    };
    let r = ratio(f, b)?;
    write_json(output, serde_json::to_value(&r)?)
}

fn cmd_project_range(
    input: &Path,
    name: &str,
    low: Option<Bound>,
    high: Option<Bound>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let h2 = jetana_root::read(input, name).with_context(|| format!("read '{}' from {}", name, input.display()))?;
    let h = project_range(&h2, low, high)?;
    write_json(output, serde_json::to_value(&h)?)
}

fn cmd_resolve(config: &Config, data_dir: Option<PathBuf>, sel: &InputSelection<'_>, check: bool) -> Result<()> {
    let mut resolver_config = config.resolver.clone();
    if let Some(dir) = data_dir.or_else(|| config.data_dir.clone()) {
        resolver_config.base_dir = dir;
    }
    let resolver = PathResolver::new(resolver_config);
    let path = if check { resolver.resolve(sel)? } else { resolver.compose(sel)? };
    write_json(
        None,
        serde_json::json!({
            "path": path.display().to_string(),
            "exists": path.exists(),
        }),
    )
}

fn store(path: &Path, hists: &[&Histogram]) -> Result<()> {
    let mut writer = RootFileWriter::new().with_compression(1);
    for h in hists {
        writer.add_histogram(&h.name, h)?;
    }
    writer.write(path).with_context(|| format!("write {}", path.display()))?;
    tracing::info!("stored {} histogram(s) in {}", hists.len(), path.display());
    Ok(())
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
