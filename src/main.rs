use album_art_normalizer::config::{self, NormalizerConfig};
use album_art_normalizer::imaging::RustBackend;
use album_art_normalizer::normalize::{self, NormalizeOptions, NormalizeResult};
use album_art_normalizer::types::{self, OutputManifest};
use album_art_normalizer::{compress, output, scan};
use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Shared flags for commands that normalize covers.
#[derive(clap::Args, Clone)]
struct NormalizeArgs {
    /// Cover file or library directory
    path: PathBuf,

    /// Keep source files instead of deleting them once normalized
    #[arg(long)]
    keep_originals: bool,

    /// Disable the normalization cache and redo every cover
    #[arg(long)]
    no_cache: bool,

    /// Remove files left in the output directory by an earlier run
    #[arg(long)]
    clean: bool,
}

#[derive(Parser)]
#[command(name = "album-art-normalizer")]
#[command(about = "Normalize album art to square, size-bounded covers")]
#[command(long_about = "\
Normalize album art to square, size-bounded covers

Every .png/.jpg/.jpeg under the given path is inspected and planned:

  pass-through   square enough, in bounds, suitable format → moved unchanged
  resize only    square enough but larger than max_resolution → downsampled
  pad            not square → centered on a square canvas (opaque or transparent)
  format only    square PNG with no real transparency → re-encoded as JPEG

Outputs are written flat into the output directory and listed in
manifest.json. A second pass then compresses them: jpegoptim for JPEGs, and
a remote shrink service or a local pngquant+optipng pipeline for PNGs.

Settings are read from ./normalizer.toml (or --config).
Run 'album-art-normalizer gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Output directory
    #[arg(long, default_value = "_output", global = true)]
    output: PathBuf,

    /// Config file (default: ./normalizer.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize, then compress: the full pipeline
    Run(NormalizeArgs),
    /// Normalize covers and write manifest.json
    Normalize(NormalizeArgs),
    /// Compress the outputs listed in manifest.json
    Compress,
    /// Show what would happen to each cover without writing anything
    Check {
        /// Cover file or library directory
        path: PathBuf,
    },
    /// Print a stock normalizer.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Run(args) => {
            let config = resolve_config(cli.config.as_deref())?;
            println!("==> Pass 1: Normalizing {}", args.path.display());
            let result = run_normalize(&cli.output, &config, args)?;

            println!("==> Pass 2: Compressing → {}", cli.output.display());
            run_compress(&cli.output, &config, &result.manifest)?;
            println!("==> Done: {}", cli.output.display());
        }
        Command::Normalize(args) => {
            let config = resolve_config(cli.config.as_deref())?;
            println!("==> Normalizing {}", args.path.display());
            run_normalize(&cli.output, &config, args)?;
        }
        Command::Compress => {
            let config = resolve_config(cli.config.as_deref())?;
            let manifest = OutputManifest::load(&cli.output).map_err(|e| {
                format!(
                    "cannot read manifest in {}: {e} (run 'normalize' first)",
                    cli.output.display()
                )
            })?;
            println!("==> Compressing {}", cli.output.display());
            run_compress(&cli.output, &config, &manifest)?;
        }
        Command::Check { path } => {
            let config = resolve_config(cli.config.as_deref())?;
            println!("==> Checking {}", path.display());
            let sources = scan::discover(path, Some(&cli.output))?;
            scan::warn_collisions(&sources);
            let backend = RustBackend::new();
            let results: Vec<_> = sources
                .into_iter()
                .map(|source| {
                    let checked = normalize::check_file(&backend, &source, &config.thresholds);
                    (source, checked)
                })
                .collect();
            output::print_check_output(&results);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `-v` raises the default filter; `RUST_LOG` still wins.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

/// Explicit `--config` must exist; otherwise `./normalizer.toml` is optional.
fn resolve_config(explicit: Option<&Path>) -> Result<NormalizerConfig, config::ConfigError> {
    match explicit {
        Some(path) => config::load_config_file(path),
        None => config::load_config(Path::new(".")),
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn run_normalize(
    output_dir: &Path,
    config: &NormalizerConfig,
    args: &NormalizeArgs,
) -> Result<NormalizeResult, Box<dyn Error>> {
    let sources = scan::discover(&args.path, Some(output_dir))?;
    let removed = scan::prepare_output_dir(output_dir, args.clean, &sources)?;
    if removed > 0 {
        info!("removed {removed} files from {}", output_dir.display());
    }
    scan::warn_collisions(&sources);

    init_thread_pool(&config.processing);
    let mut options = NormalizeOptions::from_config(config);
    if args.keep_originals {
        options.delete_original = false;
    }
    options.use_cache = !args.no_cache;

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_normalize_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = normalize::normalize(&sources, output_dir, &options, Some(tx))?;
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;

    result.manifest.save(output_dir)?;
    output::print_normalize_summary(&result);
    Ok(result)
}

fn run_compress(
    output_dir: &Path,
    config: &NormalizerConfig,
    manifest: &OutputManifest,
) -> Result<(), Box<dyn Error>> {
    let dispatcher = compress::Dispatcher::from_config(config)?;
    let paths = manifest.paths(output_dir);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_compress_event(&event) {
                println!("{}", line);
            }
        }
    });
    let results = compress::compress_all(&dispatcher, &paths, Some(tx));
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;

    let pending = compress::still_pending(manifest, output_dir, &results);
    pending.save(output_dir)?;
    if !pending.is_empty() {
        info!(
            "{} outputs left in {} for the next run",
            pending.len(),
            types::MANIFEST_FILENAME
        );
    }

    output::print_compress_summary(&results);
    Ok(())
}
