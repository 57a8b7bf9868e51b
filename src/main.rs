use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chartpack::assets::{AssetKind, MissingAssetPolicy};
use chartpack::category::CategoryScheme;
use chartpack::compiler::{CompileOptions, Rotation, TargetFormat};
use chartpack::config::AppConfig;
use chartpack::pipeline::{AssetRoots, PipelineConfig, TrackPipeline};
use chartpack::runner::{BatchRunner, RunOptions};
use clap::{Args, Parser, Subcommand};

/// Exit code for runs that stop on an unrecovered error.
const EXIT_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "chartpack", version, about = "Rhythm-game chart library compiler")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every track folder under a source root into a distribution layout
    Compile(CompileArgs),

    /// List category schemes and their indices
    Schemes,
}

#[derive(Args)]
struct CompileArgs {
    /// Source root containing a `music` folder of track folders
    #[arg(short = 'p', long = "path")]
    source: PathBuf,

    /// Output root
    #[arg(short, long)]
    output: PathBuf,

    /// Audio root; without a value, the default root is used
    #[arg(short = 'm', long = "music", num_args = 0..=1, default_missing_value = "")]
    audio: Option<String>,

    /// Cover image root; without a value, the default root is used
    #[arg(short = 'c', long = "cover", num_args = 0..=1, default_missing_value = "")]
    image: Option<String>,

    /// Video root; without a value, the default root is used
    #[arg(short = 'b', long = "video", num_args = 0..=1, default_missing_value = "")]
    video: Option<String>,

    /// Target format: Simai, SimaiFes, Ma2_103, Ma2_104
    #[arg(short = 'f', long)]
    format: Option<TargetFormat>,

    /// Category scheme index (see `chartpack schemes`)
    #[arg(short = 'g', long = "category", allow_negative_numbers = true)]
    category: Option<i64>,

    /// Rotation: Clockwise90/180, Counterclockwise90/180, UpsideDown, LeftToRight
    #[arg(short = 'r', long)]
    rotate: Option<Rotation>,

    /// Overall shift in ticks (384 ticks = 1 measure)
    #[arg(short = 's', long, allow_negative_numbers = true)]
    shift: Option<i32>,

    /// Rate levels by decimal
    #[arg(short = 'd', long)]
    decimal: bool,

    /// Keep tracks with missing assets instead of marking them incomplete
    #[arg(short = 'i', long)]
    ignore: bool,

    /// Use the track id as folder name instead of `{id}_{sortName}`
    #[arg(short = 'n', long)]
    number: bool,

    /// Write a JSON log of compiled tracks
    #[arg(short = 'j', long)]
    json: bool,

    /// Zip each compiled track and remove its folder
    #[arg(short = 'z', long)]
    zip: bool,

    /// Write genre/version collection manifests
    #[arg(short = 'k', long)]
    collection: bool,

    /// What to do when a requested asset is missing
    #[arg(long, value_enum)]
    on_missing: Option<MissingAssetPolicy>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Schemes => {
            for scheme in CategoryScheme::ALL {
                println!("[{}] {}", scheme.index(), scheme);
            }
        }

        Commands::Compile(args) => {
            let format = match args.format {
                Some(f) => f,
                None => match &config.target_format {
                    Some(name) => name
                        .parse()
                        .map_err(anyhow::Error::msg)
                        .context("Invalid target_format in config")?,
                    None => TargetFormat::default(),
                },
            };

            let resolve = |kind, value: &Option<String>| {
                config.resolve_asset_root(kind, value.as_deref(), &args.source)
            };
            let assets = AssetRoots {
                audio: resolve(AssetKind::Audio, &args.audio),
                image: resolve(AssetKind::Image, &args.image),
                video: resolve(AssetKind::Video, &args.video),
            };

            let pipeline_config = PipelineConfig {
                output_root: args.output.clone(),
                scheme: CategoryScheme::from_index(args.category.or(config.category).unwrap_or(0)),
                assets,
                compile: CompileOptions {
                    format,
                    rotation: args.rotate,
                    shift_ticks: args.shift,
                    strict_decimal: args.decimal,
                },
                ignore_incomplete: args.ignore,
                id_folder_name: args.number,
                archive: args.zip,
                on_missing: args.on_missing.unwrap_or(config.on_missing_asset),
            };
            log::info!("Categorizing by {}", pipeline_config.scheme);

            let runner = BatchRunner::new(
                TrackPipeline::new(pipeline_config),
                RunOptions {
                    json_log: args.json,
                    collections: args.collection,
                },
            );
            let state = runner.run(&args.source).context("Compile failed")?;

            println!(
                "Compile complete: {} compiled, {} incomplete, {} failed, {} skipped, {} errors",
                state.compiled,
                state.incomplete,
                state.failed,
                state.skipped,
                state.errors.len()
            );
        }
    }

    Ok(())
}
