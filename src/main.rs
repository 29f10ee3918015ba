use anyhow::Context;
use boxvote::config::{CONFIG_ENV, VoteConfig};
use boxvote::pipeline::{Pipeline, render_labels};
use boxvote::report::{RunReport, render_human};
use boxvote::sampling::{DEFAULT_SAMPLES_PER_VIDEO, sample_frames};
use clap::{ArgAction, Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::io::{IsTerminal, stderr, stdout};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Something went wrong while processing; partial output may exist
const EXIT_FAILURE: i32 = 1;
/// Bad configuration or arguments; nothing was processed
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(
    name = "boxvote",
    about = "Fuse object detections from several models into consensus labels",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Configuration file (defaults to $BOXVOTE_CONFIG, then the user config)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log more (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensemble every image of one or more videos
    Run(RunArgs),
    /// Fuse per-model detection files for a single image
    Fuse(FuseArgs),
    /// Copy a random sample of frames per video for review
    Sample(SampleArgs),
    /// Show or create the configuration file
    Config(ConfigArgs),
    /// Print the JSON schema of the run report
    Schema,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Video to process (repeatable, default: every video found)
    #[arg(long = "video", value_name = "NAME")]
    videos: Vec<String>,

    /// Model to include, in scan order (repeatable, replaces configured models)
    #[arg(long = "model", value_name = "NAME")]
    models: Vec<String>,

    /// Root of per-model detections
    #[arg(long, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Root for merged labels
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// IoU needed to join a cluster
    #[arg(long, value_name = "F")]
    iou: Option<f64>,

    /// Worker threads (0 = one per core)
    #[arg(long, value_name = "N")]
    jobs: Option<usize>,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct FuseArgs {
    /// Detection files, one per model, in scan order
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// IoU needed to join a cluster
    #[arg(long, value_name = "F")]
    iou: Option<f64>,

    /// Output merged detections as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct SampleArgs {
    /// Root holding one frame directory per video
    #[arg(long, value_name = "DIR")]
    frames: Option<PathBuf>,

    /// Destination root for the sampled frames
    #[arg(long, value_name = "DIR")]
    dest: Option<PathBuf>,

    /// Frames to keep per video
    #[arg(long, default_value_t = DEFAULT_SAMPLES_PER_VIDEO)]
    count: usize,

    /// Seed for a reproducible selection
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    /// Write a default configuration file
    #[arg(long, conflicts_with = "path")]
    init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    force: bool,

    /// Print where the configuration file lives
    #[arg(long)]
    path: bool,
}

fn config_location(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(env) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(env));
    }
    VoteConfig::config_file_path()
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<VoteConfig> {
    match explicit {
        Some(path) => VoteConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => VoteConfig::load().context("loading configuration"),
    }
}

fn validated(config: VoteConfig) -> Result<VoteConfig, i32> {
    match config.validate() {
        Ok(()) => Ok(config),
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            Err(EXIT_CONFIG)
        }
    }
}

fn run_pipeline(args: RunArgs, config_path: Option<&Path>, color: bool) -> Result<(), i32> {
    let mut config = load_config(config_path).map_err(|e| {
        eprintln!("Error: {:#}", e);
        EXIT_CONFIG
    })?;

    if !args.models.is_empty() {
        config.models.names = args.models;
    }
    if let Some(input) = args.input {
        config.paths.detections = input;
    }
    if let Some(output) = args.output {
        config.paths.output = output;
    }
    if let Some(iou) = args.iou {
        config.fusion.iou_threshold = iou;
    }
    if let Some(jobs) = args.jobs {
        config.runtime.jobs = jobs;
    }
    let config = validated(config)?;

    let pipeline = Pipeline::from_config(&config);
    info!(
        models = ?pipeline.models(),
        input = %config.paths.detections.display(),
        output = %config.paths.output.display(),
        "starting ensemble run"
    );

    let result = if args.videos.is_empty() {
        pipeline.run_all()
    } else {
        pipeline.run_videos(&args.videos)
    };
    let report = result.map_err(|e| {
        eprintln!("Error: {}", e);
        EXIT_FAILURE
    })?;

    print_report(&report, args.json, color)?;

    if report.has_failures() {
        Err(EXIT_FAILURE)
    } else {
        Ok(())
    }
}

fn print_report(report: &RunReport, json: bool, color: bool) -> Result<(), i32> {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {}", e);
                return Err(EXIT_FAILURE);
            }
        }
    } else {
        println!("{}", render_human(report, color));
    }
    Ok(())
}

fn run_fuse(args: FuseArgs, config_path: Option<&Path>) -> Result<(), i32> {
    let mut config = load_config(config_path).map_err(|e| {
        eprintln!("Error: {:#}", e);
        EXIT_CONFIG
    })?;
    if let Some(iou) = args.iou {
        config.fusion.iou_threshold = iou;
    }
    let config = validated(config)?;

    let outcome = Pipeline::from_config(&config)
        .fuse_sources(&args.files)
        .map_err(|e| {
            eprintln!("Error: {}", e);
            EXIT_FAILURE
        })?;

    if args.json {
        match serde_json::to_string_pretty(&outcome.merged) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: failed to serialize detections: {}", e);
                return Err(EXIT_FAILURE);
            }
        }
    } else {
        print!("{}", render_labels(&outcome.merged));
    }
    Ok(())
}

fn run_sample(args: SampleArgs, config_path: Option<&Path>) -> Result<(), i32> {
    let config = load_config(config_path).map_err(|e| {
        eprintln!("Error: {:#}", e);
        EXIT_CONFIG
    })?;
    let frames = args.frames.unwrap_or(config.paths.frames);
    let dest = args.dest.unwrap_or(config.paths.golden_set);

    let copied = sample_frames(&frames, &dest, args.count, args.seed).map_err(|e| {
        eprintln!("Error: {}", e);
        EXIT_FAILURE
    })?;

    for (video, count) in &copied {
        println!("{} = {}", video, count);
    }
    println!("sampled {} videos into {}", copied.len(), dest.display());
    Ok(())
}

fn run_config(args: ConfigArgs, config_path: Option<&Path>) -> Result<(), i32> {
    let location = config_location(config_path);

    if args.path {
        match location {
            Some(path) => println!("{}", path.display()),
            None => {
                eprintln!("Error: no configuration directory on this platform");
                return Err(EXIT_CONFIG);
            }
        }
        return Ok(());
    }

    if args.init {
        let Some(path) = location else {
            eprintln!("Error: no configuration directory on this platform, pass --config");
            return Err(EXIT_CONFIG);
        };
        if path.exists() && !args.force {
            eprintln!(
                "Error: {} already exists (use --force to overwrite)",
                path.display()
            );
            return Err(EXIT_CONFIG);
        }
        if let Err(e) = VoteConfig::default().save(&path) {
            eprintln!("Error: {}", e);
            return Err(EXIT_FAILURE);
        }
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config = load_config(config_path).map_err(|e| {
        eprintln!("Error: {:#}", e);
        EXIT_CONFIG
    })?;
    match config.to_toml() {
        Ok(s) => print!("{}", s),
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(EXIT_FAILURE);
        }
    }
    if let Err(e) = config.validate() {
        eprintln!("warning: {}", e);
    }
    Ok(())
}

fn run_schema() -> Result<(), i32> {
    let schema = schemars::schema_for!(RunReport);
    match serde_json::to_string_pretty(&schema) {
        Ok(s) => {
            println!("{}", s);
            Ok(())
        }
        Err(_) => Err(EXIT_FAILURE),
    }
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    // Mirror clap's parsing by stopping at `--` which terminates flags.
    let mut args = std::env::args_os();
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn init_tracing(verbose: u8, color: ColorChoice) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let use_json = std::env::var("BOXVOTE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(stderr))
            .with(env_filter)
            .init();
    } else {
        let ansi = stderr().is_terminal() && !matches!(color, ColorChoice::Never);
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(ansi)
                    .with_target(false)
                    .with_writer(stderr),
            )
            .with(env_filter)
            .init();
    }
}

fn main() {
    let color = detect_color_choice();
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    init_tracing(cli.verbose, color);
    let want_color = stdout().is_terminal() && !matches!(color, ColorChoice::Never);
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Some(Commands::Run(args)) => run_pipeline(args, config_path, want_color),
        Some(Commands::Fuse(args)) => run_fuse(args, config_path),
        Some(Commands::Sample(args)) => run_sample(args, config_path),
        Some(Commands::Config(args)) => run_config(args, config_path),
        Some(Commands::Schema) => run_schema(),
        None => Ok(()),
    };
    if let Err(code) = result {
        std::process::exit(code);
    }
}
