use clap::{Parser, Subcommand};
use squarefit::config::{self, DEFAULT_CONFIG_FILE, FitConfig};
use squarefit::imaging::{self, Dimensions, ImageSource, OutputFormat};
use squarefit::output;
use std::path::{Path, PathBuf};

/// Limit overrides shared by commands that read the config.
#[derive(clap::Args, Clone)]
struct LimitArgs {
    /// Maximum output width in pixels
    #[arg(long)]
    width: Option<u32>,
    /// Maximum output height in pixels
    #[arg(long)]
    height: Option<u32>,
    /// Maximum encoded size in bytes
    #[arg(long)]
    bytes: Option<u32>,
}

#[derive(Parser)]
#[command(name = "squarefit")]
#[command(about = "Square-crop and compress images to fit size limits")]
#[command(long_about = "\
Square-crop and compress images to fit size limits

Decodes a source image with the smallest power-of-two subsample that fits the
pixel limits, crops it to a centered square, then shrinks and re-encodes it
until the output fits the byte limit.

Limits and encoder settings come from squarefit.toml (if present) and can be
overridden per run. Run 'squarefit gen-config' for a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Square-crop and compress an image to fit the limits
    Fit {
        /// Source image
        input: PathBuf,
        /// Output file (default: <input stem>-square.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Show source dimensions and the subsample the limits would pick
    Probe {
        /// Source image
        input: PathBuf,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Print a stock squarefit.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Fit {
            input,
            output: output_arg,
            format,
            limits,
        } => {
            let mut config = load_with_overrides(&cli.config, &limits)?;
            if let Some(format) = format {
                config.compression.format = format;
            }
            let constraints = config.constraints()?;
            let settings = config.fit_settings();
            let backend = config.backend();

            // A failed probe is not fatal: decode falls back to the OOM ladder.
            let natural = image::image_dimensions(&input)
                .ok()
                .map(|(width, height)| Dimensions::new(width, height));
            let source = ImageSource::File(input.clone());
            let resized =
                imaging::resize_and_compress(&backend, &source, natural, &constraints, &settings)?;

            let output_path =
                output_arg.unwrap_or_else(|| default_output_path(&input, settings.format));
            std::fs::write(&output_path, &resized.fit.bytes)?;
            output::print_fit_report(&input, &output_path, &resized, &constraints, settings.format);
        }
        Command::Probe { input, limits } => {
            let config = load_with_overrides(&cli.config, &limits)?;
            let constraints = config.constraints()?;
            let (width, height) = image::image_dimensions(&input)?;
            output::print_probe(&input, Dimensions::new(width, height), &constraints);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v` raises the default `warn` level.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_with_overrides(
    path: &Path,
    limits: &LimitArgs,
) -> Result<FitConfig, config::ConfigError> {
    let mut config = config::load_config(path)?;
    if let Some(width) = limits.width {
        config.limits.width = width;
    }
    if let Some(height) = limits.height {
        config.limits.height = height;
    }
    if let Some(bytes) = limits.bytes {
        config.limits.bytes = bytes;
    }
    config.validate()?;
    Ok(config)
}

fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}-square.{}", format.extension()))
}
