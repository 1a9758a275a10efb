//! imaginairy-utils CLI - inspect devices, fetch weights, and prepare images

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use imaginairy_utils::{
    DeviceKind, Precision, RuntimeConfig, expand_mask, fit_image_within, get_device_name,
    image_to_tensor,
    imaging::set_image_log_dir,
    utils::{get_cached_url_path_in, load_safetensors, log_params, parse_dtype},
};

#[derive(Parser)]
#[command(name = "imaginairy-utils")]
#[command(author, version, about = "Helpers for candle image generation pipelines", long_about = None)]
struct Cli {
    /// JSON runtime configuration file
    #[arg(long, global = true, env = "IMAGINAIRY_CONFIG")]
    config: Option<PathBuf>,

    /// Device override (cpu, cuda, cuda:N, mps)
    #[arg(long, global = true, env = "IMAGINAIRY_DEVICE")]
    device: Option<String>,

    /// Precision mode
    #[arg(long, global = true, value_enum)]
    precision: Option<PrecisionMode>,

    /// Write intermediate images to this directory
    #[arg(long, global = true)]
    image_log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the selected compute device
    Device,

    /// Print the weights cache directory
    CacheDir,

    /// Resolve a weights URL to a local file, downloading it if needed
    Fetch {
        /// URL of the weights file
        url: String,
    },

    /// Fit an image within bounds, rounding sides down to multiples of 64
    Fit {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the resized image
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum width (defaults to the configured bound)
        #[arg(long)]
        max_width: Option<u32>,

        /// Maximum height (defaults to the configured bound)
        #[arg(long)]
        max_height: Option<u32>,
    },

    /// Grow (positive size) or shrink (negative size) an inpainting mask
    Mask {
        /// Input mask image
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the binarized mask
        #[arg(short, long)]
        output: PathBuf,

        /// Blur radius; the sign selects grow or shrink
        #[arg(long, default_value = "5", allow_hyphen_values = true)]
        size: f32,
    },

    /// Load a safetensors weights file (path or URL) and report its parameters
    Inspect {
        /// Weights path or URL
        weights: String,

        /// Load floating point tensors as this dtype (f32, f16, bf16)
        #[arg(long)]
        dtype: Option<String>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PrecisionMode {
    Autocast,
    Full,
}

impl From<PrecisionMode> for Precision {
    fn from(mode: PrecisionMode) -> Self {
        match mode {
            PrecisionMode::Autocast => Precision::Autocast,
            PrecisionMode::Full => Precision::Full,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("imaginairy_utils=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if cli.device.is_some() {
        config.device = cli.device.clone();
    }
    if let Some(precision) = cli.precision {
        config.precision = precision.into();
    }
    if cli.image_log_dir.is_some() {
        config.image_log_dir = cli.image_log_dir.clone();
    }
    if let Some(dir) = &config.image_log_dir {
        set_image_log_dir(dir)?;
    }

    match cli.command {
        Commands::Device => show_device(&config)?,
        Commands::CacheDir => println!("{}", config.cache_dir().display()),
        Commands::Fetch { url } => {
            let path = get_cached_url_path_in(&url, config.cache_dir()).await?;
            println!("{}", path.display());
        }
        Commands::Fit {
            input,
            output,
            max_width,
            max_height,
        } => {
            fit(
                &config,
                &input,
                &output,
                max_width.unwrap_or(config.max_width),
                max_height.unwrap_or(config.max_height),
            )?;
        }
        Commands::Mask {
            input,
            output,
            size,
        } => {
            let mask = image::open(&input)?;
            let expanded = expand_mask(&mask, size);
            expanded.save(&output)?;
            println!("Wrote mask to {:?}", output);
        }
        Commands::Inspect { weights, dtype } => inspect(&config, &weights, dtype.as_deref()).await?,
    }

    Ok(())
}

fn show_device(config: &RuntimeConfig) -> anyhow::Result<()> {
    let device = config.device()?;
    let kind = DeviceKind::of(&device);
    let scope = config.autocast(&device);

    println!("Device: {}", kind);
    println!("Name: {}", get_device_name(kind));
    println!(
        "Precision: {:?} (compute dtype {:?})",
        config.precision,
        scope.dtype()
    );
    Ok(())
}

fn fit(
    config: &RuntimeConfig,
    input: &Path,
    output: &Path,
    max_width: u32,
    max_height: u32,
) -> anyhow::Result<()> {
    let image = image::open(input)?;
    let (resized, w, h) = fit_image_within(&image, max_height, max_width)?;
    resized.save(output)?;

    let device = config.device()?;
    let scope = config.autocast(&device);
    let tensor = scope.cast(&image_to_tensor(&image::DynamicImage::ImageRgb8(resized), &device)?)?;

    println!(
        "Resized {}x{} -> {}x{} (tensor {:?}, {:?})",
        image.width(),
        image.height(),
        w,
        h,
        tensor.dims(),
        tensor.dtype()
    );
    Ok(())
}

async fn inspect(config: &RuntimeConfig, weights: &str, dtype: Option<&str>) -> anyhow::Result<()> {
    let path = if weights.starts_with("http://") || weights.starts_with("https://") {
        get_cached_url_path_in(weights, config.cache_dir()).await?
    } else {
        PathBuf::from(weights)
    };

    let device = config.device()?;
    let scope = config.autocast(&device);
    let dtype = dtype.map(parse_dtype).unwrap_or_else(|| scope.dtype());
    let tensors = load_safetensors(&path, &device, dtype)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| weights.to_string());
    let total = log_params(&name, tensors.values());

    println!("{}: {} tensors, {:.2} M params", name, tensors.len(), total as f64 * 1e-6);
    Ok(())
}
