use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webpbin::config::{self, Config};
use webpbin::tool::{BinWrapper, Tool};
use webpbin::{CWebP, DWebP, Provisioner};

#[derive(Parser)]
#[command(name = "webpbin")]
#[command(about = "Encode and decode WebP with libwebp's cwebp and dwebp")]
#[command(long_about = "\
Encode and decode WebP with libwebp's cwebp and dwebp

The tools are downloaded from the official libwebp releases into the vendor
directory on first use, or taken from PATH on hosts without prebuilt
binaries.

Configuration (first match wins):
  WEBPBIN_SKIP_DOWNLOAD, WEBPBIN_DEST, WEBPBIN_VERSION environment variables
  webpbin.toml in the config directory
  built-in defaults

Run 'webpbin gen-config' to generate a documented webpbin.toml.")]
#[command(version)]
struct Cli {
    /// Directory containing webpbin.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress images to WebP
    Encode {
        /// Images to compress (any format cwebp reads)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (single input only)
        #[arg(short, long, conflicts_with = "out_dir", required_unless_present = "out_dir")]
        output: Option<PathBuf>,

        /// Write <stem>.webp for every input into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Compression factor 0-100 (default from config)
        #[arg(short, long)]
        quality: Option<u32>,

        /// Crop to a rectangle before compressing
        #[arg(long, num_args = 4, value_names = ["X", "Y", "WIDTH", "HEIGHT"])]
        crop: Option<Vec<u32>>,
    },
    /// Decompress a WebP file to PNG
    Decode {
        input: PathBuf,

        /// PNG file to write
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Download libwebp if needed and print the tool paths
    Fetch,
    /// Print the cwebp and dwebp versions
    Version,
    /// Print a stock webpbin.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Encode {
            inputs,
            output,
            out_dir,
            quality,
            crop,
        } => {
            let (config, provisioner) = setup(&cli.config_dir)?;
            let jobs = encode_jobs(inputs, output, out_dir.as_deref())?;
            let quality = quality.unwrap_or(config.encode.quality);
            let crop = crop.map(|c| [c[0], c[1], c[2], c[3]]);
            encode_all(&config, &provisioner, &jobs, quality, crop)?;
        }
        Command::Decode { input, output } => {
            let (_, provisioner) = setup(&cli.config_dir)?;
            DWebP::with_provisioner(provisioner)
                .input_file(&input)
                .output_file(&output)
                .run()?;
            println!("{} → {}", input.display(), output.display());
        }
        Command::Fetch => {
            let (_, provisioner) = setup(&cli.config_dir)?;
            for tool in Tool::ALL {
                println!("{tool}: {}", provisioner.resolve(tool)?.display());
            }
        }
        Command::Version => {
            let (_, provisioner) = setup(&cli.config_dir)?;
            for tool in Tool::ALL {
                let version = BinWrapper::new(tool)
                    .with_provisioner(Arc::clone(&provisioner))
                    .version()?;
                println!("{tool} {version}");
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Layered config plus a provisioner built from it.
fn setup(config_dir: &Path) -> Result<(Config, Arc<Provisioner>), config::ConfigError> {
    let config = config::load_config_with_env(config_dir)?;
    let provisioner = Arc::new(Provisioner::new(config.provision.clone()));
    Ok((config, provisioner))
}

/// Pair every input with its output path.
fn encode_jobs(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    out_dir: Option<&Path>,
) -> Result<Vec<(PathBuf, PathBuf)>, Box<dyn std::error::Error>> {
    match (output, out_dir) {
        (Some(output), _) => {
            if inputs.len() != 1 {
                return Err("--output takes exactly one input; use --out-dir for several".into());
            }
            Ok(inputs.into_iter().map(|i| (i, output.clone())).collect())
        }
        (None, Some(dir)) => {
            std::fs::create_dir_all(dir)?;
            Ok(inputs
                .into_iter()
                .map(|input| {
                    let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_owned();
                    name.push(".webp");
                    let out = dir.join(name);
                    (input, out)
                })
                .collect())
        }
        (None, None) => Err("either --output or --out-dir is required".into()),
    }
}

/// Encode on a pool sized by `processing.max_processes`.
///
/// Every input is attempted; the run fails if any of them did.
fn encode_all(
    config: &Config,
    provisioner: &Arc<Provisioner>,
    jobs: &[(PathBuf, PathBuf)],
    quality: u32,
    crop: Option<[u32; 4]>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Install once up front instead of racing the first jobs into the lock
    provisioner.resolve(Tool::CWebP)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config::effective_threads(&config.processing))
        .build()?;

    let results: Vec<_> = pool.install(|| {
        jobs.par_iter()
            .map(|(input, output)| {
                let mut enc = CWebP::with_provisioner(Arc::clone(provisioner));
                enc.input_file(input).output_file(output).quality(quality);
                if let Some([x, y, w, h]) = crop {
                    enc.crop(x, y, w, h);
                }
                enc.run()
            })
            .collect()
    });

    let mut failed = 0;
    for ((input, output), result) in jobs.iter().zip(results) {
        match result {
            Ok(()) => println!("{} → {}", input.display(), output.display()),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", input.display());
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} images failed", jobs.len()).into());
    }
    Ok(())
}
