//! mcaport - region file recompression
//!
//! Usage:
//!   mcaport decompress <input> <output>       - Store every chunk uncompressed
//!   mcaport compress <input> <output>         - Store every chunk zlib-compressed
//!   mcaport inspect <input>                   - Show what a region file holds
//!   mcaport convert-dir <dir> --scheme <s>    - Convert a directory tree in place
//!   mcaport config                            - Show or save the effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use mcaport::{
    batch::{self, Converter},
    chunk::CompressionScheme,
    config::{Config, ReadMode},
    region, Result,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mcaport")]
#[command(author = "mcaport Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convert region files between zlib and uncompressed chunk storage")]
struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Read input files block by block instead of loading them whole
    #[arg(long)]
    lazy: bool,

    /// Number of chunks converted concurrently
    #[arg(short, long)]
    workers: Option<usize>,

    /// zlib compression level (0-9)
    #[arg(short, long)]
    level: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a region file with every chunk uncompressed
    Decompress {
        /// Region file to read
        input: PathBuf,

        /// Where to write the converted region file
        output: PathBuf,
    },

    /// Rewrite a region file with every chunk zlib-compressed
    Compress {
        /// Region file to read
        input: PathBuf,

        /// Where to write the converted region file
        output: PathBuf,
    },

    /// Show chunk counts and schemes of a region file
    Inspect {
        /// Region file to read
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert every region file under a directory in place
    ConvertDir {
        /// Directory to convert (backed up while converting)
        dir: PathBuf,

        /// Target storage
        #[arg(long, value_enum)]
        scheme: TargetScheme,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the configuration file path
        #[arg(long)]
        save: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetScheme {
    /// zlib (scheme 2)
    Compress,
    /// Uncompressed (scheme 3)
    Decompress,
}

impl From<TargetScheme> for CompressionScheme {
    fn from(target: TargetScheme) -> Self {
        match target {
            TargetScheme::Compress => CompressionScheme::Zlib,
            TargetScheme::Decompress => CompressionScheme::Raw,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = load_config(&cli, &config_path);

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        config
            .as_ref()
            .ok()
            .and_then(|c| c.logging.level.parse::<Level>().ok())
            .unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let result = config.and_then(|config| run_command(cli.command, &config, &config_path));
    if let Err(e) = result {
        error!("Error: {}", e);
        if e.is_format_error() {
            error!("The input does not look like a valid region file");
        }
        std::process::exit(1);
    }
}

/// Config file (or defaults), environment, then command-line flags
fn load_config(cli: &Cli, path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path)?;

    if cli.lazy {
        config.transcode.read_mode = ReadMode::Lazy;
    }
    if let Some(workers) = cli.workers {
        config.transcode.workers = workers;
    }
    if let Some(level) = cli.level {
        config.transcode.compression_level = level;
    }

    config.validate()?;
    Ok(config)
}

fn run_command(command: Commands, config: &Config, config_path: &Path) -> Result<()> {
    match command {
        Commands::Decompress { input, output } => {
            cmd_convert(config, &input, &output, CompressionScheme::Raw)
        }

        Commands::Compress { input, output } => {
            cmd_convert(config, &input, &output, CompressionScheme::Zlib)
        }

        Commands::Inspect { input, json } => cmd_inspect(config, &input, json),

        Commands::ConvertDir { dir, scheme } => cmd_convert_dir(config, &dir, scheme.into()),

        Commands::Config { save } => cmd_config(config, config_path, save),
    }
}

fn cmd_convert(config: &Config, input: &Path, output: &Path, target: CompressionScheme) -> Result<()> {
    info!("Converting {} to {}...", input.display(), target);

    let converter = Converter::new(&config.transcode)?;
    let (before, after) = converter.convert_file(input, output, target)?;

    info!(
        "Wrote {} ({} -> {} bytes)",
        output.display(),
        before,
        after
    );
    Ok(())
}

fn cmd_inspect(config: &Config, input: &Path, json: bool) -> Result<()> {
    let mut reader = region::open(input, config.transcode.read_mode)?;
    let stats = region::inspect(reader.as_mut())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Region: {}", input.display());
    println!("=================");
    println!();
    println!("Size: {} bytes", stats.container_len);
    println!("Chunks present: {}", stats.present);
    println!("Chunks absent: {}", stats.absent);
    println!("Sectors used: {}", stats.sectors);
    for (scheme, count) in &stats.schemes {
        let name = match CompressionScheme::try_from(*scheme) {
            Ok(known) => known.to_string(),
            Err(_) => "unsupported".to_string(),
        };
        println!("Scheme {} ({}): {} chunks", scheme, name, count);
    }

    Ok(())
}

fn cmd_convert_dir(config: &Config, dir: &Path, target: CompressionScheme) -> Result<()> {
    info!("Converting region files under {} to {}...", dir.display(), target);

    let report = batch::convert_tree(dir, target, config)?;

    println!(
        "Converted {} region files ({} other files skipped)",
        report.converted, report.skipped
    );
    println!("Size: {} -> {} bytes", report.bytes_before, report.bytes_after);
    Ok(())
}

fn cmd_config(config: &Config, config_path: &Path, save: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        config.save(config_path)?;
        info!("Configuration saved to {}", config_path.display());
    }

    if !save && !config_path.exists() {
        println!();
        println!(
            "No configuration file at {} (use --save to create it)",
            config_path.display()
        );
    }

    Ok(())
}
