use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multispec::config::PipelineConfig;
use multispec::core::dispatch::GdalCalcDispatcher;
use multispec::core::high_pass::{focal, focal_output_path};
use multispec::core::indices::{IndexBatch, IndexOutcome};
use multispec::core::pipeline::CorrectionPipeline;
use multispec::io::IndexCatalog;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration (JSON); built-in defaults when omitted
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Radiometric and atmospheric correction of a MUL/PAN delivery, then pansharpening
    Correct {
        /// Multispectral product folder
        #[arg(long)]
        mul: PathBuf,
        /// Panchromatic product folder
        #[arg(long)]
        pan: PathBuf,
        /// GeoJSON polygon to clip both products to
        #[arg(long)]
        aoi: Option<PathBuf>,
    },
    /// Spectral indices of a pansharpened image
    Indices {
        /// Pansharpened image
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
        /// Corrected multispectral image for the second NIR resolution
        #[arg(long)]
        alternate: Option<PathBuf>,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        /// Compute only these catalog keys
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },
    /// High-pass (focal) filter of a raster's first band
    Focal {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        /// Worker threads for the convolution
        #[arg(short, long)]
        threads: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Correct { mul, pan, aoi } => {
            let mut pipeline = CorrectionPipeline::from_config(config)?;
            let outputs = pipeline
                .correct_scene(&mul, &pan, aoi.as_deref())
                .with_context(|| format!("correcting {} / {}", mul.display(), pan.display()))?;
            println!("{}", outputs.pansharpened.display());
        }
        Command::Indices {
            image,
            alternate,
            output,
            only,
        } => {
            let catalog = match &config.indices.catalog {
                Some(path) => IndexCatalog::from_path(path)?,
                None => IndexCatalog::worldview3()?,
            };
            let catalog = if only.is_empty() { catalog } else { catalog.select(&only)? };
            std::fs::create_dir_all(&output)?;

            let mut dispatcher = GdalCalcDispatcher::new(config.tools.clone());
            let report = IndexBatch::new(&catalog, &config.indices)
                .run(&image, alternate.as_deref(), &output, &mut dispatcher)
                .with_context(|| format!("computing indices of {}", image.display()))?;

            for (key, outcome) in &report.entries {
                match outcome {
                    IndexOutcome::Computed { outputs } => {
                        for path in outputs {
                            println!("{}\t{}", key, path.display());
                        }
                    }
                    IndexOutcome::Skipped { reason } => println!("{}\tskipped: {}", key, reason),
                }
            }
        }
        Command::Focal { image, output, threads } => {
            let mut ctx = config.execution;
            if let Some(threads) = threads {
                ctx.threads = threads;
            }
            std::fs::create_dir_all(&output)?;
            let out_path = focal_output_path(&image, &output)?;
            focal(&image, &out_path, &ctx).with_context(|| format!("filtering {}", image.display()))?;
            println!("{}", out_path.display());
        }
    }

    Ok(())
}
