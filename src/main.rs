use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::process;
use tiles2pdf::{CompressionProfile, Downloader, HttpFetcher, PageUrlTemplate, PdfCompiler};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_BASE_URL: &str =
    "https://tile.loc.gov/storage-services/service/gmd/gmd382m/g3823m/g3823cm/gct00034/";
const DEFAULT_PATTERN: &str = "ca{page}.jp2";

#[derive(Parser)]
#[command(name = "tiles2pdf")]
#[command(about = "Download sequentially numbered page scans and compile them into a single PDF")]
#[command(version = "0.1.0")]
struct Args {
    /// Skip downloading and compile the images already in the output directory
    #[arg(long = "skip-download")]
    skip_download: bool,

    /// Directory for downloaded images
    #[arg(long = "output-dir", default_value = "downloaded_images")]
    output_dir: PathBuf,

    /// Output PDF filename
    #[arg(long = "output-pdf", default_value = "library_of_congress_images.pdf")]
    output_pdf: PathBuf,

    /// Maximum image dimension in pixels (larger images are downscaled)
    #[arg(long = "max-dimension", default_value = "2000", value_parser = parse_dimension)]
    max_dimension: u32,

    /// JPEG quality 1-100
    #[arg(long = "quality", default_value = "85", value_parser = parse_quality)]
    quality: u8,

    /// Base URL the page filenames are appended to
    #[arg(long = "base-url", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Page filename pattern; {page} is replaced with the zero-padded page number
    #[arg(long = "pattern", default_value = DEFAULT_PATTERN)]
    pattern: String,
}

fn parse_quality(s: &str) -> Result<u8, String> {
    let value = s.parse::<u8>().map_err(|_| "Not a number.".to_string())?;
    if !(1..=100).contains(&value) {
        return Err("Must be between 1 and 100.".to_string());
    }
    Ok(value)
}

fn parse_dimension(s: &str) -> Result<u32, String> {
    let value = s.parse::<u32>().map_err(|_| "Not a number.".to_string())?;
    if value == 0 {
        return Err("Must be a positive number.".to_string());
    }
    Ok(value)
}

async fn run(args: Args) -> Result<()> {
    if args.skip_download {
        info!(
            "Skipping download, using existing images in \"{}\"",
            args.output_dir.display().to_string().blue()
        );
    } else {
        let template = PageUrlTemplate::new(&args.base_url, &args.pattern)?;
        let fetcher = HttpFetcher::new()?;
        let downloader = Downloader::new(args.output_dir.clone(), template);
        let summary = downloader.run(&fetcher).await?;
        if summary.pages_saved == 0 {
            info!("No pages were downloaded; compilation will fail unless images already exist.");
        }
    }

    let profile = CompressionProfile::new(args.max_dimension, args.quality)?;
    let compiler = PdfCompiler::new(args.output_dir.clone(), profile);
    compiler
        .compile(&args.output_pdf)
        .await
        .with_context(|| {
            format!(
                "could not compile a PDF from '{}' (run without --skip-download to download images first)",
                args.output_dir.display()
            )
        })?;

    Ok(())
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::from_default_env().add_directive("tiles2pdf=info".parse().unwrap());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("{}", format!("Error: {:#}", e).red());
        process::exit(1);
    }
}
