use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Instant;

use preview_datasets::catalog::load_catalog;
use preview_datasets::config::{
    load_env, LastFmConfig, PipelineConfig, SpotifyConfig, DEFAULT_CATALOG_CACHE,
    DEFAULT_CHUNK_SIZE, DEFAULT_NUM_SIMILAR, DEFAULT_OUTPUT_DIR, DEFAULT_RAW_CATALOG,
};
use preview_datasets::lastfm::LastFmClient;
use preview_datasets::pipeline::{build_primary_dataset, build_similarity_dataset, StageReport};
use preview_datasets::progress::{format_duration, set_log_only};
use preview_datasets::safety::validate_output_path;
use preview_datasets::spotify::SpotifyClient;

#[derive(Parser)]
#[command(name = "preview-datasets")]
#[command(about = "Build Spotify preview-URL datasets from a Last.fm listening export")]
struct Args {
    /// Number of similar tracks per row for second dataset (primary included)
    #[arg(short = 'n', long = "num_similar", default_value_t = DEFAULT_NUM_SIMILAR, value_parser = parse_positive)]
    num_similar: usize,

    /// Directory to save datasets
    #[arg(short = 'o', long = "output_dir", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Raw Last.fm export with Artist and Track columns
    #[arg(long, default_value = DEFAULT_RAW_CATALOG)]
    catalog: PathBuf,

    /// Deduplicated catalog, reused when present
    #[arg(long, default_value = DEFAULT_CATALOG_CACHE)]
    catalog_cache: PathBuf,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_positive)]
    chunk_size: usize,

    /// Read credentials from this file instead of .env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Hide progress bars; print periodic progress lines instead
    #[arg(long)]
    log_only: bool,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn print_stage(name: &str, path: &Path, report: &StageReport) {
    if report.skipped {
        println!("  {}: kept existing {:?}", name, path);
        return;
    }
    println!(
        "  {}: {} new rows, {} resumed, {} unresolved, {} without preview ({})",
        name,
        report.written,
        report.resumed_rows,
        report.unresolved,
        report.no_preview,
        format_duration(report.elapsed)
    );
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);

    let start = Instant::now();
    let config = PipelineConfig::new(&args.output_dir, args.num_similar, args.chunk_size);

    let sources = [args.catalog.as_path(), args.catalog_cache.as_path()];
    validate_output_path(&config.dataset_1_path(), "dataset_", &sources)?;
    validate_output_path(&config.dataset_2_path(), "dataset_", &sources)?;

    load_env(args.env_file.as_deref())?;
    let spotify = SpotifyClient::new(SpotifyConfig::from_env()?)?;
    let lastfm = LastFmClient::new(LastFmConfig::from_env()?)?;

    println!("Authenticating with Spotify");
    spotify
        .authenticate()
        .context("Spotify client-credentials exchange failed")?;
    println!("Last.fm user: {}", lastfm.username());

    let catalog = load_catalog(&args.catalog, &args.catalog_cache)?;

    let primary = build_primary_dataset(&config, &catalog, &spotify, &spotify)?;
    let similar = build_similarity_dataset(&config, &spotify, &spotify, &lastfm)?;

    println!("\n{:=<60}", "");
    println!("Datasets complete!");
    println!("  Catalog: {} unique tracks", catalog.len());
    print_stage("Dataset 1", &config.dataset_1_path(), &primary);
    print_stage("Dataset 2", &config.dataset_2_path(), &similar);
    println!("  Output: {:?}", config.output_dir);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}
