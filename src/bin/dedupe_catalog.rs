//! Build the deduplicated catalog cache without touching any API.
//!
//! Usage: dedupe-catalog [Last.fm_data.csv] [lastfm_data_unique.csv] [--force]
//!
//! With --force an existing cache is rebuilt from the raw export.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;

use preview_datasets::catalog::{build_catalog, write_cache};
use preview_datasets::config::{DEFAULT_CATALOG_CACHE, DEFAULT_RAW_CATALOG};
use preview_datasets::progress::format_duration;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let force = args.iter().any(|a| a == "--force");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let raw = PathBuf::from(positional.first().map_or(DEFAULT_RAW_CATALOG, |s| s.as_str()));
    let cache = PathBuf::from(positional.get(1).map_or(DEFAULT_CATALOG_CACHE, |s| s.as_str()));

    if cache.exists() && !force {
        println!("{:?} already exists (use --force to rebuild)", cache);
        return Ok(());
    }

    let start = Instant::now();
    let (entries, stats) = build_catalog(&raw)?;
    write_cache(&cache, &entries).context("Failed to write catalog cache")?;

    println!("\n{:=<60}", "");
    println!("Catalog deduplicated!");
    println!("  Raw rows: {}", stats.raw_rows);
    println!("  Blank rows skipped: {}", stats.skipped_blank);
    println!("  Unique tracks: {}", stats.unique);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}
