//! Catalog loading and deduplication.
//!
//! The raw Last.fm export has one row per scrobble; the catalog keeps the
//! first row of each `artist_track` key and caches the result next to the
//! source so later runs skip the pass over the raw file.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::models::{CachedCatalogRow, CatalogEntry};
use crate::output::{finalize_partial, partial_path};
use crate::progress::create_spinner;

/// Raw export row. Only the two columns we key on are read.
#[derive(Debug, Deserialize)]
struct RawCatalogRow {
    #[serde(rename = "Artist")]
    artist: String,
    #[serde(rename = "Track")]
    track: String,
}

/// Counters from a raw catalog pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogStats {
    pub raw_rows: usize,
    pub skipped_blank: usize,
    pub unique: usize,
}

/// Load the deduplicated catalog, building and caching it if needed.
pub fn load_catalog(raw_path: &Path, cache_path: &Path) -> Result<Vec<CatalogEntry>> {
    if cache_path.exists() {
        let entries = read_cache(cache_path)?;
        println!(
            "Loaded {} unique tracks from cache {:?}",
            entries.len(),
            cache_path
        );
        return Ok(entries);
    }

    let (entries, stats) = build_catalog(raw_path)?;
    println!(
        "{} has {} unique tracks",
        raw_path.file_name().and_then(|n| n.to_str()).unwrap_or("catalog"),
        stats.unique
    );
    if stats.skipped_blank > 0 {
        eprintln!("Skipped {} rows with a blank artist or track", stats.skipped_blank);
    }

    write_cache(cache_path, &entries)?;
    Ok(entries)
}

/// Read and deduplicate the raw export without touching the cache.
pub fn build_catalog(raw_path: &Path) -> Result<(Vec<CatalogEntry>, CatalogStats)> {
    let (entries, skipped_blank) = read_raw_catalog(raw_path)?;
    let raw_rows = entries.len() + skipped_blank;
    let unique = dedupe(entries);
    let stats = CatalogStats {
        raw_rows,
        skipped_blank,
        unique: unique.len(),
    };
    Ok((unique, stats))
}

/// Read `Artist`/`Track` pairs from the raw export.
/// Returns the entries in file order and the number of blank rows skipped.
pub fn read_raw_catalog(path: &Path) -> Result<(Vec<CatalogEntry>, usize)> {
    let spinner = create_spinner("Reading raw catalog");

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open raw catalog {:?}", path))?;

    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for (line, row) in reader.deserialize::<RawCatalogRow>().enumerate() {
        // +2: header line, 1-based
        let row = row.with_context(|| format!("Bad catalog row at line {} of {:?}", line + 2, path))?;
        if row.artist.trim().is_empty() || row.track.trim().is_empty() {
            skipped += 1;
            continue;
        }
        // Keys are built from the raw strings; surrounding spaces are significant.
        entries.push(CatalogEntry::new(row.artist, row.track));
    }

    spinner.finish_with_message(format!("Read {} catalog rows", entries.len() + skipped));
    Ok((entries, skipped))
}

/// Keep the first entry for each `artist_track` key, preserving order.
pub fn dedupe(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.key()))
        .collect()
}

/// Write the cache atomically: a partial file is renamed into place once complete.
pub fn write_cache(path: &Path, entries: &[CatalogEntry]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create catalog cache directory {:?}", parent))?;
    }

    let tmp = partial_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to create catalog cache {:?}", tmp))?;
        for entry in entries {
            writer.serialize(CachedCatalogRow::from(entry))?;
        }
        writer.flush()?;
    }
    finalize_partial(path)?;

    println!("Wrote catalog cache {:?} ({} tracks)", path, entries.len());
    Ok(())
}

pub fn read_cache(path: &Path) -> Result<Vec<CatalogEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open catalog cache {:?}", path))?;

    reader
        .deserialize::<CachedCatalogRow>()
        .map(|row| {
            row.map(CatalogEntry::from)
                .with_context(|| format!("Bad row in catalog cache {:?}", path))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_raw(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("Last.fm_data.csv");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let entries = vec![
            CatalogEntry::new("A", "X"),
            CatalogEntry::new("B", "Y"),
            CatalogEntry::new("A", "X"),
            CatalogEntry::new("A", "Z"),
        ];
        let unique = dedupe(entries);
        assert_eq!(
            unique,
            vec![
                CatalogEntry::new("A", "X"),
                CatalogEntry::new("B", "Y"),
                CatalogEntry::new("A", "Z"),
            ]
        );
    }

    #[test]
    fn test_dedupe_uses_joined_key() {
        // "A_B" + "C" and "A" + "B_C" share the key "A_B_C"
        let unique = dedupe(vec![
            CatalogEntry::new("A_B", "C"),
            CatalogEntry::new("A", "B_C"),
        ]);
        assert_eq!(unique.len(), 1);
    }

    #[test]
    fn test_load_catalog_dedupes_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            "Username,Artist,Track,Album,Date,Time\n\
             u1,A,X,Al,01 Jan 2021,09:00\n\
             u2,A,X,Al,01 Jan 2021,09:05\n\
             u1,B,Y,Bl,02 Jan 2021,10:00\n",
        );
        let cache = dir.path().join("cache").join("lastfm_data_unique.csv");

        let entries = load_catalog(&raw, &cache).unwrap();
        assert_eq!(entries, vec![CatalogEntry::new("A", "X"), CatalogEntry::new("B", "Y")]);
        assert!(cache.exists());
        assert!(!partial_path(&cache).exists());

        let cached = fs::read_to_string(&cache).unwrap();
        assert_eq!(cached, "Artist,Track,artist_track\nA,X,A_X\nB,Y,B_Y\n");
    }

    #[test]
    fn test_load_catalog_prefers_existing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("lastfm_data_unique.csv");
        fs::write(&cache, "Artist,Track,artist_track\nC,Z,C_Z\n").unwrap();
        let missing_raw = dir.path().join("does-not-exist.csv");

        let entries = load_catalog(&missing_raw, &cache).unwrap();
        assert_eq!(entries, vec![CatalogEntry::new("C", "Z")]);
    }

    #[test]
    fn test_load_catalog_missing_raw_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_catalog(&dir.path().join("nope.csv"), &dir.path().join("cache.csv"));
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Failed to open raw catalog"));
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path(), "Artist,Track\nA,X\n,Y\nB,\n\"Sigur Rós\",\"Hoppípolla\"\n");

        let (entries, stats) = build_catalog(&raw).unwrap();
        assert_eq!(stats.raw_rows, 4);
        assert_eq!(stats.skipped_blank, 2);
        assert_eq!(stats.unique, 2);
        assert_eq!(entries[1], CatalogEntry::new("Sigur Rós", "Hoppípolla"));
    }

    #[test]
    fn test_whitespace_is_part_of_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path(), "Artist,Track\nA,X\n\"A \",X\n");

        let (entries, stats) = build_catalog(&raw).unwrap();
        assert_eq!(stats.unique, 2);
        assert_eq!(entries, vec![CatalogEntry::new("A", "X"), CatalogEntry::new("A ", "X")]);
    }

    #[test]
    fn test_cache_round_trips_quoted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("unique.csv");
        let entries = vec![CatalogEntry::new("Crosby, Stills & Nash", "Suite: \"Judy\"")];

        write_cache(&cache, &entries).unwrap();
        assert_eq!(read_cache(&cache).unwrap(), entries);
    }
}
