//! Batch pipeline: builds dataset 1 (one preview URL per catalog track) and
//! dataset 2 (each dataset 1 URL followed by its similar tracks' URLs).
//!
//! Every row is flushed as soon as it is known. Dataset 1 is written to a
//! `.partial` file and renamed when complete, so an existing `dataset_1.csv`
//! is always a finished dataset. Dataset 2 rows map 1:1 onto dataset 1 rows,
//! which is what makes resuming it a matter of counting rows.

use anyhow::{bail, Result};
use indicatif::ProgressBar;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::config::PipelineConfig;
use crate::models::{CatalogEntry, PreviewRecord, PrimaryRow, Resolution, SimilarityRecord};
use crate::output::{
    count_rows, finalize_partial, open_append_writer, partial_path, read_primary_rows,
    trim_partial_tail,
};
use crate::progress::{create_progress_bar, log_progress, log_warning};
use crate::services::{PreviewFetcher, SimilarityExpander, TrackResolver};

/// Counters for one pipeline stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageReport {
    /// Output already complete; nothing fetched.
    pub skipped: bool,
    /// Rows present from an earlier run.
    pub resumed_rows: usize,
    pub written: usize,
    pub unresolved: usize,
    pub no_preview: usize,
    pub elapsed: Duration,
}

impl StageReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Resolve one pair and fetch its preview.
/// `None` when the search service has no match (logged and counted).
fn preview_record<R, P>(
    entry: &CatalogEntry,
    resolver: &R,
    previews: &P,
    pb: &ProgressBar,
    report: &mut StageReport,
) -> Result<Option<PreviewRecord>>
where
    R: TrackResolver + ?Sized,
    P: PreviewFetcher + ?Sized,
{
    let id = match resolver.resolve(&entry.artist, &entry.track)? {
        Resolution::Resolved(id) => id,
        Resolution::Unresolved => {
            report.unresolved += 1;
            log_warning(
                pb,
                &format!("Could not find track id for {} - {}", entry.artist, entry.track),
            );
            return Ok(None);
        }
    };

    let preview_url = previews.preview_url(&id)?;
    if preview_url.is_none() {
        report.no_preview += 1;
        log_warning(
            pb,
            &format!("No preview URL for {} - {} ({})", entry.artist, entry.track, id),
        );
    }

    Ok(Some(PreviewRecord {
        artist: entry.artist.clone(),
        track: entry.track.clone(),
        preview_url,
    }))
}

/// Preview records for a batch of pairs, in input order.
/// Unresolved pairs are dropped; resolved pairs without a preview keep `preview_url: None`.
pub fn get_preview_urls<R, P>(
    pairs: &[CatalogEntry],
    resolver: &R,
    previews: &P,
    pb: &ProgressBar,
    report: &mut StageReport,
) -> Result<Vec<PreviewRecord>>
where
    R: TrackResolver + ?Sized,
    P: PreviewFetcher + ?Sized,
{
    let mut records = Vec::with_capacity(pairs.len());
    for entry in pairs {
        if let Some(record) = preview_record(entry, resolver, previews, pb, report)? {
            records.push(record);
        }
    }
    Ok(records)
}

// ============================================================================
// Dataset 1
// ============================================================================

/// Where an interrupted dataset 1 run left off.
struct ResumePoint {
    start_chunk: usize,
    done: FxHashSet<String>,
}

fn primary_resume_point(
    partial: &Path,
    catalog: &[CatalogEntry],
    chunk_size: usize,
) -> Result<ResumePoint> {
    let empty = ResumePoint {
        start_chunk: 0,
        done: FxHashSet::default(),
    };
    if !partial.exists() {
        return Ok(empty);
    }

    trim_partial_tail(partial)?;
    let rows = read_primary_rows(partial)?;
    let Some(last) = rows.last() else {
        return Ok(empty);
    };

    let last_key = last.key();
    let done: FxHashSet<String> = rows.iter().map(PrimaryRow::key).collect();
    let start_chunk = match catalog.iter().position(|e| e.key() == last_key) {
        Some(idx) => idx / chunk_size,
        None => {
            eprintln!(
                "Last row of {:?} ({} - {}) is not in the catalog; rescanning from the first chunk",
                partial, last.artist, last.track
            );
            0
        }
    };

    Ok(ResumePoint { start_chunk, done })
}

/// Build `dataset_1.csv`: `artist,track,url` for every catalog entry with a preview.
/// Skipped entirely when the file already exists.
pub fn build_primary_dataset<R, P>(
    config: &PipelineConfig,
    catalog: &[CatalogEntry],
    resolver: &R,
    previews: &P,
) -> Result<StageReport>
where
    R: TrackResolver + ?Sized,
    P: PreviewFetcher + ?Sized,
{
    let target = config.dataset_1_path();
    if target.exists() {
        println!("{:?} already exists, skipping dataset 1", target);
        return Ok(StageReport::skipped());
    }

    let start = Instant::now();
    let mut report = StageReport::default();
    let partial = partial_path(&target);
    let resume = primary_resume_point(&partial, catalog, config.chunk_size)?;
    report.resumed_rows = resume.done.len();

    let total_chunks = catalog.len().div_ceil(config.chunk_size) as u64;
    if report.resumed_rows > 0 {
        println!(
            "Resuming dataset 1 at chunk {}/{} ({} rows already written)",
            resume.start_chunk + 1,
            total_chunks,
            report.resumed_rows
        );
    } else {
        println!("Getting first dataset");
    }

    let mut writer = open_append_writer(&partial)?;
    let pb = create_progress_bar(total_chunks, "Getting dataset 1");
    pb.set_position(resume.start_chunk as u64);

    for (idx, chunk) in catalog
        .chunks(config.chunk_size)
        .enumerate()
        .skip(resume.start_chunk)
    {
        for entry in chunk {
            if resume.done.contains(&entry.key()) {
                continue;
            }
            let Some(record) = preview_record(entry, resolver, previews, &pb, &mut report)? else {
                continue;
            };
            if let Some(row) = PrimaryRow::from_record(record) {
                writer.serialize(&row)?;
                writer.flush()?;
                report.written += 1;
            }
        }
        pb.inc(1);
        log_progress("dataset 1", idx as u64 + 1, total_chunks, 1);
    }

    writer.flush()?;
    drop(writer);
    finalize_partial(&target)?;

    report.elapsed = start.elapsed();
    pb.finish_with_message(format!(
        "Dataset 1: {} rows ({} unresolved, {} without preview)",
        report.resumed_rows + report.written,
        report.unresolved,
        report.no_preview
    ));
    Ok(report)
}

// ============================================================================
// Dataset 2
// ============================================================================

/// Expand one dataset 1 row into its similarity record. Similar tracks are
/// resolved and fetched individually; nothing is cached between rows.
pub fn expand_row<R, P, S>(
    row: &PrimaryRow,
    limit: usize,
    resolver: &R,
    previews: &P,
    expander: &S,
    pb: &ProgressBar,
    report: &mut StageReport,
) -> Result<SimilarityRecord>
where
    R: TrackResolver + ?Sized,
    P: PreviewFetcher + ?Sized,
    S: SimilarityExpander + ?Sized,
{
    let mut record = SimilarityRecord::new(row.url.clone());
    if limit == 0 {
        return Ok(record);
    }

    let pairs: Vec<CatalogEntry> = expander
        .similar(&row.artist, &row.track, limit)?
        .into_iter()
        .take(limit)
        .map(|s| CatalogEntry::new(s.artist, s.track))
        .collect();

    record.similar_urls = get_preview_urls(&pairs, resolver, previews, pb, report)?
        .into_iter()
        .filter_map(|r| r.preview_url)
        .collect();
    Ok(record)
}

/// Build `dataset_2.csv` from `dataset_1.csv`, one row per dataset 1 row:
/// the primary URL followed by up to N-1 similar-track URLs.
pub fn build_similarity_dataset<R, P, S>(
    config: &PipelineConfig,
    resolver: &R,
    previews: &P,
    expander: &S,
) -> Result<StageReport>
where
    R: TrackResolver + ?Sized,
    P: PreviewFetcher + ?Sized,
    S: SimilarityExpander + ?Sized,
{
    let source = config.dataset_1_path();
    if !source.exists() {
        bail!("{:?} not found; dataset 1 must be built before dataset 2", source);
    }
    let rows = read_primary_rows(&source)?;

    let target = config.dataset_2_path();
    let already = if target.exists() {
        trim_partial_tail(&target)?;
        count_rows(&target)?
    } else {
        0
    };

    if already >= rows.len() && target.exists() {
        println!("{:?} already complete ({} rows), skipping dataset 2", target, already);
        return Ok(StageReport {
            skipped: true,
            resumed_rows: already,
            ..StageReport::default()
        });
    }

    let start = Instant::now();
    let mut report = StageReport {
        resumed_rows: already,
        ..StageReport::default()
    };

    if already > 0 {
        println!("Resuming dataset 2 at row {}/{}", already + 1, rows.len());
    } else {
        println!("Getting second dataset");
    }

    let limit = config.similar_limit();
    let total = rows.len() as u64;
    let mut writer = open_append_writer(&target)?;
    let pb = create_progress_bar(total, "Getting dataset 2");
    pb.set_position(already as u64);

    for (idx, row) in rows.iter().enumerate().skip(already) {
        let record = expand_row(row, limit, resolver, previews, expander, &pb, &mut report)?;
        writer.write_record(record.fields())?;
        writer.flush()?;
        report.written += 1;

        pb.inc(1);
        log_progress("dataset 2", idx as u64 + 1, total, config.chunk_size as u64);
    }

    report.elapsed = start.elapsed();
    pb.finish_with_message(format!(
        "Dataset 2: {} rows ({} similar tracks unresolved, {} without preview)",
        report.resumed_rows + report.written,
        report.unresolved,
        report.no_preview
    ));
    Ok(report)
}
