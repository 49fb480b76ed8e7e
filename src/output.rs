//! CSV output helpers shared by the catalog cache and both datasets.
//!
//! Datasets are written without a header, one flushed record per row, so an
//! interrupted run leaves at most one truncated line at the end of the file.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::models::PrimaryRow;

/// `dataset_1.csv` -> `dataset_1.csv.partial`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Move a completed partial file into its final place.
pub fn finalize_partial(path: &Path) -> Result<()> {
    let partial = partial_path(path);
    fs::rename(&partial, path)
        .with_context(|| format!("Failed to move {:?} to {:?}", partial, path))
}

/// Cut a trailing line that lacks its newline (crash mid-write).
/// Returns the number of bytes removed.
pub fn trim_partial_tail(path: &Path) -> Result<u64> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    if bytes.last().map_or(true, |&b| b == b'\n') {
        return Ok(0);
    }

    let keep = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?} for truncation", path))?;
    file.set_len(keep as u64)?;
    Ok((bytes.len() - keep) as u64)
}

/// Append-mode, headerless writer. Flexible so rows may differ in width.
pub fn open_append_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?} for appending", path))?;

    Ok(csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(file))
}

fn headerless_reader(path: &Path) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {:?}", path))
}

/// Read dataset 1 (`artist,track,url`).
pub fn read_primary_rows(path: &Path) -> Result<Vec<PrimaryRow>> {
    let mut reader = headerless_reader(path)?;
    reader
        .deserialize::<PrimaryRow>()
        .enumerate()
        .map(|(idx, row)| row.with_context(|| format!("Bad row {} in {:?}", idx + 1, path)))
        .collect()
}

/// Number of records in a headerless CSV file.
pub fn count_rows(path: &Path) -> Result<usize> {
    let mut reader = headerless_reader(path)?;
    let mut record = csv::ByteRecord::new();
    let mut count = 0;
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Failed to read {:?}", path))?
    {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("train_sets/dataset_1.csv")),
            PathBuf::from("train_sets/dataset_1.csv.partial")
        );
    }

    #[test]
    fn test_trim_partial_tail_cuts_unterminated_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_2.csv");
        fs::write(&path, "u1,u2\nu3,u4\nu5,htt").unwrap();

        assert_eq!(trim_partial_tail(&path).unwrap(), 6);
        assert_eq!(fs::read_to_string(&path).unwrap(), "u1,u2\nu3,u4\n");
        assert_eq!(count_rows(&path).unwrap(), 2);
    }

    #[test]
    fn test_trim_partial_tail_leaves_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_2.csv");
        fs::write(&path, "u1,u2\n").unwrap();

        assert_eq!(trim_partial_tail(&path).unwrap(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "u1,u2\n");
    }

    #[test]
    fn test_trim_partial_tail_single_broken_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_1.csv.partial");
        fs::write(&path, "A,X,http").unwrap();

        trim_partial_tail(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_append_writer_accepts_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("dataset_2.csv");

        {
            let mut writer = open_append_writer(&path).unwrap();
            writer.write_record(["u1", "u2", "u3"]).unwrap();
            writer.write_record(["u4"]).unwrap();
            writer.flush().unwrap();
        }
        {
            let mut writer = open_append_writer(&path).unwrap();
            writer.write_record(["u5", "u6"]).unwrap();
            writer.flush().unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "u1,u2,u3\nu4\nu5,u6\n");
        assert_eq!(count_rows(&path).unwrap(), 3);
    }

    #[test]
    fn test_read_primary_rows_handles_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_1.csv");
        fs::write(&path, "\"Earth, Wind & Fire\",September,https://p/1\nA,X,https://p/2\n").unwrap();

        let rows = read_primary_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].artist, "Earth, Wind & Fire");
        assert_eq!(rows[1].url, "https://p/2");
    }
}
