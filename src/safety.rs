//! Safety checks run before any output is written.
//!
//! The datasets are appended to and renamed into place, so an output path
//! that points at the catalog export or its cache would destroy the input.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// File names that only ever belong to catalog inputs.
const SOURCE_PATTERNS: [&str; 2] = ["Last.fm_data", "lastfm_data_unique"];

/// Validates that an output path is safe to write.
///
/// Checks:
/// - Output filename must contain the required pattern (e.g., "dataset_")
/// - Output cannot be the same as any of the provided source paths
/// - Output cannot look like a catalog input file
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    let resolved_output = resolve(output);
    for source in source_paths {
        if output == *source || resolved_output == resolve(source) {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    for pattern in SOURCE_PATTERNS {
        if output_name.contains(pattern) {
            bail!(
                "Safety check failed: output '{}' matches catalog file pattern '{}'",
                output.display(),
                pattern
            );
        }
    }

    Ok(())
}

/// Canonical form of a path whose file may not exist yet: canonicalize the
/// parent directory when possible, keep the file name as given.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_valid_dataset_output() {
        let output = PathBuf::from("/tmp/train_sets/dataset_1.csv");
        let source = PathBuf::from("lastfm_datasets/Last.fm_data.csv");
        assert!(validate_output_path(&output, "dataset_", &[&source]).is_ok());
    }

    #[test]
    fn test_missing_pattern() {
        let output = PathBuf::from("/tmp/output.csv");
        let source = PathBuf::from("/data/source.csv");
        let result = validate_output_path(&output, "dataset_", &[&source]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must contain 'dataset_'"));
    }

    #[test]
    fn test_output_equals_source() {
        let path = PathBuf::from("/data/dataset_1.csv");
        let result = validate_output_path(&path, "dataset_", &[&path]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot be the same as source"));
    }

    #[test]
    fn test_output_equals_source_via_different_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sets");
        fs::create_dir(&nested).unwrap();
        let source = nested.join("dataset_cache.csv");
        let output = nested.join("..").join("sets").join("dataset_cache.csv");

        assert!(validate_output_path(&output, "dataset_", &[&source]).is_err());
    }

    #[test]
    fn test_catalog_pattern_blocked() {
        let output = PathBuf::from("/tmp/dataset_lastfm_data_unique.csv");
        let source = PathBuf::from("/data/other.csv");
        assert!(validate_output_path(&output, "dataset_", &[&source]).is_err());
    }
}
