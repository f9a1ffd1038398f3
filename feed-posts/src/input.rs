use crate::types::{FeedIdentifier, IngestError, Result};
use chrono::NaiveDate;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const INPUT_PREFIX: &str = "dids_and_paths_";
pub const INPUT_SUFFIX: &str = ".csv";

/// Read header-less `repository,record` rows into feed identifiers, in file order.
pub fn read_feed_identifiers(path: &Path) -> Result<Vec<FeedIdentifier>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    collect_identifiers(reader)
}

pub fn read_feed_identifiers_from<R: Read>(source: R) -> Result<Vec<FeedIdentifier>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);
    collect_identifiers(reader)
}

fn collect_identifiers<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<FeedIdentifier>> {
    let mut identifiers = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let repository = record.get(0).map(str::trim).unwrap_or_default();
        let path = record.get(1).map(str::trim).unwrap_or_default();

        if repository.is_empty() || path.is_empty() {
            return Err(IngestError::Malformed(format!(
                "input row {} needs a repository and a record identifier",
                row + 1
            )));
        }
        identifiers.push(FeedIdentifier::from_parts(repository, path));
    }

    debug!("Read {} feed identifiers", identifiers.len());
    Ok(identifiers)
}

/// Newest `dids_and_paths_<YYYYMMDD>.csv` in `dir`, by the date in its name.
pub fn latest_input_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut latest: Option<(NaiveDate, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stamp) = name
            .strip_prefix(INPUT_PREFIX)
            .and_then(|rest| rest.strip_suffix(INPUT_SUFFIX))
        else {
            continue;
        };

        match NaiveDate::parse_from_str(stamp, "%Y%m%d") {
            Ok(date) => {
                if latest.as_ref().map_or(true, |(best, _)| date > *best) {
                    latest = Some((date, path));
                }
            }
            Err(e) => warn!("Error parsing date from filename {}: {}", name, e),
        }
    }

    Ok(latest.map(|(_, path)| path))
}
