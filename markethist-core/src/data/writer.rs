//! Series files consumed by the dashboard.
//!
//! Layout: `{output_dir}/{prefix}{sanitized_name}_history.csv` with columns
//! `timestamp,price_mean,price_median,volume_sum`, plus a
//! `{prefix}{sanitized_name}_history.meta.json` sidecar.
//!
//! Both files are written atomically (write to `.tmp`, rename into place), so a
//! crash or shutdown never leaves a truncated series behind. Re-running
//! replaces the previous file; the CSV bytes depend only on the series.

use super::aggregate::ItemSeries;
use super::candidates::CandidateKind;
use super::catalog::ItemIdentity;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CSV_HEADER: [&str; 4] = ["timestamp", "price_mean", "price_median", "volume_sum"];
pub const FILE_SUFFIX: &str = "_history";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create output directory {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to encode CSV for {}: {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("failed to encode metadata for {}: {source}", .path.display())]
    Meta {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Metadata sidecar describing one written series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub item: String,
    pub app_id: u32,
    pub file: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: usize,
    pub data_hash: String,
    pub source: Option<CandidateKind>,
    pub observations_kept: usize,
    pub observations_dropped: usize,
    pub written_at: NaiveDateTime,
}

/// Where a series came from, recorded in the sidecar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesProvenance {
    pub candidate: Option<CandidateKind>,
    pub observations_kept: usize,
    pub observations_dropped: usize,
}

/// A CSV that has been renamed into place.
#[derive(Debug, Clone)]
pub struct WrittenSeries {
    pub path: PathBuf,
    pub rows: usize,
    pub data_hash: String,
}

#[derive(Serialize)]
struct CsvRow {
    timestamp: NaiveDate,
    price_mean: f64,
    price_median: f64,
    volume_sum: f64,
}

/// Spaces become underscores; pipes and slashes are removed.
pub fn sanitize_name(name: &str) -> String {
    name.replace(' ', "_").replace('|', "").replace('/', "")
}

/// `{prefix}{sanitized}_history`, without extension.
pub fn file_stem(identity: &ItemIdentity) -> String {
    format!(
        "{}{}{FILE_SUFFIX}",
        identity.file_prefix,
        sanitize_name(&identity.name)
    )
}

/// Encode a series as CSV. The header is always present.
pub fn render_csv(series: &ItemSeries) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;
    for day in series.days() {
        wtr.serialize(CsvRow {
            timestamp: day.date,
            price_mean: day.price_mean,
            price_median: day.price_median,
            volume_sum: day.volume_sum,
        })?;
    }
    wtr.into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Write `bytes` to `path` via a sibling temp file and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, bytes).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Writes one CSV (and sidecar) per item into a single directory.
#[derive(Debug, Clone)]
pub struct SeriesWriter {
    output_dir: PathBuf,
}

impl SeriesWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory if it does not exist.
    pub fn ensure_output_dir(&self) -> Result<(), WriteError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| WriteError::CreateDir {
            path: self.output_dir.clone(),
            source,
        })
    }

    pub fn path_for(&self, identity: &ItemIdentity) -> PathBuf {
        self.output_dir.join(format!("{}.csv", file_stem(identity)))
    }

    pub fn meta_path_for(&self, identity: &ItemIdentity) -> PathBuf {
        self.output_dir
            .join(format!("{}.meta.json", file_stem(identity)))
    }

    /// Write the series CSV, replacing any previous file for the item.
    pub fn write(
        &self,
        identity: &ItemIdentity,
        series: &ItemSeries,
    ) -> Result<WrittenSeries, WriteError> {
        let path = self.path_for(identity);
        let bytes = render_csv(series).map_err(|source| WriteError::Csv {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &bytes)?;

        Ok(WrittenSeries {
            path,
            rows: series.len(),
            data_hash: blake3::hash(&bytes).to_hex().to_string(),
        })
    }

    /// Write the metadata sidecar for a series already written by [`write`](Self::write).
    pub fn write_meta(
        &self,
        identity: &ItemIdentity,
        series: &ItemSeries,
        written: &WrittenSeries,
        provenance: &SeriesProvenance,
    ) -> Result<PathBuf, WriteError> {
        let path = self.meta_path_for(identity);
        let file = written
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let meta = SeriesMeta {
            item: identity.name.clone(),
            app_id: identity.app_id,
            file,
            start_date: series.first_date(),
            end_date: series.last_date(),
            row_count: written.rows,
            data_hash: written.data_hash.clone(),
            source: provenance.candidate,
            observations_kept: provenance.observations_kept,
            observations_dropped: provenance.observations_dropped,
            written_at: chrono::Utc::now().naive_utc(),
        };
        let json = serde_json::to_vec_pretty(&meta).map_err(|source| WriteError::Meta {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &json)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::aggregate::aggregate;
    use crate::data::observation::NormalizedObservation;

    fn series() -> ItemSeries {
        let at = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
        aggregate(&[
            NormalizedObservation {
                timestamp: at("2021-01-05 01:00:00"),
                price: 10.0,
                volume: 1.0,
            },
            NormalizedObservation {
                timestamp: at("2021-01-05 02:00:00"),
                price: 20.0,
                volume: 2.0,
            },
            NormalizedObservation {
                timestamp: at("2021-01-06 02:00:00"),
                price: 2.25,
                volume: 4.0,
            },
        ])
    }

    #[test]
    fn sanitizes_display_names() {
        assert_eq!(sanitize_name("AK-47 | Redline (Field-Tested)"), "AK-47__Redline_(Field-Tested)");
        assert_eq!(sanitize_name("Sticker | a/b"), "Sticker__ab");
        assert_eq!(sanitize_name("Kilowatt Case"), "Kilowatt_Case");
    }

    #[test]
    fn file_name_carries_prefix_and_suffix() {
        let w = SeriesWriter::new("out");
        let id = ItemIdentity::new(570, "Dragonclaw Hook", "Dota_");
        assert_eq!(w.path_for(&id), Path::new("out/Dota_Dragonclaw_Hook_history.csv"));
        assert_eq!(
            w.meta_path_for(&id),
            Path::new("out/Dota_Dragonclaw_Hook_history.meta.json")
        );
    }

    #[test]
    fn renders_header_and_rows() {
        let csv = String::from_utf8(render_csv(&series()).unwrap()).unwrap();
        assert_eq!(
            csv,
            "timestamp,price_mean,price_median,volume_sum\n\
             2021-01-05,15.0,15.0,3.0\n\
             2021-01-06,2.25,2.25,4.0\n"
        );
    }

    #[test]
    fn empty_series_renders_header_only() {
        let csv = String::from_utf8(render_csv(&ItemSeries::default()).unwrap()).unwrap();
        assert_eq!(csv, "timestamp,price_mean,price_median,volume_sum\n");
    }

    #[test]
    fn rewrite_is_byte_identical_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let w = SeriesWriter::new(dir.path());
        let id = ItemIdentity::new(730, "AK-47 | Redline (Field-Tested)", "");

        let first = w.write(&id, &series()).unwrap();
        let bytes1 = fs::read(&first.path).unwrap();
        let second = w.write(&id, &series()).unwrap();
        let bytes2 = fs::read(&second.path).unwrap();

        assert_eq!(bytes1, bytes2);
        assert_eq!(first.data_hash, second.data_hash);
        assert_eq!(first.rows, 2);

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1, "no temp files left behind");
    }

    #[test]
    fn meta_sidecar_describes_series() {
        let dir = tempfile::tempdir().unwrap();
        let w = SeriesWriter::new(dir.path());
        let id = ItemIdentity::new(730, "Kilowatt Case", "CS_");
        let s = series();
        let written = w.write(&id, &s).unwrap();
        let provenance = SeriesProvenance {
            candidate: Some(CandidateKind::CurrencyOnly),
            observations_kept: 3,
            observations_dropped: 1,
        };
        let meta_path = w.write_meta(&id, &s, &written, &provenance).unwrap();

        let meta: SeriesMeta =
            serde_json::from_slice(&fs::read(meta_path).unwrap()).unwrap();
        assert_eq!(meta.file, "CS_Kilowatt_Case_history.csv");
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.source, Some(CandidateKind::CurrencyOnly));
        assert_eq!(meta.data_hash, written.data_hash);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2021, 1, 5));
        assert_eq!(meta.end_date, NaiveDate::from_ymd_opt(2021, 1, 6));
    }

    #[test]
    fn unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let w = SeriesWriter::new(dir.path().join("missing").join("nested"));
        let id = ItemIdentity::new(730, "Kilowatt Case", "");
        let err = w.write(&id, &series()).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
