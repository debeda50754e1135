//! Dataset output: one JSON array per category and a dated ZIP of them.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::instrument;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;
use crate::model::{CategoryResult, ProductRecord};

/// Receives the merged results once every category crawl has ended.
pub trait ResultSink: Send + Sync {
    fn persist(&self, results: &BTreeMap<String, CategoryResult>) -> Result<()>;
}

/// Writes `<output_dir>/<category>.json` and `<history_dir>/data_<YYYYMMDD>.zip`.
#[derive(Debug, Clone)]
pub struct JsonDatasetSink {
    output_dir: PathBuf,
    history_dir: PathBuf,
    date: Option<NaiveDate>,
}

impl JsonDatasetSink {
    pub fn new(output_dir: impl Into<PathBuf>, history_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            history_dir: history_dir.into(),
            date: None,
        }
    }

    /// Pins the archive date instead of using today's local date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    fn archive_date(&self) -> NaiveDate {
        self.date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

impl ResultSink for JsonDatasetSink {
    fn persist(&self, results: &BTreeMap<String, CategoryResult>) -> Result<()> {
        write_category_files(results, &self.output_dir)?;
        archive_json(&self.output_dir, &self.history_dir, self.archive_date())?;
        Ok(())
    }
}

/// File name for a category; path separators are not allowed through.
pub fn category_file_name(category: &str) -> String {
    format!("{}.json", path_component(category))
}

/// Turns scraped or configured text into a single path component that stays
/// inside the directory it is joined to.
pub fn path_component(name: &str) -> String {
    let component: String = name
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    if component.trim_matches('.').is_empty() {
        "_".to_string()
    } else {
        component
    }
}

#[instrument(skip(results))]
pub fn write_category_files(
    results: &BTreeMap<String, CategoryResult>,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let mut written = Vec::with_capacity(results.len());
    for (category, result) in results {
        let path = output_dir.join(category_file_name(category));
        write_records(&path, &result.records)?;
        tracing::info!(
            category = %category,
            records = result.count(),
            path = %path.display(),
            "Saved category data"
        );
        written.push(path);
    }
    Ok(written)
}

fn write_records(path: &Path, records: &[ProductRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    records.serialize(&mut ser)?;
    writer.flush()?;
    Ok(())
}

pub fn archive_path(history_dir: &Path, date: NaiveDate) -> PathBuf {
    history_dir.join(format!("data_{}.zip", date.format("%Y%m%d")))
}

/// Zips every `*.json` under `output_dir` into the archive for `date`,
/// replacing an archive written earlier the same day.
#[instrument]
pub fn archive_json(output_dir: &Path, history_dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    let start = Instant::now();
    fs::create_dir_all(history_dir)?;

    let mut files = Vec::new();
    collect_json(output_dir, history_dir, &mut files)?;
    files.sort();

    let target = archive_path(history_dir, date);
    let partial = target.with_extension("zip.partial");
    {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(&partial)?));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for file in &files {
            let name = entry_name(output_dir, file);
            zip.start_file(name, options)?;
            io::copy(&mut File::open(file)?, &mut zip)?;
        }
        zip.finish()?.flush()?;
    }
    fs::rename(&partial, &target)?;

    tracing::info!(
        path = %target.display(),
        files = files.len(),
        duration = ?start.elapsed(),
        "Archived dataset"
    );
    Ok(target)
}

fn collect_json(dir: &Path, skip: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if path != skip {
                collect_json(&path, skip, out)?;
            }
        } else if path.extension().map_or(false, |ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

fn entry_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_cannot_escape_output_dir() {
        assert_eq!(category_file_name("cpu"), "cpu.json");
        assert_eq!(category_file_name("../etc/x"), ".._etc_x.json");
        assert_eq!(path_component(".."), "_");
        assert_eq!(path_component(""), "_");
        assert_eq!(path_component("그래픽카드 (GPU)"), "그래픽카드 (GPU)");
        assert_eq!(path_component("a\\b:c\n"), "a_b_c_");
    }

    #[test]
    fn archive_is_named_by_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            archive_path(Path::new("dataset/history"), date),
            PathBuf::from("dataset/history/data_20240307.zip")
        );
    }
}
