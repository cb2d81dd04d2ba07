//! The master dataset artifact: `<out>/master/master_<timestamp>.{json,csv}`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dropdb_core::{ConsolidatedRecord, ProviderRun};

use crate::codec;
use crate::consolidate::consolidate;
use crate::error::MasterError;
use crate::run_store::RunStore;

pub const MASTER_DIR: &str = "master";
const MASTER_PREFIX: &str = "master_";
const MASTER_TS_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterMeta {
    /// Newest run timestamp among the inputs.
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub by_locale: BTreeMap<String, usize>,
    pub runs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterDataset {
    pub meta: MasterMeta,
    pub products: Vec<ConsolidatedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Reads every run under `store` in directory-name order and consolidates
/// them. Unreadable runs are logged and skipped.
///
/// # Errors
///
/// Returns [`MasterError::Io`] if the store root cannot be listed.
pub fn build_master(store: &RunStore) -> Result<MasterDataset, MasterError> {
    let mut runs: Vec<ProviderRun> = Vec::new();
    for dir in store.list()? {
        match RunStore::read(&dir) {
            Ok(run) => runs.push(run),
            Err(err) => tracing::warn!(run_dir = %dir.display(), error = %err, "skipping unreadable run"),
        }
    }

    let generated_at = runs
        .iter()
        .map(|r| r.meta.scraped_at)
        .max()
        .unwrap_or_default();
    let run_count = runs.len();
    let consolidation = consolidate(runs);

    Ok(MasterDataset {
        meta: MasterMeta {
            generated_at,
            total: consolidation.records.len(),
            by_locale: consolidation.by_locale,
            runs: run_count,
        },
        products: consolidation.records,
    })
}

/// Writes both encodings. The file name derives from `generated_at`, so
/// re-consolidating unchanged inputs rewrites identical files.
///
/// # Errors
///
/// Returns an I/O or encoding [`MasterError`].
pub fn write_master(out_dir: &Path, dataset: &MasterDataset) -> Result<MasterPaths, MasterError> {
    let dir = out_dir.join(MASTER_DIR);
    fs::create_dir_all(&dir).map_err(|e| MasterError::io(&dir, e))?;
    let stem = format!(
        "{MASTER_PREFIX}{}",
        dataset.meta.generated_at.format(MASTER_TS_FORMAT)
    );
    let json = dir.join(format!("{stem}.json"));
    let csv = dir.join(format!("{stem}.csv"));

    let file = File::create(&json).map_err(|e| MasterError::io(&json, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, dataset).map_err(|e| MasterError::Json {
        path: json.clone(),
        source: e,
    })?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|e| MasterError::io(&json, e))?;

    let file = File::create(&csv).map_err(|e| MasterError::io(&csv, e))?;
    codec::write_products(
        BufWriter::new(file),
        dataset.products.iter().map(|r| &r.product),
    )
    .map_err(|e| MasterError::Csv {
        path: csv.clone(),
        source: e,
    })?;

    tracing::info!(
        path = %json.display(),
        total = dataset.meta.total,
        runs = dataset.meta.runs,
        "master dataset written"
    );
    Ok(MasterPaths { json, csv })
}

/// # Errors
///
/// Returns an I/O or JSON [`MasterError`].
pub fn read_master(path: &Path) -> Result<MasterDataset, MasterError> {
    let file = File::open(path).map_err(|e| MasterError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| MasterError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Newest master JSON under `<out_dir>/master`.
///
/// # Errors
///
/// Returns [`MasterError::NoMaster`] if none has been written yet.
pub fn latest_master(out_dir: &Path) -> Result<PathBuf, MasterError> {
    let dir = out_dir.join(MASTER_DIR);
    let entries = fs::read_dir(&dir).map_err(|_| MasterError::NoMaster(dir.clone()))?;
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "json")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(MASTER_PREFIX))
        })
        .max()
        .ok_or(MasterError::NoMaster(dir))
}
