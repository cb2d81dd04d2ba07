//! Write-once storage of provider runs, one directory per run.
//!
//! Layout: `<root>/prov_<id|x>_<slug>_<timestamp>/{products.json,products.csv}`.
//! Directory names sort by provider and then by time, which gives the
//! consolidator a stable merge order.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use dropdb_core::urls::{provider_id_from_url, slugify, PLACEHOLDER_PROVIDER_NAME};
use dropdb_core::{ProviderMeta, ProviderRun, ScrapedProduct};

use crate::codec;
use crate::error::MasterError;

pub const RUN_JSON: &str = "products.json";
pub const RUN_CSV: &str = "products.csv";

const RUN_DIR_PREFIX: &str = "prov_";
const RUN_TS_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Older runs stored a bare product array instead of the full run.
#[derive(Deserialize)]
#[serde(untagged)]
enum RunFile {
    Run(ProviderRun),
    Items(Vec<ScrapedProduct>),
}

#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for a run: provider id (or `x`), name slug, timestamp.
    #[must_use]
    pub fn run_dir_name(meta: &ProviderMeta) -> String {
        let id = meta
            .provider_id
            .map_or_else(|| "x".to_string(), |id| id.to_string());
        let mut slug = slugify(&meta.provider_name);
        if slug.is_empty() {
            slug = slugify(PLACEHOLDER_PROVIDER_NAME);
        }
        format!(
            "{RUN_DIR_PREFIX}{id}_{slug}_{}",
            meta.scraped_at.format(RUN_TS_FORMAT)
        )
    }

    /// Persists `run` in both encodings and returns its directory.
    ///
    /// # Errors
    ///
    /// Returns [`MasterError::RunExists`] if the run directory is already
    /// present; runs are never rewritten. Other filesystem and encoding
    /// failures surface as [`MasterError::Io`], [`MasterError::Json`] or
    /// [`MasterError::Csv`].
    pub fn write(&self, run: &ProviderRun) -> Result<PathBuf, MasterError> {
        fs::create_dir_all(&self.root).map_err(|e| MasterError::io(&self.root, e))?;
        let dir = self.root.join(Self::run_dir_name(&run.meta));
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(MasterError::RunExists(dir));
            }
            Err(e) => return Err(MasterError::io(&dir, e)),
        }

        let json_path = dir.join(RUN_JSON);
        let mut json = BufWriter::new(create_new(&json_path)?);
        serde_json::to_writer_pretty(&mut json, run).map_err(|e| MasterError::Json {
            path: json_path.clone(),
            source: e,
        })?;
        json.write_all(b"\n")
            .and_then(|()| json.flush())
            .map_err(|e| MasterError::io(&json_path, e))?;

        let csv_path = dir.join(RUN_CSV);
        codec::write_products(BufWriter::new(create_new(&csv_path)?), &run.items).map_err(
            |e| MasterError::Csv {
                path: csv_path.clone(),
                source: e,
            },
        )?;

        tracing::info!(
            run_dir = %dir.display(),
            items = run.items.len(),
            with_stock = run.counts.with_stock,
            with_href = run.counts.with_href,
            with_id = run.counts.with_id,
            "provider run written"
        );
        Ok(dir)
    }

    /// Run directories under the root, sorted by name. A missing root is an
    /// empty store.
    ///
    /// # Errors
    ///
    /// Returns [`MasterError::Io`] if the root exists but cannot be listed.
    pub fn list(&self) -> Result<Vec<PathBuf>, MasterError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MasterError::io(&self.root, e)),
        };
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MasterError::io(&self.root, e))?;
            let path = entry.path();
            let is_run = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(RUN_DIR_PREFIX));
            if is_run && path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Reads one run, preferring the structured encoding and falling back to
    /// the tabular one.
    ///
    /// # Errors
    ///
    /// Returns [`MasterError::EmptyRunDir`] when neither file exists, or a
    /// decode error for the file that was read.
    pub fn read(dir: &Path) -> Result<ProviderRun, MasterError> {
        let dir_ts = timestamp_from_dir(dir);
        let json_path = dir.join(RUN_JSON);
        let csv_path = dir.join(RUN_CSV);

        let mut run = if json_path.is_file() {
            let file = File::open(&json_path).map_err(|e| MasterError::io(&json_path, e))?;
            let parsed: RunFile =
                serde_json::from_reader(BufReader::new(file)).map_err(|e| MasterError::Json {
                    path: json_path.clone(),
                    source: e,
                })?;
            match parsed {
                RunFile::Run(run) => run,
                RunFile::Items(items) => run_from_items(items, dir_ts),
            }
        } else if csv_path.is_file() {
            let file = File::open(&csv_path).map_err(|e| MasterError::io(&csv_path, e))?;
            let items = codec::read_products(BufReader::new(file)).map_err(|e| MasterError::Csv {
                path: csv_path.clone(),
                source: e,
            })?;
            run_from_items(items, dir_ts)
        } else {
            return Err(MasterError::EmptyRunDir(dir.to_path_buf()));
        };

        let scraped_at = run.meta.scraped_at;
        for item in &mut run.items {
            item.scraped_at.get_or_insert(scraped_at);
        }
        Ok(run)
    }
}

fn create_new(path: &Path) -> Result<File, MasterError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| MasterError::io(path, e))
}

fn timestamp_from_dir(dir: &Path) -> Option<DateTime<Utc>> {
    let name = dir.file_name()?.to_str()?;
    let (_, ts) = name.rsplit_once('_')?;
    NaiveDateTime::parse_from_str(ts, RUN_TS_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Rebuilds run metadata from the first row when only products were stored.
fn run_from_items(items: Vec<ScrapedProduct>, dir_ts: Option<DateTime<Utc>>) -> ProviderRun {
    let first = items.first();
    let provider_url = first.map(|p| p.provider_url.clone()).unwrap_or_default();
    let meta = ProviderMeta {
        provider_name: first
            .map(|p| p.provider_name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| PLACEHOLDER_PROVIDER_NAME.to_string()),
        provider_id: first
            .and_then(|p| p.provider_id)
            .or_else(|| provider_id_from_url(&provider_url)),
        locale: first.and_then(|p| p.locale.clone()),
        scraped_at: first
            .and_then(|p| p.scraped_at)
            .or(dir_ts)
            .unwrap_or_default(),
        provider_url,
    };
    ProviderRun::new(meta, items)
}
