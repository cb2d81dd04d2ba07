use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("provider run already exists at {0}")]
    RunExists(PathBuf),

    #[error("no products file in run directory {0}")]
    EmptyRunDir(PathBuf),

    #[error("no master dataset under {0}")]
    NoMaster(PathBuf),
}

impl MasterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
