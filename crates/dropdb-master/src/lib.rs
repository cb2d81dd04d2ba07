//! Provider run artifacts and the master dataset built from them.

pub mod codec;
pub mod consolidate;
pub mod error;
pub mod master_store;
pub mod run_store;

pub use consolidate::{consolidate, Consolidation, ConsolidationKey};
pub use error::MasterError;
pub use master_store::{
    build_master, latest_master, read_master, write_master, MasterDataset, MasterMeta,
    MasterPaths,
};
pub use run_store::{RunStore, RUN_CSV, RUN_JSON};
