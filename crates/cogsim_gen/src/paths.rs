//! Output locations for generated archives.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};

/// Default output directory under the OS data dir.
pub fn default_output_dir() -> CliResult<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| CliError::Usage("could not determine data directory; pass --out".into()))?;
    Ok(base.join("cogsim").join("batches"))
}

pub fn ensure_dir(dir: &Path) -> CliResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| CliError::io(format!("failed to create {}", dir.display()), e))
}

pub fn batch_file(dir: &Path, k: usize) -> PathBuf {
    dir.join(format!("batch_{k:05}.csa"))
}
