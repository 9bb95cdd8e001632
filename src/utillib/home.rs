use std::path::PathBuf;

use anyhow::{Result, anyhow};

/// The user's home directory, from the `HOME` environment variable.
pub fn home_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| anyhow!("HOME env var is not set"))?;
    if home.is_empty() {
        return Err(anyhow!("HOME env var is empty"));
    }
    Ok(home.into())
}
