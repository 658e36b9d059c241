use anyhow::{Context, Result, bail};
use std::path::Path;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn remove_dir(p: &Path) -> Result<()> {
    if p.parent().is_none() {
        bail!("refusing to delete {}", p.display());
    }
    if !p.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(p).with_context(|| format!("remove_dir_all {}", p.display()))
}
