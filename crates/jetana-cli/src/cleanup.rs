//! Bulk deletion of superseded outputs and fan-out of a systematics file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::config::CleanupConfig;

#[derive(Debug, Default, Serialize)]
pub(crate) struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub copied: Vec<PathBuf>,
}

/// Delete every file under `dir` matching one of `patterns`.
pub(crate) fn delete_matching(dir: &Path, patterns: &[String], report: &mut CleanupReport) -> Result<()> {
    for pattern in patterns {
        let full = dir.join(pattern);
        let full = full.to_str().with_context(|| format!("non UTF-8 pattern under {}", dir.display()))?;
        for entry in glob::glob(full).with_context(|| format!("bad glob pattern '{}'", pattern))? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("skipping {}", e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))?;
            tracing::info!("{} deleted", path.display());
            report.deleted.push(path);
        }
    }
    Ok(())
}

/// Copy `source` onto each of `targets`, all relative to `dir`.
pub(crate) fn copy_systematics(
    dir: &Path,
    source: &Path,
    targets: &[PathBuf],
    report: &mut CleanupReport,
) -> Result<()> {
    let src = dir.join(source);
    if !src.is_file() {
        bail!("systematics file not found: {}", src.display());
    }
    for target in targets {
        let dst = dir.join(target);
        if dst == src {
            continue;
        }
        fs::copy(&src, &dst).with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
        tracing::info!("copied {} -> {}", src.display(), dst.display());
        report.copied.push(dst);
    }
    Ok(())
}

/// Run both steps configured in `cfg` inside `dir`. Deletion runs first.
pub(crate) fn clean(cfg: &CleanupConfig, dir: &Path) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    delete_matching(dir, &cfg.patterns, &mut report)?;
    if let Some(source) = &cfg.systematics_source {
        copy_systematics(dir, source, &cfg.systematics_targets, &mut report)?;
    } else if !cfg.systematics_targets.is_empty() {
        tracing::warn!("systematics_targets set without systematics_source; nothing copied");
    }
    Ok(report)
}
