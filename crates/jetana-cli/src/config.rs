//! `--config` file: data location plus settings for the job and file helpers.
//!
//! YAML, or JSON for `.json` files. Every section is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jetana_core::paths::ResolverConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    /// Overrides the resolver's base directory.
    pub data_dir: Option<PathBuf>,
    /// Naming tokens for `resolve`.
    pub resolver: ResolverConfig,
    pub resubmit: ResubmitConfig,
    pub cleanup: CleanupConfig,
}

impl Config {
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        jetana_core::config::load_file(path).with_context(|| format!("load config {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ResubmitConfig {
    /// Where resubmitted `.sub` files are copied to and submitted from.
    pub processing_dir: PathBuf,
    /// Literal substrings that mark a job log as failed.
    pub error_patterns: Vec<String>,
    /// Submission program followed by fixed arguments; the `.sub` path is appended.
    pub submit_command: Vec<String>,
    /// Submission files are named `<prefix>_<job>.sub`.
    pub sub_prefix: String,
}

impl Default for ResubmitConfig {
    fn default() -> Self {
        Self {
            processing_dir: home_dir().join("soft/jetAnalysis/processing"),
            error_patterns: vec!["Input/output error".to_string(), "scramv1: command not found".to_string()],
            submit_command: vec!["condor_submit".to_string()],
            sub_prefix: "pPb8160".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CleanupConfig {
    /// Glob patterns, relative to the working directory, of files to delete.
    pub patterns: Vec<String>,
    /// Known-good systematics file copied onto every name in `systematics_targets`.
    pub systematics_source: Option<PathBuf>,
    pub systematics_targets: Vec<PathBuf>,
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}
