//! Resubmission of batch jobs whose logs show a known failure.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::config::ResubmitConfig;

/// What a resubmission pass did, per job base name.
#[derive(Debug, Default, Serialize)]
pub(crate) struct ResubmitReport {
    pub matched: Vec<String>,
    pub submitted: Vec<String>,
    /// Jobs whose `.sub` file was not found in the submission directory.
    pub missing: Vec<String>,
    /// `(job, reason)` for copies or submissions that failed.
    pub failed: Vec<(String, String)>,
}

/// Base names (without `.err`) of logs in `log_dir` containing any of `patterns`.
///
/// Unreadable logs are skipped with a warning.
pub(crate) fn find_failed_jobs(log_dir: &Path, patterns: &[String]) -> Result<BTreeSet<String>> {
    let pattern = log_dir.join("*.err");
    let pattern = pattern.to_str().with_context(|| format!("non UTF-8 path {}", log_dir.display()))?;
    let mut jobs = BTreeSet::new();
    for entry in glob::glob(pattern).with_context(|| format!("bad log pattern {}", pattern))? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("skipping log entry: {}", e);
                continue;
            }
        };
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("could not read {}: {}", path.display(), e);
                continue;
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        if patterns.iter().any(|p| content.contains(p.as_str()))
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            jobs.insert(stem.to_string());
        }
    }
    Ok(jobs)
}

/// Copy each failed job's `.sub` file into the processing directory and submit it.
///
/// A failed copy or submission is recorded and the remaining jobs still run.
pub(crate) fn resubmit(cfg: &ResubmitConfig, log_dir: &Path, sub_dir: &Path) -> Result<ResubmitReport> {
    for dir in [cfg.processing_dir.as_path(), log_dir, sub_dir] {
        if !dir.is_dir() {
            bail!("directory does not exist: {}", dir.display());
        }
    }
    let Some((program, fixed_args)) = cfg.submit_command.split_first() else {
        bail!("resubmit.submit_command is empty");
    };

    let jobs = find_failed_jobs(log_dir, &cfg.error_patterns)?;
    let mut report = ResubmitReport { matched: jobs.iter().cloned().collect(), ..Default::default() };
    if jobs.is_empty() {
        tracing::info!("no failed jobs in {}", log_dir.display());
        return Ok(report);
    }

    for job in jobs {
        let sub_name = format!("{}_{}.sub", cfg.sub_prefix, job);
        let src = sub_dir.join(&sub_name);
        if !src.is_file() {
            tracing::warn!("submission file not found: {}", src.display());
            report.missing.push(job);
            continue;
        }
        let dst: PathBuf = cfg.processing_dir.join(&sub_name);
        if let Err(e) = fs::copy(&src, &dst) {
            tracing::error!("failed to copy {} -> {}: {}", src.display(), dst.display(), e);
            report.failed.push((job, format!("copy: {}", e)));
            continue;
        }
        tracing::info!("copied {} -> {}", src.display(), dst.display());

        let status = Command::new(program).args(fixed_args).arg(&dst).current_dir(&cfg.processing_dir).status();
        match status {
            Ok(s) if s.success() => {
                tracing::info!("submitted {}", sub_name);
                report.submitted.push(job);
            }
            Ok(s) => {
                tracing::error!("failed to submit {}: {}", sub_name, s);
                report.failed.push((job, s.to_string()));
            }
            Err(e) => {
                tracing::error!("failed to run {}: {}", program, e);
                report.failed.push((job, e.to_string()));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let p = std::env::temp_dir().join(format!("jetana_jobs_{}_{}_{}", std::process::id(), nanos, tag));
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn matches_literal_patterns_and_dedups() {
        let logs = tmp_dir("logs");
        fs::write(logs.join("job_1.err"), "fatal: Input/output error\n").unwrap();
        fs::write(logs.join("job_2.err"), "all good\n").unwrap();
        fs::write(logs.join("job_3.err"), b"\xff\xfe scramv1: command not found").unwrap();
        fs::write(logs.join("job_1.out"), "Input/output error").unwrap();

        let jobs = find_failed_jobs(&logs, &ResubmitConfig::default().error_patterns).unwrap();
        assert_eq!(jobs.into_iter().collect::<Vec<_>>(), vec!["job_1", "job_3"]);
        fs::remove_dir_all(&logs).ok();
    }

    #[test]
    fn failed_submission_does_not_stop_the_rest() {
        let (logs, subs, proc_dir) = (tmp_dir("l"), tmp_dir("s"), tmp_dir("p"));
        for job in ["a", "b", "c"] {
            fs::write(logs.join(format!("{}.err", job)), "Input/output error").unwrap();
        }
        fs::write(subs.join("pPb8160_a.sub"), "executable = a.sh").unwrap();
        fs::write(subs.join("pPb8160_c.sub"), "executable = c.sh").unwrap();

        let cfg = ResubmitConfig {
            processing_dir: proc_dir.clone(),
            submit_command: vec!["jetana-no-such-submit-program".to_string()],
            ..ResubmitConfig::default()
        };
        let report = resubmit(&cfg, &logs, &subs).unwrap();
        assert_eq!(report.matched, vec!["a", "b", "c"]);
        assert_eq!(report.missing, vec!["b"]);
        assert!(report.submitted.is_empty());
        assert_eq!(report.failed.len(), 2);
        // copies happen before submission
        assert!(proc_dir.join("pPb8160_a.sub").is_file());
        assert!(proc_dir.join("pPb8160_c.sub").is_file());
        for d in [logs, subs, proc_dir] {
            fs::remove_dir_all(d).ok();
        }
    }

    #[test]
    fn missing_directory_is_an_error() {
        let cfg = ResubmitConfig { processing_dir: PathBuf::from("/nonexistent/jetana"), ..ResubmitConfig::default() };
        let d = tmp_dir("x");
        assert!(resubmit(&cfg, &d, &d).is_err());
        fs::remove_dir_all(d).ok();
    }
}
