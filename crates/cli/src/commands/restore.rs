//! restore command - Restore archived objects
//!
//! Every object below the path that passes the filter is classified: objects
//! in an archive tier get a restore request, everything else is counted as
//! the wrong type. Individual failures are tallied and logged; only listing
//! failures make the command fail.

use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use bw_core::{FailureLog, RestoreJob, RestoreOptions, RestoreSummary, RestoreTier};

use super::{FilterArgs, Session};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Restore archived objects under a path
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Path to restore (alias/bucket[/prefix])
    pub path: String,

    /// Days the restored copies stay available
    #[arg(short, long, default_value_t = 3)]
    pub days: u32,

    /// Retrieval mode: Standard, Expedited or Bulk
    #[arg(long, default_value = "Standard")]
    pub mode: RestoreTier,

    /// Maximum restore requests in flight (default from configuration)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=64))]
    pub parallel: Option<u32>,

    /// Append one line per failed object to this file
    #[arg(long)]
    pub fail_output: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Serialize)]
struct RestoreOutput {
    path: String,
    #[serde(flatten)]
    summary: RestoreSummary,
}

/// Open the failure log, appending to an existing file
fn open_failure_log(path: Option<&Path>) -> anyhow::Result<FailureLog> {
    let Some(path) = path else {
        return Ok(FailureLog::disabled());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open failure log {}", path.display()))?;
    Ok(FailureLog::new(Box::new(BufWriter::new(file))))
}

fn spinner(formatter: &Formatter) -> Option<ProgressBar> {
    if !formatter.shows_progress() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Listing...");
    Some(pb)
}

fn describe(summary: &RestoreSummary) -> String {
    format!(
        "total: {}, succeeded: {}, failed: {}, wrong type: {}",
        summary.total, summary.succeeded, summary.failed, summary.wrong_type
    )
}

/// Execute the restore command
pub async fn execute(args: RestoreArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let filter = match args.filter.build() {
        Ok(f) => f,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    let failures = match open_failure_log(args.fail_output.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::GeneralError;
        }
    };

    let session = match Session::open(&args.path, &formatter).await {
        Ok(s) => s,
        Err(code) => return code,
    };

    let options = RestoreOptions {
        days: args.days,
        tier: args.mode,
        parallel: args
            .parallel
            .map_or(session.defaults.restore_parallel, |p| p as usize),
    };

    let mut job = RestoreJob::new(&session.client, session.retry.clone(), &filter, options)
        .with_failure_log(failures);
    let progress = spinner(&formatter);
    if let Some(pb) = progress.clone() {
        job = job.with_progress(move |s| pb.set_message(describe(s)));
    }

    let result = job.run(&session.path).await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let summary = match result {
        Ok(s) => s,
        Err(e) => {
            formatter.error(&format!("Failed to restore {}: {e}", session.path));
            return ExitCode::from_error(&e);
        }
    };

    if formatter.is_json() {
        formatter.json(&RestoreOutput {
            path: session.path.to_string(),
            summary,
        });
    } else {
        formatter.success(&format!(
            "Restore {} completed, {}",
            formatter.style_name(&session.path.to_string()),
            describe(&summary)
        ));
        if summary.failed + summary.wrong_type > 0 {
            let hint = match &args.fail_output {
                Some(path) => format!(", see {}", path.display()),
                None => String::new(),
            };
            formatter.warning(&format!(
                "{} object(s) were not restored{hint}",
                summary.failed + summary.wrong_type
            ));
        }
    }

    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RestoreArgs,
    }

    #[test]
    fn test_restore_defaults() {
        let h = Harness::try_parse_from(["restore", "cos/bucket/prefix"]).unwrap();
        assert_eq!(h.args.days, 3);
        assert_eq!(h.args.mode, RestoreTier::Standard);
        assert!(h.args.parallel.is_none());
        assert!(h.args.fail_output.is_none());
    }

    #[test]
    fn test_restore_mode_is_case_insensitive() {
        let h = Harness::try_parse_from(["restore", "cos/b", "--mode", "bulk", "-d", "7"]).unwrap();
        assert_eq!(h.args.mode, RestoreTier::Bulk);
        assert_eq!(h.args.days, 7);
        assert!(Harness::try_parse_from(["restore", "cos/b", "--mode", "fast"]).is_err());
        assert!(Harness::try_parse_from(["restore", "cos/b", "--parallel", "0"]).is_err());
    }

    #[test]
    fn test_failure_log_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("failed.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"previous\n")
            .unwrap();

        let log = open_failure_log(Some(&path)).unwrap();
        drop(log);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous\n");
        assert!(open_failure_log(None).is_ok());
    }

    #[test]
    fn test_failure_log_reports_context() {
        let dir = tempfile::TempDir::new().unwrap();
        // a directory cannot be opened as a log file
        let err = open_failure_log(Some(dir.path())).unwrap_err();
        assert!(format!("{err:#}").starts_with("Failed to open failure log"));
    }

    #[test]
    fn test_describe() {
        let summary = RestoreSummary {
            total: 9,
            succeeded: 3,
            failed: 2,
            wrong_type: 4,
        };
        assert_eq!(
            describe(&summary),
            "total: 9, succeeded: 3, failed: 2, wrong type: 4"
        );
    }
}
