//! Bulk restore of archived objects
//!
//! Restore walks the whole subtree under a path and classifies every object
//! that passes the filter: archival objects get a restore request, anything
//! else is counted as the wrong type. Per-object failures are logged and
//! tallied, never propagated. Listing failures abort the run.

use std::io::Write;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::alias::RetryConfig;
use crate::error::Result;
use crate::filter::FilterSpec;
use crate::listing::{Item, Strategy, Traverser, Visitor};
use crate::path::RemotePath;
use crate::traits::{ARCHIVE_CLASSES, ListingService, ObjectEntry, RestoreTier};

/// Parameters of a restore request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Days the restored copy stays available
    pub days: u32,
    pub tier: RestoreTier,
    /// Maximum restore requests in flight
    pub parallel: usize,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            days: 3,
            tier: RestoreTier::Standard,
            parallel: 4,
        }
    }
}

/// Outcome counts of one restore run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub wrong_type: u64,
}

/// Line-oriented log of objects that could not be restored
///
/// Writing the log never interrupts a restore. After the first write error
/// the file is abandoned and later failures only reach tracing.
pub struct FailureLog {
    writer: Option<Box<dyn Write + Send>>,
    unwritten: u64,
}

impl std::fmt::Debug for FailureLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureLog")
            .field("enabled", &self.writer.is_some())
            .field("unwritten", &self.unwritten)
            .finish()
    }
}

impl FailureLog {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Some(writer),
            unwritten: 0,
        }
    }

    /// Failures are only reported through tracing
    pub fn disabled() -> Self {
        Self {
            writer: None,
            unwritten: 0,
        }
    }

    fn record(&mut self, key: &str, message: &str) {
        tracing::warn!(key, error = message, "Restore failed");
        let Some(writer) = self.writer.as_mut() else {
            if self.unwritten > 0 {
                self.unwritten += 1;
            }
            return;
        };
        if let Err(e) = writeln!(writer, "restore {key} failed, errMsg: {message}") {
            tracing::warn!(error = %e, "Failure log is no longer writable");
            self.writer = None;
            self.unwritten += 1;
        }
    }

    /// Flush the log; returns how many failure lines never reached it
    fn finish(&mut self) -> u64 {
        if let Some(writer) = self.writer.as_mut()
            && let Err(e) = writer.flush()
        {
            tracing::warn!(error = %e, "Failed to flush failure log");
        }
        self.unwritten
    }
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::disabled()
    }
}

type ProgressFn = Box<dyn FnMut(&RestoreSummary) + Send>;

/// A configured restore run
pub struct RestoreJob<'a, S: ?Sized> {
    service: &'a S,
    retry: RetryConfig,
    filter: &'a FilterSpec,
    options: RestoreOptions,
    failures: FailureLog,
    progress: Option<ProgressFn>,
}

impl<'a, S> RestoreJob<'a, S>
where
    S: ListingService + ?Sized,
{
    pub fn new(
        service: &'a S,
        retry: RetryConfig,
        filter: &'a FilterSpec,
        options: RestoreOptions,
    ) -> Self {
        Self {
            service,
            retry,
            filter,
            options,
            failures: FailureLog::disabled(),
            progress: None,
        }
    }

    pub fn with_failure_log(mut self, failures: FailureLog) -> Self {
        self.failures = failures;
        self
    }

    /// Called with the running tally after every page
    pub fn with_progress(mut self, progress: impl FnMut(&RestoreSummary) + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Restore everything under `path`
    pub async fn run(self, path: &RemotePath) -> Result<RestoreSummary> {
        let arch = self.service.bucket_arch(&path.bucket).await?;
        let location = path.locate(arch);
        let strategy = Strategy::select(arch, false)?;

        tracing::info!(path = %path, ?arch, "Start restore");

        let mut restorer = Restorer {
            service: self.service,
            bucket: location.bucket().to_string(),
            options: self.options,
            summary: RestoreSummary::default(),
            pending: Vec::new(),
            failures: self.failures,
            progress: self.progress,
        };

        Traverser::new(self.service, self.retry, self.filter)
            .descend_all_prefixes(true)
            .run(strategy, &location, true, &mut restorer)
            .await?;
        restorer.dispatch().await;

        let unwritten = restorer.failures.finish();
        if unwritten > 0 {
            tracing::warn!(unwritten, "Some restore failures are missing from the failure log");
        }

        let summary = restorer.summary;
        tracing::info!(
            path = %path,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            wrong_type = summary.wrong_type,
            "Restore completed"
        );
        Ok(summary)
    }
}

/// Visitor that classifies objects and dispatches restore requests per page
struct Restorer<'a, S: ?Sized> {
    service: &'a S,
    bucket: String,
    options: RestoreOptions,
    summary: RestoreSummary,
    pending: Vec<String>,
    failures: FailureLog,
    progress: Option<ProgressFn>,
}

impl<S> Restorer<'_, S>
where
    S: ListingService + ?Sized,
{
    fn classify(&mut self, entry: &ObjectEntry) {
        self.summary.total += 1;
        if entry.is_restorable() {
            self.pending.push(entry.key.clone());
            return;
        }

        self.summary.wrong_type += 1;
        self.failures.record(
            &entry.key,
            &format!(
                "The file type is {}, and restore only supports {} types.",
                entry.storage_class,
                ARCHIVE_CLASSES.join(", ")
            ),
        );
    }

    /// Issue restore requests for the pending keys, at most `parallel` at once
    async fn dispatch(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let keys = std::mem::take(&mut self.pending);
        let service = self.service;
        let bucket = self.bucket.as_str();
        let RestoreOptions {
            days,
            tier,
            parallel,
        } = self.options;

        let mut outcomes = stream::iter(keys)
            .map(|key| async move {
                tracing::info!(bucket, key = %key, days, %tier, "Restore object");
                let result = service.restore_object(bucket, &key, days, tier).await;
                (key, result)
            })
            .buffer_unordered(parallel.max(1));

        while let Some((key, result)) = outcomes.next().await {
            match result {
                Ok(()) => self.summary.succeeded += 1,
                Err(e) => {
                    self.summary.failed += 1;
                    self.failures.record(&key, &e.to_string());
                }
            }
        }
    }
}

#[async_trait]
impl<S> Visitor for Restorer<'_, S>
where
    S: ListingService + ?Sized,
{
    async fn visit(&mut self, item: Item<'_>) -> Result<()> {
        if let Item::Object(entry) = item {
            self.classify(entry);
        }
        Ok(())
    }

    async fn end_page(&mut self) -> Result<()> {
        self.dispatch().await;
        if let Some(progress) = self.progress.as_mut() {
            progress(&self.summary);
        }
        Ok(())
    }
}
