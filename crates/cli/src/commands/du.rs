//! du command - Summarize storage usage
//!
//! Walks everything below a path and reports object count and size per
//! storage class.

use std::collections::BTreeMap;
use std::io::Write;

use async_trait::async_trait;
use clap::Args;
use serde::Serialize;

use bw_core::{
    FilterSpec, Item, ListingService, RemotePath, Result, RetryConfig, Strategy, Traverser,
    Visitor,
};

use super::ls::human_size;
use super::{FilterArgs, Session};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, Row, TableSink};

/// Summarize object count and size per storage class
#[derive(Args, Debug)]
pub struct DuArgs {
    /// Path to summarize (alias/bucket[/prefix])
    pub path: String,

    /// Include every object version
    #[arg(long)]
    pub all_versions: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct ClassUsage {
    pub storage_class: String,
    pub objects: u64,
    pub size_bytes: u64,
}

impl Row for ClassUsage {
    fn cells(&self) -> Vec<String> {
        vec![
            self.storage_class.clone(),
            self.objects.to_string(),
            human_size(self.size_bytes as i64),
        ]
    }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub(crate) struct DuSummary {
    pub total_objects: u64,
    pub total_size_bytes: u64,
}

/// Per storage class accumulator
#[derive(Debug, Default)]
struct UsageVisitor {
    classes: BTreeMap<String, (u64, u64)>,
}

impl UsageVisitor {
    fn add(&mut self, class: &str, size: i64) {
        let slot = self.classes.entry(class.to_string()).or_default();
        slot.0 += 1;
        slot.1 += size.max(0) as u64;
    }

    fn into_rows(self) -> (Vec<ClassUsage>, DuSummary) {
        let mut summary = DuSummary::default();
        let rows = self
            .classes
            .into_iter()
            .map(|(storage_class, (objects, size_bytes))| {
                summary.total_objects += objects;
                summary.total_size_bytes += size_bytes;
                ClassUsage {
                    storage_class,
                    objects,
                    size_bytes,
                }
            })
            .collect();
        (rows, summary)
    }
}

#[async_trait]
impl Visitor for UsageVisitor {
    async fn visit(&mut self, item: Item<'_>) -> Result<()> {
        match item {
            Item::Object(o) => self.add(&o.storage_class, o.size_bytes),
            Item::Version(v) => self.add(&v.storage_class, v.size_bytes),
            _ => {}
        }
        Ok(())
    }
}

/// Execute the du command
pub async fn execute(args: DuArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let filter = match args.filter.build() {
        Ok(f) => f,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    let session = match Session::open(&args.path, &formatter).await {
        Ok(s) => s,
        Err(code) => return code,
    };

    let (rows, summary) = match usage(
        &session.client,
        session.retry,
        &session.path,
        &filter,
        args.all_versions,
    )
    .await
    {
        Ok(r) => r,
        Err(e) => {
            formatter.error(&format!("Failed to summarize {}: {e}", session.path));
            return ExitCode::from_error(&e);
        }
    };

    match render(rows, &summary, std::io::stdout(), &formatter) {
        Ok(_) => ExitCode::Success,
        Err(e) => {
            formatter.error(&format!("Failed to write output: {e}"));
            ExitCode::GeneralError
        }
    }
}

/// Aggregate usage below `path`
pub(crate) async fn usage<S>(
    service: &S,
    retry: RetryConfig,
    path: &RemotePath,
    filter: &FilterSpec,
    all_versions: bool,
) -> Result<(Vec<ClassUsage>, DuSummary)>
where
    S: ListingService + ?Sized,
{
    let arch = service.bucket_arch(&path.bucket).await?;
    let strategy = Strategy::select(arch, all_versions)?;
    let location = path.locate(arch);

    let mut visitor = UsageVisitor::default();
    Traverser::new(service, retry, filter)
        .descend_all_prefixes(true)
        .run(strategy, &location, true, &mut visitor)
        .await?;

    Ok(visitor.into_rows())
}

fn render<W: Write>(
    rows: Vec<ClassUsage>,
    summary: &DuSummary,
    out: W,
    formatter: &Formatter,
) -> std::io::Result<W> {
    let mut sink = TableSink::new(out, &["Storage Class", "Objects", "Size"], formatter);
    for row in &rows {
        sink.push(row)?;
    }
    sink.finish(
        vec![
            "Total".to_string(),
            summary.total_objects.to_string(),
            human_size(summary.total_size_bytes as i64),
        ],
        summary,
    )
}
