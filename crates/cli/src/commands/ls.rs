//! ls command - List objects, versions and directories
//!
//! Flat buckets are listed page by page; tree buckets are listed one
//! directory at a time and, with `--recursive`, walked depth first.

use std::io::Write;

use async_trait::async_trait;
use clap::Args;
use jiff::tz::TimeZone;
use serde::Serialize;

use bw_core::{
    FilterSpec, Item, Limit, ListingService, RemotePath, Result, RetryConfig, Strategy,
    TraversalStats, Traverser, Visitor, parse_timestamp,
};

use super::{FilterArgs, Session};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, Row, TableSink};

const OBJECT_HEADER: [&str; 6] = ["Key", "Type", "Last Modified", "Etag", "Size", "RestoreStatus"];
const VERSION_HEADER: [&str; 8] = [
    "Key",
    "Type",
    "VersionId",
    "IsLatest",
    "Delete Marker",
    "Last Modified",
    "Etag",
    "Size",
];

/// List objects, versions or directories
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Path to list (alias/bucket[/prefix])
    pub path: String,

    /// List every key below the prefix instead of one level
    #[arg(short, long)]
    pub recursive: bool,

    /// Maximum number of entries to list (0 lists everything)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=1000))]
    pub limit: u32,

    /// List all object versions and delete markers
    #[arg(long)]
    pub all_versions: bool,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Traversal settings resolved from arguments and configuration
#[derive(Debug, Clone, Copy)]
pub(crate) struct LsOptions {
    pub recursive: bool,
    pub limit: u32,
    pub all_versions: bool,
    /// Rows per rendered chunk for tree listings
    pub render_batch: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LsRow {
    Dir {
        key: String,
        #[serde(skip)]
        columns: usize,
    },
    Object {
        key: String,
        storage_class: String,
        last_modified: String,
        etag: String,
        size_bytes: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        restore_status: Option<String>,
    },
    Version {
        key: String,
        storage_class: String,
        version_id: String,
        is_latest: bool,
        last_modified: String,
        etag: String,
        size_bytes: i64,
    },
    DeleteMarker {
        key: String,
        version_id: String,
        is_latest: bool,
        last_modified: String,
    },
}

impl LsRow {
    /// Build the row for a traversal item; a bad timestamp aborts the listing
    fn from_item(item: Item<'_>, columns: usize) -> Result<Option<Self>> {
        let row = match item {
            Item::Prefix(key) => LsRow::Dir {
                key: key.to_string(),
                columns,
            },
            Item::Object(o) => LsRow::Object {
                key: o.key.clone(),
                storage_class: o.storage_class.clone(),
                last_modified: local_time(&o.last_modified)?,
                etag: o.etag.clone(),
                size_bytes: o.size_bytes,
                restore_status: o.restore_status.clone(),
            },
            Item::Version(v) => LsRow::Version {
                key: v.key.clone(),
                storage_class: v.storage_class.clone(),
                version_id: v.version_id.clone(),
                is_latest: v.is_latest,
                last_modified: local_time(&v.last_modified)?,
                etag: v.etag.clone(),
                size_bytes: v.size_bytes,
            },
            Item::DeleteMarker(m) => LsRow::DeleteMarker {
                key: m.key.clone(),
                version_id: m.version_id.clone(),
                is_latest: m.is_latest,
                last_modified: local_time(&m.last_modified)?,
            },
            Item::Upload(_) | Item::Part(_) => return Ok(None),
        };
        Ok(Some(row))
    }
}

impl Row for LsRow {
    fn cells(&self) -> Vec<String> {
        match self {
            LsRow::Dir { key, columns } => {
                let mut cells = vec![key.clone(), "DIR".to_string()];
                cells.resize(*columns, String::new());
                cells
            }
            LsRow::Object {
                key,
                storage_class,
                last_modified,
                etag,
                size_bytes,
                restore_status,
            } => vec![
                key.clone(),
                storage_class.clone(),
                last_modified.clone(),
                etag.clone(),
                human_size(*size_bytes),
                restore_status.clone().unwrap_or_default(),
            ],
            LsRow::Version {
                key,
                storage_class,
                version_id,
                is_latest,
                last_modified,
                etag,
                size_bytes,
            } => vec![
                key.clone(),
                storage_class.clone(),
                version_id.clone(),
                is_latest.to_string(),
                "false".to_string(),
                last_modified.clone(),
                etag.clone(),
                human_size(*size_bytes),
            ],
            LsRow::DeleteMarker {
                key,
                version_id,
                is_latest,
                last_modified,
            } => vec![
                key.clone(),
                String::new(),
                version_id.clone(),
                is_latest.to_string(),
                "true".to_string(),
                last_modified.clone(),
                String::new(),
                String::new(),
            ],
        }
    }
}

#[derive(Debug, Serialize)]
struct LsSummary {
    total_objects: u64,
}

/// Render a service timestamp in the local time zone
pub(crate) fn local_time(raw: &str) -> Result<String> {
    let zoned = parse_timestamp(raw)?.to_zoned(TimeZone::system());
    Ok(zoned.strftime("%Y-%m-%dT%H:%M:%S%:z").to_string())
}

pub(crate) fn human_size(bytes: i64) -> String {
    humansize::format_size(bytes.max(0) as u64, humansize::BINARY)
}

/// Visitor that renders every item as a table row
struct LsVisitor<W: Write> {
    sink: TableSink<W>,
    columns: usize,
    flush_per_page: bool,
}

#[async_trait]
impl<W: Write + Send> Visitor for LsVisitor<W> {
    async fn visit(&mut self, item: Item<'_>) -> Result<()> {
        if let Some(row) = LsRow::from_item(item, self.columns)? {
            self.sink.push(&row)?;
        }
        Ok(())
    }

    async fn end_page(&mut self) -> Result<()> {
        if self.flush_per_page {
            self.sink.flush()?;
        }
        Ok(())
    }
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig) -> ExitCode {
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

    let options = LsOptions {
        recursive: args.recursive,
        limit: args.limit,
        all_versions: args.all_versions,
        render_batch: session.defaults.render_batch,
    };

    match list(
        &session.client,
        session.retry,
        &session.path,
        &filter,
        options,
        std::io::stdout(),
        &formatter,
    )
    .await
    {
        Ok(_) => ExitCode::Success,
        Err(e) => {
            formatter.error(&format!("Failed to list {}: {e}", session.path));
            ExitCode::from_error(&e)
        }
    }
}

/// Probe the bucket, walk it and render the listing into `out`
pub(crate) async fn list<S, W>(
    service: &S,
    retry: RetryConfig,
    path: &RemotePath,
    filter: &FilterSpec,
    options: LsOptions,
    out: W,
    formatter: &Formatter,
) -> Result<(TraversalStats, W)>
where
    S: ListingService + ?Sized,
    W: Write + Send,
{
    let arch = service.bucket_arch(&path.bucket).await?;
    let strategy = Strategy::select(arch, options.all_versions)?;
    let location = path.locate(arch);

    let header: &[&str] = match strategy {
        Strategy::Versions => &VERSION_HEADER,
        Strategy::Flat | Strategy::Tree => &OBJECT_HEADER,
    };
    let mut sink = TableSink::new(out, header, formatter);
    if strategy == Strategy::Tree {
        sink = sink.flush_every(options.render_batch);
    }

    let mut visitor = LsVisitor {
        sink,
        columns: header.len(),
        flush_per_page: strategy != Strategy::Tree,
    };

    let stats = Traverser::new(service, retry, filter)
        .with_limit(Limit::new(options.limit))
        .run(strategy, &location, options.recursive, &mut visitor)
        .await?;

    let mut footer = vec![String::new(); header.len() - 2];
    footer.push("Total Objects: ".to_string());
    footer.push(stats.delivered.to_string());

    let out = visitor.sink.finish(
        footer,
        &LsSummary {
            total_objects: stats.delivered,
        },
    )?;
    Ok((stats, out))
}
