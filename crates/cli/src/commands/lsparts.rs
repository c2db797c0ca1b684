//! lsparts command - List multipart uploads and their parts
//!
//! Without `--upload-id` the in-progress uploads below a prefix are listed;
//! with it, the uploaded parts of that one upload.

use std::io::Write;

use async_trait::async_trait;
use clap::Args;
use serde::Serialize;

use bw_core::{
    FilterSpec, Item, Limit, ListingService, RemotePath, Result, RetryConfig, TraversalStats,
    Traverser, Visitor,
};

use super::ls::{human_size, local_time};
use super::{FilterArgs, Session};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, Row, TableSink};

const UPLOAD_HEADER: [&str; 3] = ["Key", "Upload ID", "Initiate time"];
const PART_HEADER: [&str; 4] = ["Part Number", "Size", "Etag", "Last Modified"];

/// List in-progress multipart uploads, or the parts of one upload
#[derive(Args, Debug)]
pub struct LspartsArgs {
    /// Path to list (alias/bucket[/prefix]); the object key with --upload-id
    pub path: String,

    /// List the parts of this upload instead of the uploads
    #[arg(long)]
    pub upload_id: Option<String>,

    /// Maximum number of entries to list (0 lists everything)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=1000))]
    pub limit: u32,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PartsRow {
    Upload {
        key: String,
        upload_id: String,
        initiated: String,
    },
    Part {
        part_number: i32,
        size_bytes: i64,
        etag: String,
        last_modified: String,
    },
}

impl Row for PartsRow {
    fn cells(&self) -> Vec<String> {
        match self {
            PartsRow::Upload {
                key,
                upload_id,
                initiated,
            } => vec![key.clone(), upload_id.clone(), initiated.clone()],
            PartsRow::Part {
                part_number,
                size_bytes,
                etag,
                last_modified,
            } => vec![
                part_number.to_string(),
                human_size(*size_bytes),
                etag.clone(),
                last_modified.clone(),
            ],
        }
    }
}

#[derive(Debug, Serialize)]
struct PartsSummary {
    total: u64,
}

struct PartsVisitor<W: Write> {
    sink: TableSink<W>,
}

#[async_trait]
impl<W: Write + Send> Visitor for PartsVisitor<W> {
    async fn visit(&mut self, item: Item<'_>) -> Result<()> {
        let row = match item {
            Item::Upload(u) => PartsRow::Upload {
                key: u.key.clone(),
                upload_id: u.upload_id.clone(),
                initiated: local_time(&u.initiated)?,
            },
            Item::Part(p) => PartsRow::Part {
                part_number: p.part_number,
                size_bytes: p.size_bytes,
                etag: p.etag.clone(),
                last_modified: local_time(&p.last_modified)?,
            },
            _ => return Ok(()),
        };
        self.sink.push(&row)?;
        Ok(())
    }

    async fn end_page(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

/// Execute the lsparts command
pub async fn execute(args: LspartsArgs, output_config: OutputConfig) -> ExitCode {
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

    if args.upload_id.is_some() && session.path.key.is_empty() {
        formatter.error("An object key is required with --upload-id");
        return ExitCode::UsageError;
    }

    match list_parts(
        &session.client,
        session.retry,
        &session.path,
        &filter,
        args.upload_id.as_deref(),
        args.limit,
        std::io::stdout(),
        &formatter,
    )
    .await
    {
        Ok(_) => ExitCode::Success,
        Err(e) => {
            formatter.error(&format!("Failed to list uploads of {}: {e}", session.path));
            ExitCode::from_error(&e)
        }
    }
}

/// List uploads below `path`, or the parts of `upload_id` at `path`
#[allow(clippy::too_many_arguments)]
pub(crate) async fn list_parts<S, W>(
    service: &S,
    retry: RetryConfig,
    path: &RemotePath,
    filter: &FilterSpec,
    upload_id: Option<&str>,
    limit: u32,
    out: W,
    formatter: &Formatter,
) -> Result<(TraversalStats, W)>
where
    S: ListingService + ?Sized,
    W: Write + Send,
{
    let header: &[&str] = match upload_id {
        Some(_) => &PART_HEADER,
        None => &UPLOAD_HEADER,
    };
    let mut visitor = PartsVisitor {
        sink: TableSink::new(out, header, formatter),
    };

    let traverser = Traverser::new(service, retry, filter).with_limit(Limit::new(limit));
    let stats = match upload_id {
        Some(id) => {
            traverser
                .walk_parts(&path.bucket, &path.key, id, &mut visitor)
                .await?
        }
        None => {
            traverser
                .walk_uploads(&path.bucket, &path.key, &mut visitor)
                .await?
        }
    };

    let mut footer = vec![String::new(); header.len() - 1];
    footer.push(format!("Total: {}", stats.delivered));
    let out = visitor.sink.finish(
        footer,
        &PartsSummary {
            total: stats.delivered,
        },
    )?;
    Ok((stats, out))
}
