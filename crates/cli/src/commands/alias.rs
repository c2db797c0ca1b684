//! alias command - Name storage endpoints
//!
//! A path's first segment is an alias: `cos/bucket/prefix` resolves `cos` to
//! an endpoint, its credentials and the retry policy applied to throttled
//! listing calls against it.

use std::io::Write;

use clap::{Args, Subcommand};
use serde::Serialize;

use bw_core::{Alias, AliasManager, RetryConfig};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, Row, TableSink};

const LIST_HEADER: [&str; 5] = ["Alias", "Endpoint", "Region", "Lookup", "Retry"];

#[derive(Subcommand, Debug)]
pub enum AliasCommands {
    /// Add an alias or replace an existing one
    Set(SetArgs),

    /// Show configured aliases (credentials are never printed)
    List,

    /// Delete an alias
    Remove(RemoveArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Name used as the first path segment
    pub name: String,

    /// Endpoint URL, e.g. https://cos.ap-guangzhou.myqcloud.com
    pub endpoint: String,

    pub access_key: String,

    pub secret_key: String,

    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Addressing style for bucket names
    #[arg(long, default_value = "auto", value_parser = ["auto", "path", "dns"])]
    pub bucket_lookup: String,

    #[command(flatten)]
    pub retry: RetryArgs,
}

/// Per-alias overrides of the throttling retry policy
#[derive(Args, Debug, Clone, Default)]
pub struct RetryArgs {
    /// Retries after a throttled call [default: 10]
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Shortest randomized wait before a retry, in milliseconds [default: 1000]
    #[arg(long)]
    pub min_backoff_ms: Option<u64>,

    /// Longest randomized wait before a retry, in milliseconds [default: 10000]
    #[arg(long)]
    pub max_backoff_ms: Option<u64>,
}

impl RetryArgs {
    /// The policy to store, or `None` to keep the built-in one. Unset flags
    /// fall back to the defaults before the window is checked.
    fn policy(&self) -> Result<Option<RetryConfig>, String> {
        if self.max_retries.is_none()
            && self.min_backoff_ms.is_none()
            && self.max_backoff_ms.is_none()
        {
            return Ok(None);
        }

        let base = RetryConfig::default();
        let policy = RetryConfig {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            min_backoff_ms: self.min_backoff_ms.unwrap_or(base.min_backoff_ms),
            max_backoff_ms: self.max_backoff_ms.unwrap_or(base.max_backoff_ms),
        };
        if policy.min_backoff_ms > policy.max_backoff_ms {
            return Err(format!(
                "Backoff window is empty: {} ms > {} ms",
                policy.min_backoff_ms, policy.max_backoff_ms
            ));
        }
        Ok(Some(policy))
    }
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    pub name: String,
}

#[derive(Debug, Serialize)]
struct AliasRow {
    name: String,
    endpoint: String,
    region: String,
    bucket_lookup: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry: Option<RetryConfig>,
}

impl From<&Alias> for AliasRow {
    fn from(alias: &Alias) -> Self {
        Self {
            name: alias.name.clone(),
            endpoint: alias.endpoint.clone(),
            region: alias.region.clone(),
            bucket_lookup: alias.bucket_lookup.clone(),
            retry: alias.retry.clone(),
        }
    }
}

impl Row for AliasRow {
    fn cells(&self) -> Vec<String> {
        let retry = match &self.retry {
            Some(r) => format!("{}x {}-{}ms", r.max_retries, r.min_backoff_ms, r.max_backoff_ms),
            None => "default".to_string(),
        };
        vec![
            self.name.clone(),
            self.endpoint.clone(),
            self.region.clone(),
            self.bucket_lookup.clone(),
            retry,
        ]
    }
}

#[derive(Debug, Serialize)]
struct AliasChange<'a> {
    alias: &'a str,
    action: &'static str,
}

#[derive(Debug, Serialize)]
struct AliasTotal {
    total: usize,
}

/// Execute an alias subcommand
pub async fn execute(cmd: AliasCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match AliasManager::new() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&format!("Failed to load aliases: {e}"));
            return ExitCode::GeneralError;
        }
    };

    match cmd {
        AliasCommands::Set(args) => set(args, &manager, &formatter),
        AliasCommands::List => match manager.list() {
            Ok(aliases) => match render_list(&aliases, std::io::stdout(), &formatter) {
                Ok(_) => ExitCode::Success,
                Err(e) => {
                    formatter.error(&format!("Failed to write output: {e}"));
                    ExitCode::GeneralError
                }
            },
            Err(e) => {
                formatter.error(&format!("Failed to load aliases: {e}"));
                ExitCode::GeneralError
            }
        },
        AliasCommands::Remove(args) => remove(&args.name, &manager, &formatter),
    }
}

/// Check a set request and turn it into the alias to store
fn build_alias(args: SetArgs) -> Result<Alias, String> {
    if args.name.is_empty() || args.name.contains('/') {
        return Err(format!(
            "Invalid alias name '{}': it must be non-empty and contain no '/'",
            args.name
        ));
    }
    if args.endpoint.is_empty() {
        return Err("Endpoint URL cannot be empty".to_string());
    }

    let retry = args.retry.policy()?;
    let mut alias = Alias::new(args.name, args.endpoint, args.access_key, args.secret_key);
    alias.region = args.region;
    alias.bucket_lookup = args.bucket_lookup;
    alias.retry = retry;
    Ok(alias)
}

fn set(args: SetArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    let alias = match build_alias(args) {
        Ok(a) => a,
        Err(message) => {
            formatter.error(&message);
            return ExitCode::UsageError;
        }
    };
    let name = alias.name.clone();

    if let Err(e) = manager.set(alias) {
        formatter.error(&format!("Failed to save alias '{name}': {e}"));
        return ExitCode::GeneralError;
    }
    report_change(&name, "set", formatter);
    ExitCode::Success
}

fn remove(name: &str, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    match manager.remove(name) {
        Ok(()) => {
            report_change(name, "removed", formatter);
            ExitCode::Success
        }
        Err(bw_core::Error::AliasNotFound(_)) => {
            formatter.error(&format!("Alias '{name}' not found"));
            ExitCode::NotFound
        }
        Err(e) => {
            formatter.error(&format!("Failed to remove alias '{name}': {e}"));
            ExitCode::GeneralError
        }
    }
}

fn report_change(name: &str, action: &'static str, formatter: &Formatter) {
    if formatter.is_json() {
        formatter.json(&AliasChange {
            alias: name,
            action,
        });
    } else {
        formatter.success(&format!("Alias {} {action}", formatter.style_name(name)));
    }
}

fn render_list<W: Write>(aliases: &[Alias], out: W, formatter: &Formatter) -> std::io::Result<W> {
    let mut sink = TableSink::new(out, &LIST_HEADER, formatter);
    for alias in aliases {
        sink.push(&AliasRow::from(alias))?;
    }

    let mut footer = vec![String::new(); LIST_HEADER.len() - 1];
    footer.push(format!("Total: {}", aliases.len()));
    sink.finish(
        footer,
        &AliasTotal {
            total: aliases.len(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        cmd: AliasCommands,
    }

    fn parse_set(extra: &[&str]) -> SetArgs {
        let mut argv = vec!["alias", "set", "cos", "https://cos.example.com", "ak", "sk"];
        argv.extend_from_slice(extra);
        match Harness::try_parse_from(argv).unwrap().cmd {
            AliasCommands::Set(args) => args,
            other => panic!("unexpected subcommand {other:?}"),
        }
    }

    #[test]
    fn test_set_keeps_builtin_retry_without_flags() {
        let alias = build_alias(parse_set(&[])).unwrap();
        assert_eq!(alias.region, "us-east-1");
        assert_eq!(alias.bucket_lookup, "auto");
        assert!(alias.retry.is_none());
    }

    #[test]
    fn test_partial_retry_flags_fill_from_defaults() {
        let alias = build_alias(parse_set(&["--max-retries", "3"])).unwrap();
        assert_eq!(
            alias.retry,
            Some(RetryConfig {
                max_retries: 3,
                min_backoff_ms: 1_000,
                max_backoff_ms: 10_000,
            })
        );
    }

    #[test]
    fn test_backoff_window_checked_against_defaults() {
        // 20 s alone exceeds the default 10 s ceiling
        let err = build_alias(parse_set(&["--min-backoff-ms", "20000"])).unwrap_err();
        assert!(err.starts_with("Backoff window is empty"));

        let ok = build_alias(parse_set(&["--min-backoff-ms", "20000", "--max-backoff-ms", "30000"]));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_bad_names_and_lookup_styles_rejected() {
        let mut args = parse_set(&[]);
        args.name = "a/b".to_string();
        assert!(build_alias(args).is_err());

        assert!(
            Harness::try_parse_from([
                "alias", "set", "cos", "http://e", "ak", "sk", "--bucket-lookup", "vhost"
            ])
            .is_err()
        );
        assert!(Harness::try_parse_from(["alias", "set", "cos", "http://e", "ak", "sk", "--insecure"]).is_err());
    }

    #[test]
    fn test_list_hides_credentials() {
        let mut slow = Alias::new("slow", "http://s", "AKID", "SECRET");
        slow.retry = Some(RetryConfig {
            max_retries: 2,
            min_backoff_ms: 10,
            max_backoff_ms: 20,
        });
        let aliases = vec![Alias::new("cos", "http://c", "AKID", "SECRET"), slow];
        let formatter = Formatter::new(OutputConfig {
            no_color: true,
            ..Default::default()
        });

        let out = render_list(&aliases, Vec::new(), &formatter).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Endpoint"));
        assert!(text.contains("default"));
        assert!(text.contains("2x 10-20ms"));
        assert!(text.contains("Total: 2"));
        assert!(!text.contains("AKID"));
        assert!(!text.contains("SECRET"));
    }

    #[test]
    fn test_list_json_rows() {
        let formatter = Formatter::new(OutputConfig {
            json: true,
            ..Default::default()
        });
        let aliases = vec![Alias::new("cos", "http://c", "ak", "sk")];

        let out = render_list(&aliases, Vec::new(), &formatter).unwrap();
        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines[0]["name"], "cos");
        assert!(lines[0].get("retry").is_none());
        assert!(lines[0].get("secret_key").is_none());
        assert_eq!(lines[1]["total"], 1);
    }
}
