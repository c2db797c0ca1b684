//! Command definitions and dispatch

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use bw_core::{AliasManager, ConfigManager, Defaults, FilterSpec, RemotePath, RetryConfig};
use bw_s3::S3Client;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

pub mod alias;
pub mod du;
pub mod ls;
pub mod lsparts;
pub mod restore;

#[cfg(test)]
pub(crate) mod testing;

/// bw - list, size and restore objects in S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "bw", version, about, long_about = None)]
pub struct Cli {
    /// Output JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List objects, versions or directories
    Ls(ls::LsArgs),

    /// Summarize object count and size per storage class
    Du(du::DuArgs),

    /// List in-progress multipart uploads, or the parts of one upload
    Lsparts(lsparts::LspartsArgs),

    /// Restore archived objects under a path
    Restore(restore::RestoreArgs),

    /// Manage storage service aliases
    #[command(subcommand)]
    Alias(alias::AliasCommands),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

/// Arguments for the `completions` command
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Include/exclude patterns shared by the listing commands
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only keep keys matching this regular expression
    #[arg(long)]
    pub include: Option<String>,

    /// Drop keys matching this regular expression
    #[arg(long)]
    pub exclude: Option<String>,
}

impl FilterArgs {
    pub fn build(&self) -> bw_core::Result<FilterSpec> {
        FilterSpec::new(self.include.as_deref(), self.exclude.as_deref())
    }
}

/// Output settings from the global flags, falling back to the configured
/// output mode when `--json` is not given
fn output_config(cli: &Cli, defaults: &Defaults) -> OutputConfig {
    OutputConfig {
        json: cli.json || defaults.prefers_json(),
        no_color: cli.no_color,
        quiet: cli.quiet,
    }
}

/// Configured defaults; an unreadable file is reported later by the command
/// that needs it
fn load_defaults() -> Defaults {
    match ConfigManager::new().and_then(|cm| cm.load()) {
        Ok(config) => config.defaults,
        Err(e) => {
            tracing::debug!(error = %e, "Using built-in defaults");
            Defaults::default()
        }
    }
}

/// Execute the parsed command line
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = output_config(&cli, &load_defaults());

    match cli.command {
        Commands::Ls(args) => ls::execute(args, output_config).await,
        Commands::Du(args) => du::execute(args, output_config).await,
        Commands::Lsparts(args) => lsparts::execute(args, output_config).await,
        Commands::Restore(args) => restore::execute(args, output_config).await,
        Commands::Alias(cmd) => alias::execute(cmd, output_config).await,
        Commands::Completions(args) => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::generate(args.shell, &mut cmd, "bw", &mut std::io::stdout());
            ExitCode::Success
        }
    }
}

/// Everything a remote command needs: the parsed path, a connected client
/// and the effective retry policy and defaults
pub(crate) struct Session {
    pub path: RemotePath,
    pub client: S3Client,
    pub retry: RetryConfig,
    pub defaults: Defaults,
}

impl Session {
    /// Parse `path`, resolve its alias and connect; errors are reported
    /// through `formatter` and turned into an exit code
    pub async fn open(path: &str, formatter: &Formatter) -> Result<Self, ExitCode> {
        let path = match bw_core::parse_path(path) {
            Ok(p) => p,
            Err(e) => {
                formatter.error(&e.to_string());
                return Err(ExitCode::UsageError);
            }
        };

        let config_manager = match ConfigManager::new() {
            Ok(cm) => cm,
            Err(e) => {
                formatter.error(&format!("Failed to load configuration: {e}"));
                return Err(ExitCode::GeneralError);
            }
        };

        let defaults = match config_manager.load() {
            Ok(config) => config.defaults,
            Err(e) => {
                formatter.error(&format!("Failed to load configuration: {e}"));
                return Err(ExitCode::GeneralError);
            }
        };

        let alias = match AliasManager::with_config(config_manager).get(&path.alias) {
            Ok(a) => a,
            Err(bw_core::Error::AliasNotFound(_)) => {
                formatter.error(&format!("Alias '{}' not found", path.alias));
                return Err(ExitCode::NotFound);
            }
            Err(e) => {
                formatter.error(&format!("Failed to load aliases: {e}"));
                return Err(ExitCode::GeneralError);
            }
        };

        let retry = alias.retry_config();
        let client = match S3Client::new(alias).await {
            Ok(c) => c,
            Err(e) => {
                formatter.error(&format!("Failed to create S3 client: {e}"));
                return Err(ExitCode::NetworkError);
            }
        };

        Ok(Self {
            path,
            client,
            retry,
            defaults,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bw", "ls", "cos/bucket", "--json", "--no-color"]).unwrap();
        assert!(cli.json);
        assert!(cli.no_color);
        assert!(matches!(cli.command, Commands::Ls(_)));
    }

    #[test]
    fn test_configured_json_output_applies_without_flag() {
        let json_defaults = Defaults {
            output: "JSON".to_string(),
            ..Defaults::default()
        };
        let plain = Cli::try_parse_from(["bw", "ls", "cos/bucket"]).unwrap();
        let flagged = Cli::try_parse_from(["bw", "ls", "cos/bucket", "--json", "-q"]).unwrap();

        assert!(output_config(&plain, &json_defaults).json);
        assert!(!output_config(&plain, &Defaults::default()).json);

        let config = output_config(&flagged, &Defaults::default());
        assert!(config.json);
        assert!(config.quiet);
    }

    #[test]
    fn test_filter_args_reject_bad_pattern() {
        let args = FilterArgs {
            include: Some("(".to_string()),
            exclude: None,
        };
        assert!(matches!(
            args.build(),
            Err(bw_core::Error::InvalidPattern { .. })
        ));
        assert!(FilterArgs::default().build().unwrap().is_empty());
    }
}
