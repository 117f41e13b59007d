// crates/rally-cli/src/main.rs
// ============================================================================
// Module: Rally CLI Entry Point
// Description: Command dispatcher for local storage, reminders, and fetches.
// Purpose: Operate the Rally data layer from a terminal.
// Dependencies: clap, rally-config, rally-fetch, rally-sync, tokio, tracing,
//               tracing-subscriber
// ============================================================================

//! ## Overview
//! Every command loads configuration (explicit `--config`, then
//! `RALLY_CONFIG`, then `./rally.toml`), builds a [`RallyContext`], and runs
//! one operation against it. Command output goes to stdout; diagnostics go
//! to stderr through `tracing`, filtered by `RALLY_LOG`.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use rally_config::RallyConfig;
use rally_core::InMemoryKvStore;
use rally_core::KeyValueStore;
use rally_core::ReminderEvent;
use rally_core::ReminderId;
use rally_core::ReminderRule;
use rally_fetch::FetchRequest;
use rally_fetch::user_message;
use rally_sync::CacheNamespace;
use rally_sync::MigrationOutcome;
use rally_sync::PresentError;
use rally_sync::RallyContext;
use rally_sync::ReminderPresenter;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a legacy storage export.
const MAX_LEGACY_BYTES: u64 = 16 * 1024 * 1024;
/// Environment variable holding the log filter.
const LOG_ENV: &str = "RALLY_LOG";
/// Log filter used when `RALLY_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";
/// Cache namespace for ad-hoc fetches.
const DEFAULT_FETCH_NAMESPACE: &str = "FETCH_CACHE";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "rally", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file (overrides `RALLY_CONFIG` and `./rally.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Key/value store utilities.
    Kv {
        /// Selected key/value subcommand.
        #[command(subcommand)]
        command: KvCommand,
    },
    /// Copy a legacy JSON export into the durable store once.
    Migrate {
        /// JSON object of key to value.
        #[arg(long, value_name = "PATH")]
        legacy: PathBuf,
    },
    /// Reminder rule utilities.
    Reminders {
        /// Selected reminder subcommand.
        #[command(subcommand)]
        command: ReminderCommand,
    },
    /// Run the reminder scheduler until interrupted.
    Run {
        /// JSON object of key to value, migrated before the scheduler starts.
        #[arg(long, value_name = "PATH")]
        legacy: Option<PathBuf>,
    },
    /// Fetch a JSON document through the response cache.
    Fetch {
        /// Target URL.
        url: String,
        /// Cache namespace key.
        #[arg(long, default_value = DEFAULT_FETCH_NAMESPACE)]
        namespace: String,
        /// JSON body; sends a POST when present.
        #[arg(long, value_name = "JSON")]
        body: Option<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate configuration.
    Check,
}

/// Key/value subcommands.
#[derive(Subcommand, Debug)]
enum KvCommand {
    /// Print a value.
    Get {
        /// Entry key.
        key: String,
    },
    /// Store a value.
    Set {
        /// Entry key.
        key: String,
        /// Entry value.
        value: String,
    },
    /// Remove a value.
    Remove {
        /// Entry key.
        key: String,
    },
    /// List keys.
    Keys,
    /// Remove every entry.
    Clear,
}

/// Reminder subcommands.
#[derive(Subcommand, Debug)]
enum ReminderCommand {
    /// List enabled rules.
    List,
    /// Schedule the daily training reminder.
    Workout {
        /// Time of day, `HH:MM` UTC.
        #[arg(long)]
        at: String,
        /// Store the rule disabled.
        #[arg(long)]
        disabled: bool,
    },
    /// Schedule the evening missed-workout nudge.
    Missed {
        /// Store the rule disabled.
        #[arg(long)]
        disabled: bool,
    },
    /// Schedule the weekly progress report.
    Weekly {
        /// Store the rule disabled.
        #[arg(long)]
        disabled: bool,
    },
    /// Disable one rule.
    Cancel {
        /// Rule id.
        id: String,
    },
    /// Disable every rule.
    CancelAll,
    /// Fire due rules once.
    Poll,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Presenter
// ============================================================================

/// Prints fired reminders to stdout.
struct StdoutPresenter;

impl ReminderPresenter for StdoutPresenter {
    fn present(&self, event: &ReminderEvent) -> Result<(), PresentError> {
        write_stdout_line(&format!("[{}] {}: {}", event.kind.as_str(), event.title, event.message))
            .map_err(|err| PresentError(err.to_string()))
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_logging();
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = RallyConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    if let Commands::Config {
        command: ConfigCommand::Check,
    } = cli.command
    {
        stdout(&format!("config ok (store: {})", config.store.path.display()))?;
        return Ok(ExitCode::SUCCESS);
    }
    let context = RallyContext::open(&config, Arc::new(StdoutPresenter))
        .map_err(|err| CliError::new(format!("failed to start: {err}")))?;

    match cli.command {
        Commands::Config {
            ..
        } => Ok(ExitCode::SUCCESS),
        Commands::Kv {
            command,
        } => command_kv(&context, command),
        Commands::Migrate {
            legacy,
        } => command_migrate(&context, &legacy),
        Commands::Reminders {
            command,
        } => command_reminders(&context, command),
        Commands::Run {
            legacy,
        } => command_run(&context, legacy.as_deref()).await,
        Commands::Fetch {
            url,
            namespace,
            body,
        } => command_fetch(&context, url, &namespace, body.as_deref()).await,
    }
}

/// Installs the stderr log subscriber.
fn init_logging() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

// ============================================================================
// SECTION: Key/Value Commands
// ============================================================================

/// Executes a `kv` subcommand.
fn command_kv(context: &RallyContext, command: KvCommand) -> CliResult<ExitCode> {
    let kv = context.kv();
    match command {
        KvCommand::Get {
            key,
        } => match kv.get(&key).map_err(storage_error)? {
            Some(value) => stdout(&value)?,
            None => return Ok(ExitCode::FAILURE),
        },
        KvCommand::Set {
            key,
            value,
        } => kv.set(&key, &value).map_err(storage_error)?,
        KvCommand::Remove {
            key,
        } => kv.remove(&key).map_err(storage_error)?,
        KvCommand::Keys => {
            for key in kv.keys().map_err(storage_error)? {
                stdout(&key)?;
            }
        }
        KvCommand::Clear => kv.clear().map_err(storage_error)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes the `migrate` command.
fn command_migrate(context: &RallyContext, legacy_path: &Path) -> CliResult<ExitCode> {
    let legacy = load_legacy_store(legacy_path)?;
    match context.migrate_from(legacy) {
        MigrationOutcome::AlreadyMigrated => stdout("already migrated")?,
        MigrationOutcome::Migrated {
            entries,
        } => stdout(&format!("migrated {entries} entries"))?,
        MigrationOutcome::Failed {
            reason,
        } => return Err(CliError::new(format!("migration failed: {reason}"))),
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Reminder Commands
// ============================================================================

/// Executes a `reminders` subcommand.
fn command_reminders(context: &RallyContext, command: ReminderCommand) -> CliResult<ExitCode> {
    let scheduler = context.scheduler();
    let scheduled = match command {
        ReminderCommand::List => {
            for rule in scheduler.scheduled_reminders().map_err(storage_error)? {
                stdout(&format_rule(&rule))?;
            }
            return Ok(ExitCode::SUCCESS);
        }
        ReminderCommand::Workout {
            at,
            disabled,
        } => scheduler.schedule_workout_reminder(&at, !disabled),
        ReminderCommand::Missed {
            disabled,
        } => scheduler.schedule_missed_workout_reminder(!disabled),
        ReminderCommand::Weekly {
            disabled,
        } => scheduler.schedule_weekly_report(!disabled),
        ReminderCommand::Cancel {
            id,
        } => {
            if scheduler.cancel(&ReminderId::new(id.as_str())).map_err(storage_error)? {
                stdout(&format!("cancelled {id}"))?;
                return Ok(ExitCode::SUCCESS);
            }
            return Err(CliError::new(format!("unknown reminder: {id}")));
        }
        ReminderCommand::CancelAll => {
            let count = scheduler.cancel_all().map_err(storage_error)?;
            stdout(&format!("cancelled {count} reminders"))?;
            return Ok(ExitCode::SUCCESS);
        }
        ReminderCommand::Poll => {
            let report = scheduler.poll().map_err(storage_error)?;
            stdout(&format!("fired {}, failed {}", report.fired.len(), report.failed.len()))?;
            return Ok(ExitCode::SUCCESS);
        }
    };
    let rule = scheduled.map_err(|err| CliError::new(err.to_string()))?;
    stdout(&format_rule(&rule))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `run` command.
async fn command_run(context: &RallyContext, legacy_path: Option<&Path>) -> CliResult<ExitCode> {
    let legacy = legacy_path.map(load_legacy_store).transpose()?;
    let startup = context.start(legacy);
    match startup.migration {
        Some(MigrationOutcome::Migrated {
            entries,
        }) => info!(entries, "legacy storage migrated"),
        Some(MigrationOutcome::AlreadyMigrated) => info!("legacy storage already migrated"),
        Some(MigrationOutcome::Failed {
            ..
        })
        | None => {}
    }
    let handle = startup.scheduler;
    info!("reminder scheduler running; press Ctrl-C to stop");
    let signal = tokio::signal::ctrl_c().await;
    handle.shutdown().await;
    signal.map_err(|err| CliError::new(format!("failed to wait for interrupt: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Fetch Command
// ============================================================================

/// Executes the `fetch` command.
async fn command_fetch(
    context: &RallyContext,
    url: String,
    namespace: &str,
    body: Option<&str>,
) -> CliResult<ExitCode> {
    let body = body
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|err| CliError::new(format!("invalid --body json: {err}")))?;
    let params = json!({ "url": url, "body": body });
    let request = match body {
        Some(body) => FetchRequest::post_json(url, body),
        None => FetchRequest::get(url),
    };
    let namespace = CacheNamespace::from_key(namespace);
    let value: Value = context
        .fetcher()
        .fetch(&namespace, &params, &request, context.retry())
        .await
        .map_err(|err| CliError::new(user_message(&err, context.dev_mode())))?;
    let rendered = serde_json::to_string_pretty(&value)
        .map_err(|err| CliError::new(format!("failed to render response: {err}")))?;
    stdout(&rendered)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a file while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: u64) -> CliResult<Vec<u8>> {
    let read_failed =
        |err: std::io::Error| CliError::new(format!("failed to read {}: {err}", path.display()));
    let file = File::open(path).map_err(read_failed)?;
    let size = file.metadata().map_err(read_failed)?.len();
    if size > max_bytes {
        return Err(CliError::new(format!(
            "{} is {size} bytes; limit is {max_bytes}",
            path.display()
        )));
    }
    let mut bytes = Vec::new();
    file.take(max_bytes.saturating_add(1)).read_to_end(&mut bytes).map_err(read_failed)?;
    if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > max_bytes {
        return Err(CliError::new(format!("{} exceeds {max_bytes} bytes", path.display())));
    }
    Ok(bytes)
}

/// Reads a legacy export into an in-memory store.
fn load_legacy_store(path: &Path) -> CliResult<Arc<dyn KeyValueStore>> {
    let bytes = read_bytes_with_limit(path, MAX_LEGACY_BYTES)?;
    let pairs = parse_legacy_export(&bytes)?;
    Ok(Arc::new(InMemoryKvStore::with_entries(pairs)))
}

/// Parses a legacy export: a JSON object whose string values are stored
/// verbatim and whose other values are stored as JSON text.
fn parse_legacy_export(bytes: &[u8]) -> CliResult<Vec<(String, String)>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| CliError::new(format!("legacy export is not json: {err}")))?;
    let Value::Object(entries) = value else {
        return Err(CliError::new("legacy export must be a json object".to_string()));
    };
    entries
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => Ok((key, text)),
            other => serde_json::to_string(&other)
                .map(|text| (key, text))
                .map_err(|err| CliError::new(format!("legacy value not encodable: {err}"))),
        })
        .collect()
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Renders one rule as a tab-separated line.
fn format_rule(rule: &ReminderRule) -> String {
    let at = rule
        .scheduled_at
        .to_utc_datetime()
        .map_or_else(|| rule.scheduled_at.to_string(), |at| at.to_string());
    let state = if rule.state.is_enabled() { "enabled" } else { "disabled" };
    format!(
        "{}\t{}\t{}\t{}\t{state}",
        rule.id,
        rule.kind.as_str(),
        at,
        rule.recurrence.pattern().unwrap_or("once"),
    )
}

/// Maps a store failure to a CLI error.
fn storage_error(err: rally_core::StorageError) -> CliError {
    CliError::new(format!("storage error: {err}"))
}

/// Writes a line to stdout, mapping failures to a CLI error.
fn stdout(message: &str) -> CliResult<()> {
    write_stdout_line(message)
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
