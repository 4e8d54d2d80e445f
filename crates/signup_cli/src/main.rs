//! Command-line front end for the signup ledger.
//!
//! # Responsibility
//! - Expose registry and ledger use-cases for local operation and smoke checks.
//! - Map client rejections to exit code 2 and server faults to exit code 1.

use clap::{Parser, Subcommand};
use log::error;
use signup_core::db::{open_db_with_options, DbError};
use signup_core::{
    default_log_level, init_logging, DbOptions, LedgerError, LedgerService, MoveOutcome,
    RegistryService, SqliteAssignmentLedger, SqliteResourceRepository,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use uuid::Uuid;

const EXIT_FAULT: u8 = 1;
const EXIT_REJECTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "signup", version, about = "Capacity-constrained signup ledger")]
struct Cli {
    /// SQLite database file.
    #[arg(long, default_value = "signup.sqlite3")]
    db: PathBuf,
    /// Log level (trace|debug|info|warn|error). Defaults by build mode.
    #[arg(long)]
    log_level: Option<String>,
    /// Directory for rolling log files. Logging is off when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Write-lock wait before an operation fails as busy.
    #[arg(long, default_value_t = 5000)]
    busy_timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print core linkage info.
    Ping,
    #[command(flatten)]
    Ledger(LedgerCommand),
}

/// Commands that need an open database.
#[derive(Debug, Subcommand)]
enum LedgerCommand {
    /// Create an empty resource with a fixed capacity.
    CreateResource {
        name: String,
        #[arg(long)]
        capacity: u32,
    },
    /// Show occupancy and assignments of one resource.
    Show { resource: Uuid },
    /// Sign a participant up for a resource.
    Signup { resource: Uuid, participant: Uuid },
    /// Cancel one assignment.
    Cancel { assignment: Uuid },
    /// Move an assignment to another resource.
    Move { assignment: Uuid, resource: Uuid },
    /// Rebuild a resource counter from its assignments.
    Recount { resource: Uuid },
}

#[derive(Debug)]
enum CliError {
    Logging(String),
    Db(DbError),
    Ledger(LedgerError),
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<LedgerError> for CliError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Ledger(err)) if err.is_client_rejection() => {
            eprintln!("rejected: {err}");
            ExitCode::from(EXIT_REJECTED)
        }
        Err(CliError::Ledger(err)) => {
            error!("event=cli_command module=cli status=error error_code={} error={err}", err.code());
            eprintln!("error: {err}");
            if err.is_retryable() {
                eprintln!("hint: the datastore was busy; retry the command");
            }
            ExitCode::from(EXIT_FAULT)
        }
        Err(CliError::Db(err)) => {
            eprintln!("error: failed to open database: {err}");
            ExitCode::from(EXIT_FAULT)
        }
        Err(CliError::Logging(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(EXIT_FAULT)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Some(log_dir) = &cli.log_dir {
        let log_dir = std::path::absolute(log_dir)
            .map_err(|err| CliError::Logging(format!("invalid log directory: {err}")))?;
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, &log_dir.to_string_lossy())
            .map_err(|err| CliError::Logging(err.to_string()))?;
    }

    match cli.command {
        Command::Ping => {
            println!("signup_core ping={}", signup_core::ping());
            println!("signup_core version={}", signup_core::core_version());
            Ok(())
        }
        Command::Ledger(command) => {
            let options = DbOptions {
                busy_timeout: Duration::from_millis(cli.busy_timeout_ms),
            };
            run_ledger_command(&cli.db, options, command)
        }
    }
}

fn run_ledger_command(
    db: &Path,
    options: DbOptions,
    command: LedgerCommand,
) -> Result<(), CliError> {
    let conn = open_db_with_options(db, options)?;
    let registry = RegistryService::new(SqliteResourceRepository::try_new(&conn)?);
    let ledger = LedgerService::new(SqliteAssignmentLedger::try_new(&conn)?);

    match command {
        LedgerCommand::CreateResource { name, capacity } => {
            let resource = registry.create_resource(name, capacity)?;
            println!("{}", resource.uuid);
        }
        LedgerCommand::Show { resource } => {
            let record = registry
                .get_resource(resource)?
                .ok_or(LedgerError::NotFound(signup_core::MissingEntity::Resource(
                    resource,
                )))?;
            println!(
                "{} name={:?} assigned={} capacity={} remaining={}",
                record.uuid,
                record.name,
                record.assigned,
                record.capacity,
                record.snapshot().remaining()
            );
            for assignment in ledger.list_assignments(resource)? {
                println!(
                    "  assignment={} participant={}",
                    assignment.uuid, assignment.participant_uuid
                );
            }
        }
        LedgerCommand::Signup {
            resource,
            participant,
        } => {
            let assignment = ledger.signup(resource, participant)?;
            println!("{}", assignment.uuid);
        }
        LedgerCommand::Cancel { assignment } => {
            let removed = ledger.cancel(assignment)?;
            println!("cancelled {} on {}", removed.uuid, removed.resource_uuid);
        }
        LedgerCommand::Move {
            assignment,
            resource,
        } => match ledger.reassign(assignment, resource)? {
            MoveOutcome::Unchanged(_) => println!("unchanged"),
            MoveOutcome::Moved { assignment, from } => {
                println!("moved {} from {} to {}", assignment.uuid, from, assignment.resource_uuid)
            }
        },
        LedgerCommand::Recount { resource } => {
            let report = registry.recount_assigned(resource)?;
            println!(
                "{} previous={} recounted={} capacity={}",
                report.resource_uuid, report.previous, report.recounted, report.capacity
            );
        }
    }

    Ok(())
}
