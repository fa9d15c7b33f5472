//! Command-line front end for catalog export and reconciliation.
//!
//! # Responsibility
//! - Export a category as JSON snapshot text.
//! - Apply an edited snapshot, optionally as a simulation, and print the
//!   change report.
//!
//! # Usage
//! ```text
//! catalog_cli <db> export <statement-type> <variable>
//! catalog_cli <db> apply <statement-type> <variable> <snapshot.json> [--simulate]
//! catalog_cli version
//! ```
//!
//! Logging starts when `CATALOG_SYNC_LOG_DIR` names an absolute directory;
//! `CATALOG_SYNC_LOG_LEVEL` overrides the default level.

use catalog_core::{
    core_version, default_log_level, init_logging, open_db, ReconcileService, Snapshot,
    SnapshotService, SqliteCatalogStore,
};
use log::warn;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

const LOG_DIR_ENV: &str = "CATALOG_SYNC_LOG_DIR";
const LOG_LEVEL_ENV: &str = "CATALOG_SYNC_LOG_LEVEL";
const USAGE: &str = "usage:
  catalog_cli <db> export <statement-type> <variable>
  catalog_cli <db> apply <statement-type> <variable> <snapshot.json> [--simulate]
  catalog_cli version";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Version,
    Export {
        db: PathBuf,
        statement_type: String,
        variable: String,
    },
    Apply {
        db: PathBuf,
        statement_type: String,
        variable: String,
        snapshot: PathBuf,
        simulate: bool,
    },
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let simulate = args.iter().any(|arg| arg == "--simulate");
    let positional: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|arg| *arg != "--simulate")
        .collect();

    match positional.as_slice() {
        ["version"] => Ok(Command::Version),
        [db, "export", statement_type, variable] if !simulate => Ok(Command::Export {
            db: PathBuf::from(db),
            statement_type: statement_type.to_string(),
            variable: variable.to_string(),
        }),
        [db, "apply", statement_type, variable, snapshot] => Ok(Command::Apply {
            db: PathBuf::from(db),
            statement_type: statement_type.to_string(),
            variable: variable.to_string(),
            snapshot: PathBuf::from(snapshot),
            simulate,
        }),
        _ => Err(USAGE.to_string()),
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Version => {
            println!("catalog_core version={}", core_version());
        }
        Command::Export {
            db,
            statement_type,
            variable,
        } => {
            let conn = open_db(&db)?;
            let service = SnapshotService::new(SqliteCatalogStore::try_new(&conn)?);
            let snapshot = service.export_by_names(&statement_type, &variable)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Apply {
            db,
            statement_type,
            variable,
            snapshot,
            simulate,
        } => {
            let text = std::fs::read_to_string(&snapshot)
                .map_err(|err| format!("cannot read `{}`: {err}", snapshot.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&text)?;

            let conn = open_db(&db)?;
            let service = ReconcileService::new(SqliteCatalogStore::try_new(&conn)?);
            let report =
                service.reconcile_by_names(&statement_type, &variable, &snapshot, simulate)?;
            println!("{report}");
        }
    }
    Ok(())
}

fn start_logging_from_env() {
    let Ok(log_dir) = std::env::var(LOG_DIR_ENV) else {
        return;
    };
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| default_log_level().to_string());
    if let Err(err) = init_logging(&level, &log_dir) {
        eprintln!("logging disabled: {err}");
    }
}

fn main() -> ExitCode {
    start_logging_from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(usage) => {
            eprintln!("{usage}");
            return ExitCode::from(2);
        }
    };

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            warn!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
