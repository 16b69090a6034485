//! CLI entry point for identity reconciliation.
//!
//! # Responsibility
//! - Run one identify call against a SQLite contact database.
//! - Print the `{"contact": ...}` envelope, or `{"error": ...}` on failure.
//! - Keep store error detail out of output when running in production.

mod config;

use clap::Parser;
use config::{Cli, CliCommand, CliConfig};
use identity_core::db::open_db;
use identity_core::{
    core_version, init_logging, ping, IdentifyInput, IdentifyResponse, IdentityError,
    IdentityService, Resolution, SqliteContactStore,
};
use log::error;
use std::process::ExitCode;

const GENERIC_FAILURE: &str = "Internal server error";
const EXIT_OK: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_INVALID_REQUEST: u8 = 2;

/// Exit status and stdout body of one identify run.
#[derive(Debug, PartialEq, Eq)]
struct Reply {
    exit_code: u8,
    body: String,
}

impl Reply {
    fn failure(exit_code: u8, message: &str) -> Self {
        Self {
            exit_code,
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }
}

fn main() -> ExitCode {
    // clap exits with status 2 on malformed arguments.
    let config = CliConfig::from(Cli::parse());

    if let Some(log_dir) = config.log_dir.as_deref() {
        if let Err(message) = init_logging(&config.log_level, log_dir) {
            eprintln!("logging disabled: {message}");
        }
    }

    match &config.command {
        CliCommand::Ping => {
            println!("identity_core ping={}", ping());
            ExitCode::SUCCESS
        }
        CliCommand::Version => {
            println!("identity_core version={}", core_version());
            ExitCode::SUCCESS
        }
        CliCommand::Identify(input) => {
            let reply = run_identify(&config, input);
            println!("{}", reply.body);
            ExitCode::from(reply.exit_code)
        }
    }
}

fn run_identify(config: &CliConfig, input: &IdentifyInput) -> Reply {
    let conn = match open_db(&config.db_path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=cli_identify module=cli status=error error_code={}",
                err.code()
            );
            return Reply::failure(
                EXIT_FAILURE,
                &failure_message(config.production, &err.to_string()),
            );
        }
    };

    let service = IdentityService::new(SqliteContactStore::new(&conn));
    identify_reply(service.identify_input(input), config.production)
}

/// Maps an identify result onto the process exit status and output envelope.
fn identify_reply(result: Result<Resolution, IdentityError>, production: bool) -> Reply {
    match result {
        Ok(resolution) => {
            match serde_json::to_string_pretty(&IdentifyResponse::from(resolution.identity)) {
                Ok(body) => Reply {
                    exit_code: EXIT_OK,
                    body,
                },
                Err(err) => {
                    Reply::failure(EXIT_FAILURE, &failure_message(production, &err.to_string()))
                }
            }
        }
        Err(IdentityError::InvalidRequest(err)) => {
            Reply::failure(EXIT_INVALID_REQUEST, &err.to_string())
        }
        Err(err @ IdentityError::Store(_)) => {
            Reply::failure(EXIT_FAILURE, &failure_message(production, &err.to_string()))
        }
    }
}

/// Store detail is shown only outside production.
fn failure_message(production: bool, detail: &str) -> String {
    if production {
        GENERIC_FAILURE.to_string()
    } else {
        detail.to_string()
    }
}
