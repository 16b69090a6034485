//! CLI arguments and the resolved run configuration.
//!
//! Flags win over environment variables, which win over defaults.

use clap::{Parser, Subcommand};
use identity_core::{default_log_level, IdentifyInput};
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "IDENTITY_DB_PATH";
pub const LOG_DIR_ENV: &str = "IDENTITY_LOG_DIR";
pub const RUN_ENV: &str = "IDENTITY_ENV";
const DEFAULT_DB_FILE_NAME: &str = "identity.sqlite3";

/// Resolves contact observations into consolidated identities.
#[derive(Parser, Debug)]
#[command(name = "identity_cli", about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite contact database file
    #[arg(long = "db", global = true, env = DB_PATH_ENV, default_value = DEFAULT_DB_FILE_NAME)]
    pub db_path: PathBuf,

    /// trace|debug|info|warn|error [default: debug in debug builds, info otherwise]
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, global = true, env = LOG_DIR_ENV)]
    pub log_dir: Option<String>,

    /// Deployment environment; `production` hides store error detail
    #[arg(long = "run-env", global = true, env = RUN_ENV)]
    pub run_env: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve one (email, phone) observation
    Identify {
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "phone")]
        phone_number: Option<String>,
    },
    /// Print a health-check response
    Ping,
    /// Print the core library version
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Identify(IdentifyInput),
    Ping,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub command: CliCommand,
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub production: bool,
}

impl From<Cli> for CliConfig {
    fn from(cli: Cli) -> Self {
        let command = match cli.command {
            Command::Identify {
                email,
                phone_number,
            } => CliCommand::Identify(IdentifyInput {
                email,
                phone_number,
            }),
            Command::Ping => CliCommand::Ping,
            Command::Version => CliCommand::Version,
        };

        Self {
            command,
            db_path: cli.db_path,
            log_level: cli
                .log_level
                .unwrap_or_else(|| default_log_level().to_string()),
            log_dir: cli.log_dir,
            production: cli
                .run_env
                .is_some_and(|value| value.trim().eq_ignore_ascii_case("production")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, CliCommand, CliConfig, DB_PATH_ENV, LOG_DIR_ENV, RUN_ENV};
    use clap::{CommandFactory, Parser};
    use identity_core::IdentifyInput;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> CliConfig {
        CliConfig::from(Cli::try_parse_from(args).unwrap())
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn identify_collects_contact_flags() {
        let config = parse(&[
            "identity_cli",
            "identify",
            "--email",
            "doc@hillvalley.edu",
            "--phone",
            "1985",
        ]);

        assert_eq!(
            config.command,
            CliCommand::Identify(IdentifyInput {
                email: Some("doc@hillvalley.edu".to_string()),
                phone_number: Some("1985".to_string()),
            })
        );
    }

    #[test]
    fn global_flags_are_accepted_around_the_command() {
        let config = parse(&[
            "identity_cli",
            "--db",
            "/tmp/flag.db",
            "ping",
            "--run-env",
            "Production",
            "--log-level",
            "warn",
        ]);
        assert_eq!(config.command, CliCommand::Ping);
        assert_eq!(config.db_path, PathBuf::from("/tmp/flag.db"));
        assert_eq!(config.log_level, "warn");
        assert!(config.production);
    }

    #[test]
    fn settings_fall_back_to_environment() {
        let command = Cli::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(OsStr::to_os_string)
        };

        assert_eq!(env_of("db_path").as_deref(), Some(OsStr::new(DB_PATH_ENV)));
        assert_eq!(env_of("log_dir").as_deref(), Some(OsStr::new(LOG_DIR_ENV)));
        assert_eq!(env_of("run_env").as_deref(), Some(OsStr::new(RUN_ENV)));
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["identity_cli"]).is_err());
        assert!(Cli::try_parse_from(["identity_cli", "merge"]).is_err());
        assert!(Cli::try_parse_from(["identity_cli", "identify", "--email"]).is_err());
        assert!(Cli::try_parse_from(["identity_cli", "identify", "--fax", "1"]).is_err());
    }
}
