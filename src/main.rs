use sqlguard::config::{load_config, ConnectionConfig, Profile};
use sqlguard::{Database, Statement};
use std::process::ExitCode;
use tracing::info;

const USAGE: &str = "usage: sqlguard [--config FILE] [--profile standard|stability] <database> <sql>...";

struct Args {
    config: ConnectionConfig,
    database: String,
    statements: Vec<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut config: Option<ConnectionConfig> = None;
    let mut profile: Option<Profile> = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a file")?;
                config = Some(load_config(&path).map_err(|e| e.to_string())?.connection);
            }
            "--profile" => {
                let name = args.next().ok_or("--profile needs a name")?;
                profile = Some(name.parse().map_err(|e: sqlguard::GuardError| e.to_string())?);
            }
            _ => positional.push(arg),
        }
    }

    let mut config = config.unwrap_or_else(ConnectionConfig::from_env);
    if let Some(profile) = profile {
        config.profile = profile;
    }

    let mut positional = positional.into_iter();
    let database = positional.next().ok_or(USAGE)?;
    let statements: Vec<String> = positional.collect();
    if statements.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(Args {
        config,
        database,
        statements,
    })
}

fn main() -> ExitCode {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt::init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    info!("Opening {} ({:?} profile)", args.database, args.config.profile);
    let db = Database::open_sqlite(&args.database, &args.config);
    if !db.is_ready() {
        eprintln!("Failed to open database: {}", args.database);
        return ExitCode::FAILURE;
    }

    let mut failed = false;
    for sql in &args.statements {
        match db.execute_statement(&Statement::new(sql).count_changes()) {
            Ok(execution) => {
                for row in &execution.rows.rows {
                    println!("{}", row.join("|"));
                }
                println!("changes: {}", execution.changes.unwrap_or_default());
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
