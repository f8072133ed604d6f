use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use wasteph_backend::{
    auth::{password::hash_password, Role},
    config::AppConfig,
    db, inquiry_number, maintenance,
    models::NewUser,
    schema::users,
};

const USAGE: &str = "Usage: maintenance <command>\n\
    \n\
    Commands:\n  \
      migrate                               apply pending migrations\n  \
      cleanup-orphans [--dry-run]           remove rows pointing at deleted inquiries/proposals\n  \
      sync-inquiry-sequence                 align the inquiry number sequence with existing rows\n  \
      create-user <username> <password> <role>\n  \
      hash-password <password>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    match command.as_str() {
        "hash-password" => {
            let password = args.get(1).context("hash-password needs a password")?;
            println!("{}", hash_password(password)?);
        }
        "migrate" => {
            let mut conn = connect()?;
            let applied = db::run_migrations(&mut conn)?;
            if applied.is_empty() {
                println!("No pending migrations.");
            } else {
                for version in applied {
                    println!("Applied {version}");
                }
            }
        }
        "cleanup-orphans" => {
            let dry_run = args.iter().any(|arg| arg == "--dry-run");
            let mut conn = connect()?;
            let report = if dry_run {
                maintenance::count_orphans(&mut conn).context("failed to count orphans")?
            } else {
                maintenance::cleanup_orphans(&mut conn).context("failed to clean up orphans")?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            let verb = if dry_run { "would be affected" } else { "affected" };
            println!("{} rows {verb}.", report.total());
        }
        "sync-inquiry-sequence" => {
            let mut conn = connect()?;
            let next = inquiry_number::sync_sequence(&mut conn)
                .context("failed to synchronise inquiry sequence")?;
            println!(
                "Next inquiry number: {}",
                inquiry_number::format_inquiry_number(next)
            );
        }
        "create-user" => {
            let [username, password, role] = [args.get(1), args.get(2), args.get(3)];
            let (Some(username), Some(password), Some(role)) = (username, password, role) else {
                bail!("create-user needs <username> <password> <role>");
            };
            let role: Role = role
                .parse()
                .map_err(|_| anyhow::anyhow!("role must be admin, manager or sales"))?;
            let mut conn = connect()?;
            let id = Uuid::new_v4();
            diesel::insert_into(users::table)
                .values(NewUser {
                    id,
                    username: username.trim().to_string(),
                    password_hash: hash_password(password)?,
                    role: role.as_str().to_string(),
                })
                .execute(&mut conn)
                .context("failed to insert user")?;
            println!("Created {role} user {username} ({id}).");
        }
        other => {
            eprintln!("Unknown command: {other}\n{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<PgConnection> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded backend configuration"
    );
    PgConnection::establish(&config.database_url).context("failed to connect to database")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
