//! CloudID NSS command-line entry point.
//!
//! Resolves a single database query the way `getent` does and prints the
//! matching lines. Exit status: 0 found, 2 not found, 1 directory
//! unavailable.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use cloudid_nss::config::AppConfig;
use cloudid_nss::domain::{Lookup, LookupStatus, ResolvedGroup, ResolvedUser, ShadowRecord};
use cloudid_nss::service::IdentityResolver;
use cloudid_nss::{build_resolver, init_logging};

/// Query directory-backed POSIX identities.
#[derive(Parser, Debug)]
#[command(name = "cloudid-nss", version, about)]
struct Cli {
    /// Database to query.
    #[arg(value_enum)]
    database: Database,

    /// Name or numeric id; omit to enumerate.
    key: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Database {
    Passwd,
    Group,
    Shadow,
}

const fn exit_code(status: LookupStatus) -> u8 {
    match status {
        LookupStatus::Success => 0,
        LookupStatus::NotFound => 2,
        LookupStatus::Unavailable => 1,
    }
}

fn print_one<T>(lookup: Lookup<T>, render: impl Fn(&T) -> String) -> LookupStatus {
    if lookup.is_success() {
        println!("{}", render(&lookup.data));
    }
    lookup.status
}

fn print_all<T>(lookup: Lookup<Vec<T>>, render: impl Fn(&T) -> String) -> LookupStatus {
    for entry in &lookup.data {
        println!("{}", render(entry));
    }
    lookup.status
}

async fn query(resolver: &IdentityResolver, database: Database, key: Option<&str>) -> LookupStatus {
    let id = key.and_then(|k| k.parse::<u32>().ok());

    match (database, key, id) {
        (Database::Passwd, None, _) => {
            print_all(resolver.passwd_all().await, ResolvedUser::to_passwd_line)
        }
        (Database::Passwd, Some(_), Some(uid)) => {
            print_one(resolver.passwd_by_uid(uid).await, ResolvedUser::to_passwd_line)
        }
        (Database::Passwd, Some(name), None) => {
            print_one(resolver.passwd_by_name(name).await, ResolvedUser::to_passwd_line)
        }
        (Database::Group, None, _) => {
            print_all(resolver.group_all().await, ResolvedGroup::to_group_line)
        }
        (Database::Group, Some(_), Some(gid)) => {
            print_one(resolver.group_by_gid(gid).await, ResolvedGroup::to_group_line)
        }
        (Database::Group, Some(name), None) => {
            print_one(resolver.group_by_name(name).await, ResolvedGroup::to_group_line)
        }
        (Database::Shadow, None, _) => {
            print_all(resolver.shadow_all().await, ShadowRecord::to_shadow_line)
        }
        (Database::Shadow, Some(name), _) => {
            print_one(resolver.shadow_by_name(name).await, ShadowRecord::to_shadow_line)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_logging(&config.observability);

    let resolver = build_resolver(config).context("failed to create directory client")?;
    let status = query(&resolver, cli.database, cli.key.as_deref()).await;

    Ok(ExitCode::from(exit_code(status)))
}
