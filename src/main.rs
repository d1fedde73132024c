#![deny(rust_2018_idioms, clippy::all, clippy::pedantic)]

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use twofa_core::Otp;
use twofa_gen::SystemClock;

use crate::{
    cli::{Command, ListArgs, Opt},
    output::Row,
};

mod cli;
mod output;

fn main() -> Result<()> {
    let opt = Opt::parse();

    logging(opt.verbose);

    let keychain = opt.keychain;

    match opt.cmd {
        None => list(&keychain_path(keychain)?, &opt.list),
        Some(cmd) => match cmd {
            Command::List(args) => list(&keychain_path(keychain)?, &args),
            Command::Add { uri } => add(&keychain_path(keychain)?, &uri),
            Command::Uri { query } => uri(&keychain_path(keychain)?, query.as_deref()),
            Command::Completions { shell } => cli::completions(shell),
            Command::Manpages { dir } => cli::manpages(&dir),
        },
    }
}

fn logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("TWOFA_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

fn keychain_path(configured: Option<PathBuf>) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path),
        None => twofa_store::default_path().context("failed locating the keychain"),
    }
}

fn open(path: &Path) -> Result<twofa_store::Keychain> {
    twofa_store::open(path)
        .with_context(|| format!("failed loading the keychain `{}`", path.display()))
}

fn list(path: &Path, args: &ListArgs) -> Result<()> {
    let mut keychain = open(path)?;
    let query = args.query.as_deref().unwrap_or_default();

    let mut rows = Vec::new();
    let mut advanced = 0;

    for account in keychain.filter_mut(query) {
        let code = twofa_gen::evaluate(account, &SystemClock)
            .with_context(|| format!("failed generating a code for `{}`", account.label))?;

        if matches!(account.otp, Otp::Hotp { .. }) {
            advanced += 1;
        }

        rows.push(Row::new(account, &code));
    }

    if advanced > 0 {
        if args.no_save {
            info!(advanced, "not saving advanced counters");
        } else {
            twofa_store::save(path, &keychain)
                .with_context(|| format!("failed saving the keychain `{}`", path.display()))?;
            debug!(advanced, "saved advanced counters");
        }
    }

    if args.json {
        output::json(io::stdout().lock(), &rows)
    } else {
        output::table(io::stdout().lock(), &rows).map_err(Into::into)
    }
}

fn add(path: &Path, uri: &str) -> Result<()> {
    let account = twofa_store::add(path, uri)
        .with_context(|| format!("failed adding the account to `{}`", path.display()))?;

    println!("{account}");

    Ok(())
}

fn uri(path: &Path, query: Option<&str>) -> Result<()> {
    let keychain = open(path)?;

    for account in keychain.filter(query.unwrap_or_default()) {
        println!("{account}");
    }

    Ok(())
}
