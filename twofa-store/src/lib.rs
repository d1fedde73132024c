//! # Twofa Store
//!
//! The storage component for **twofa** manages the keychain, a plain text file with one canonical
//! `otpauth://` URI per line. Blank lines and lines starting with `#` are ignored when looking
//! for accounts, but kept as they are when the keychain is written back.
//!
//! Secrets are stored in cleartext, the file is only protected by its permissions.

#![deny(rust_2018_idioms, clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use std::{
    fs::{File, OpenOptions},
    io::{self, prelude::*, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use tempfile::NamedTempFile;
use tracing::debug;
use twofa_core::{Account, ParseError};

/// Name of the keychain file inside the home directory.
const FILE_NAME: &str = ".2fa";

/// Errors that can occur when loading or writing a keychain.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to find the home directory of the executing user.
    #[error("failed to find the home folder")]
    HomefolderNotFound,
    /// An I/O related error happened.
    #[error("I/O bound error")]
    Io(#[from] io::Error),
    /// A line of the keychain didn't contain a valid account. Lines are counted from `1`.
    #[error("failed parsing line {line} of the keychain")]
    Parse { line: usize, source: ParseError },
    /// A new account couldn't be parsed.
    #[error("failed parsing the account URI")]
    InvalidAccount(#[from] ParseError),
    /// The rewritten keychain couldn't be moved into place.
    #[error("failed replacing the keychain file")]
    Persist(#[from] tempfile::PersistError),
}

/// A single line of the keychain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// A provisioned account.
    Account(Account),
    /// Blank or comment line, kept verbatim.
    Other(String),
}

/// Ordered collection of accounts as loaded from a keychain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Keychain {
    entries: Vec<Entry>,
}

impl Keychain {
    /// Read all lines from the reader. The first line that fails to parse aborts the whole load.
    pub fn load(reader: impl BufRead) -> Result<Self, Error> {
        let mut entries = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                entries.push(Entry::Other(line));
                continue;
            }

            let account = trimmed
                .parse()
                .map_err(|source| Error::Parse { line: i + 1, source })?;
            entries.push(Entry::Account(account));
        }

        Ok(Self { entries })
    }

    /// Write all entries back, one per line, with accounts in their canonical form.
    pub fn write(&self, mut writer: impl Write) -> Result<(), Error> {
        for entry in &self.entries {
            match entry {
                Entry::Account(account) => writeln!(writer, "{account}")?,
                Entry::Other(line) => writeln!(writer, "{line}")?,
            }
        }

        writer.flush().map_err(Into::into)
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Account(a) => Some(a),
            Entry::Other(_) => None,
        })
    }

    pub fn accounts_mut(&mut self) -> impl Iterator<Item = &mut Account> {
        self.entries.iter_mut().filter_map(|e| match e {
            Entry::Account(a) => Some(a),
            Entry::Other(_) => None,
        })
    }

    /// All accounts that [`matches`] the query, in keychain order.
    pub fn filter<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a Account> {
        self.accounts().filter(move |a| matches(a, query))
    }

    /// Mutable variant of [`Self::filter`], needed to advance counters of matching accounts.
    pub fn filter_mut<'a>(&'a mut self, query: &'a str) -> impl Iterator<Item = &'a mut Account> {
        self.accounts_mut().filter(move |a| matches(a, query))
    }

    /// Amount of accounts, not counting blank or comment lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts().next().is_none()
    }
}

/// Check whether the issuer or label of an account contain the query, ignoring case. An empty
/// query matches every account.
#[must_use]
pub fn matches(account: &Account, query: &str) -> bool {
    let query = query.to_lowercase();

    account.issuer.to_lowercase().contains(&query) || account.label.to_lowercase().contains(&query)
}

/// Parse the URI and append its canonical form as new line to the writer.
pub fn append(writer: impl Write, uri: &str) -> Result<Account, Error> {
    let account = uri.trim().parse::<Account>()?;
    write_account(writer, &account)?;

    Ok(account)
}

fn write_account(mut writer: impl Write, account: &Account) -> Result<(), Error> {
    writeln!(writer, "{account}")?;
    writer.flush().map_err(Into::into)
}

/// Location of the keychain if none was configured.
pub fn default_path() -> Result<PathBuf, Error> {
    Ok(BaseDirs::new()
        .ok_or(Error::HomefolderNotFound)?
        .home_dir()
        .join(FILE_NAME))
}

/// Load the keychain at the given path, creating an empty file if it doesn't exist yet.
pub fn open(path: &Path) -> Result<Keychain, Error> {
    let keychain = match File::open(path) {
        Ok(file) => Keychain::load(BufReader::new(file))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            options().write(true).create_new(true).open(path)?;
            debug!(path = %path.display(), "created empty keychain");
            Keychain::default()
        }
        Err(e) => return Err(e.into()),
    };

    debug!(path = %path.display(), accounts = keychain.len(), "loaded keychain");

    Ok(keychain)
}

/// Parse the URI and append it to the keychain at the given path, creating the file if needed.
///
/// Nothing is written, and no file created, if the URI is invalid.
pub fn add(path: &Path, uri: &str) -> Result<Account, Error> {
    let account = uri.trim().parse::<Account>()?;
    let file = options().append(true).create(true).open(path)?;

    write_account(file, &account)?;

    debug!(path = %path.display(), label = %account.label, "added account");

    Ok(account)
}

/// Replace the keychain at the given path with the current state of the keychain.
///
/// The content is written to a temporary file next to the target first and then moved into place,
/// so the keychain is never left partially written.
pub fn save(path: &Path, keychain: &Keychain) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    keychain.write(BufWriter::new(file.as_file_mut()))?;
    file.as_file().sync_all()?;
    file.persist(path)?;

    debug!(path = %path.display(), accounts = keychain.len(), "saved keychain");

    Ok(())
}

fn options() -> OpenOptions {
    #[allow(unused_mut)]
    let mut options = File::options();

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
}
