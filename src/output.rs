use std::io::{self, Write};

use serde::Serialize;
use twofa_core::Account;
use twofa_gen::OtpCode;

/// A single generated code, ready to be printed.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Row {
    pub code: String,
    pub issuer: String,
    pub label: String,
    /// Seconds until the code expires, absent for counter based accounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
}

impl Row {
    pub fn new(account: &Account, code: &OtpCode) -> Self {
        Self {
            code: code.to_string(),
            issuer: account.issuer.clone(),
            label: account.label.clone(),
            remaining: code.remaining.map(|r| r.as_secs()),
        }
    }

    fn remaining(&self) -> String {
        self.remaining
            .map_or_else(|| "-".to_owned(), |secs| format!("{secs}s"))
    }
}

/// Print the rows as table with left aligned columns, separated by two spaces.
pub fn table(mut out: impl Write, rows: &[Row]) -> io::Result<()> {
    let width = |f: fn(&Row) -> usize| rows.iter().map(f).max().unwrap_or_default();
    let code = width(|r| r.code.len());
    let issuer = width(|r| r.issuer.chars().count());
    let label = width(|r| r.label.chars().count());

    for row in rows {
        let line = format!(
            "{:<code$}  {:<issuer$}  {:<label$}  {}",
            row.code,
            row.issuer,
            row.label,
            row.remaining(),
        );
        writeln!(out, "{}", line.trim_end())?;
    }

    out.flush()
}

pub fn json(mut out: impl Write, rows: &[Row]) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut out, rows)?;
    writeln!(out)?;

    Ok(())
}
