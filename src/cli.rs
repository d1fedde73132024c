use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::Shell;

#[derive(Parser)]
#[command(
    about,
    author,
    version,
    propagate_version = true,
    args_conflicts_with_subcommands = true
)]
pub struct Opt {
    /// Location of the keychain file. Defaults to `.2fa` in the home directory.
    #[arg(short, long, global = true, env = "TWOFA_KEYCHAIN", value_hint = ValueHint::FilePath)]
    pub keychain: Option<PathBuf>,
    /// Increase the log output, can be repeated up to three times. The `TWOFA_LOG` environment
    /// variable takes precedence if set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(flatten)]
    pub list: ListArgs,
    #[command(subcommand)]
    pub cmd: Option<Command>,
}

impl Opt {
    pub fn parse() -> Self {
        <Opt as Parser>::parse()
    }
}

#[derive(Args)]
pub struct ListArgs {
    /// Only show accounts whose issuer or label contain this text, ignoring case.
    pub query: Option<String>,
    /// Print the codes as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
    /// Don't write advanced counters of counter based accounts back to the keychain.
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the current codes of all (or matching) accounts. This is the default command.
    List(ListArgs),
    /// Add a new account from an `otpauth://` provisioning URI.
    Add {
        /// The provisioning URI, like
        /// `otpauth://totp/Example:alice@google.com?issuer=Example&secret=JBSWY3DPEHPK3PXP`.
        uri: String,
    },
    /// Print the canonical provisioning URI of all (or matching) accounts, without generating
    /// codes.
    Uri {
        /// Only show accounts whose issuer or label contain this text, ignoring case.
        query: Option<String>,
    },
    /// Generate auto-completion scripts for various shells.
    Completions {
        /// Shell to generate an auto-completion script for.
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Generate man pages into the given directory.
    Manpages {
        /// Target directory, that must already exist and be empty. If the any file with the same
        /// name as any of the man pages already exist, it'll not be overwritten, but instead an
        /// error be returned.
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
    },
}

#[allow(clippy::unnecessary_wraps)]
pub fn completions(shell: Shell) -> Result<()> {
    clap_complete::generate(
        shell,
        &mut Opt::command(),
        env!("CARGO_PKG_NAME"),
        &mut io::stdout().lock(),
    );
    Ok(())
}

pub fn manpages(dir: &Path) -> Result<()> {
    fn print(dir: &Path, app: &clap::Command) -> Result<()> {
        let name = app.get_display_name().unwrap_or_else(|| app.get_name());
        let out = dir.join(format!("{name}.1"));
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&out)
            .with_context(|| format!("the file `{}` already exists", out.display()))?;

        clap_mangen::Man::new(app.clone()).render(&mut out)?;
        out.flush()?;

        for sub in app.get_subcommands() {
            print(dir, sub)?;
        }

        Ok(())
    }

    ensure!(dir.try_exists()?, "target directory doesn't exist");

    let mut app = Opt::command();
    app.build();

    print(dir, &app)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opt {
        Opt::try_parse_from(std::iter::once("twofa").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn verify() {
        Opt::command().debug_assert();
    }

    #[test]
    fn bare_query_lists() {
        let opt = parse(&["exam"]);

        assert!(opt.cmd.is_none());
        assert_eq!(Some("exam"), opt.list.query.as_deref());
    }

    #[test]
    fn add_subcommand() {
        let opt = parse(&["add", "-k", "/tmp/keys", "otpauth://totp/a?secret=AAAA"]);

        assert_eq!(Some(Path::new("/tmp/keys")), opt.keychain.as_deref());
        assert!(
            matches!(opt.cmd, Some(Command::Add { uri }) if uri == "otpauth://totp/a?secret=AAAA")
        );
    }

    #[test]
    fn verbosity() {
        let opt = parse(&["list", "-vv", "--json"]);

        assert_eq!(2, opt.verbose);
        assert!(matches!(opt.cmd, Some(Command::List(ListArgs { json: true, .. }))));
    }
}
