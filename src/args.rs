use crate::errors::*;
use crate::provider::Backend;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::ffi::OsString;
use std::io::stdout;
use std::path::PathBuf;
use tokio::fs;
use tokio::io;
use tokio::io::AsyncReadExt;

#[derive(Debug, Clone)]
pub enum FileOrStdin {
    File(PathBuf),
    Stdin,
}

impl FileOrStdin {
    /// If the given list is empty, select stdin as input
    pub fn default_stdin(list: &mut Vec<Self>) {
        if list.is_empty() {
            list.push(Self::Stdin);
        }
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        let buf = match self {
            Self::File(path) => fs::read(&path)
                .await
                .with_context(|| anyhow!("Failed to read file at path: {path:?}"))?,
            Self::Stdin => {
                let mut buf = Vec::new();
                let mut stdin = io::stdin();
                stdin.read_to_end(&mut buf).await?;
                buf
            }
        };
        Ok(buf)
    }
}

impl From<OsString> for FileOrStdin {
    fn from(s: OsString) -> Self {
        if s.to_str() == Some("-") {
            Self::Stdin
        } else {
            Self::File(s.into())
        }
    }
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    /// Increase logging output (can be used multiple times)
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub verbose: u8,
    /// Reduce logging output (can be used multiple times)
    #[arg(short, long, global = true, action(ArgAction::Count))]
    pub quiet: u8,
    /// Path to config file to use
    #[arg(short, long, global = true, env = "COMMIT_SIGCHECK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Always enable colored output
    #[arg(short = 'C', long, global = true)]
    pub colors: bool,
    #[command(subcommand)]
    pub subcommand: SubCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubCommand {
    #[command(visible_alias = "sigcheck")]
    Verify(Verify),
    WriteKeyfile(WriteKeyfile),
    Keyring(Keyring),
    #[command(subcommand)]
    Plumbing(Plumbing),
    Completions(Completions),
}

/// Keys that signatures are accepted from
#[derive(Debug, Default, Clone, clap::Args)]
pub struct KeyArgs {
    /// Path to an armored public key file to trust (can be used multiple times)
    #[arg(short, long = "key", visible_alias = "pub-key-file")]
    pub keys: Vec<PathBuf>,
    /// Do not trust the default key, only the configured keyrings and --key
    #[arg(long)]
    pub no_default_key: bool,
}

/// Verify the signature of a commit before using files from it
#[derive(Debug, Parser)]
pub struct Verify {
    /// Path to the git repository
    #[arg(short, long, visible_alias = "dir", default_value = ".")]
    pub path: PathBuf,
    /// Commit sha or reference to check
    #[arg(short, long = "ref", default_value = "HEAD")]
    pub reference: String,
    #[command(flatten)]
    pub keys: KeyArgs,
    /// How the commit is read from the repository
    #[arg(long, value_enum, default_value_t)]
    pub backend: Backend,
    /// Only accept a signature in the commit headers, not anywhere in the commit text
    #[arg(long)]
    pub strict_headers: bool,
}

/// Combine multiple public keys into one keyring file
#[derive(Debug, Parser)]
pub struct WriteKeyfile {
    /// Path to the file the keys are added to
    #[arg(short, long, default_value = "keys.asc")]
    pub out: PathBuf,
    /// Path to an armored public key to add, defaults to the default key
    #[arg(short, long = "key")]
    pub keys: Vec<PathBuf>,
    /// Do not add keys that are already in the file
    #[arg(long)]
    pub dedup: bool,
}

/// List the keys that signatures are accepted from
#[derive(Debug, Parser)]
pub struct Keyring {
    #[command(flatten)]
    pub keys: KeyArgs,
    /// Output as json
    #[arg(long)]
    pub json: bool,
}

/// Access to low-level features
#[derive(Debug, Subcommand)]
pub enum Plumbing {
    Extract(Extract),
    VerifyObject(VerifyObject),
}

/// Split raw commit objects into the signed document and the signature
#[derive(Debug, Parser)]
pub struct Extract {
    /// Print the armored signature instead of the signed document
    #[arg(long)]
    pub signature: bool,
    /// Only accept a signature in the commit headers
    #[arg(long)]
    pub strict_headers: bool,
    pub paths: Vec<FileOrStdin>,
}

/// Verify raw commit objects, as printed by `git cat-file commit`
#[derive(Debug, Parser)]
pub struct VerifyObject {
    #[command(flatten)]
    pub keys: KeyArgs,
    /// Only accept a signature in the commit headers
    #[arg(long)]
    pub strict_headers: bool,
    pub paths: Vec<FileOrStdin>,
}

/// Generate shell completions
#[derive(Debug, Parser)]
pub struct Completions {
    pub shell: Shell,
}

pub fn gen_completions(args: &Completions) -> Result<()> {
    clap_complete::generate(
        args.shell,
        &mut Args::command(),
        "commit-sigcheck",
        &mut stdout(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_defaults() -> Result<()> {
        let args = Args::try_parse_from(["commit-sigcheck", "verify"])?;
        let SubCommand::Verify(verify) = args.subcommand else {
            bail!("Unexpected subcommand");
        };
        assert_eq!(verify.path, PathBuf::from("."));
        assert_eq!(verify.reference, "HEAD");
        assert_eq!(verify.backend, Backend::Git);
        assert!(verify.keys.keys.is_empty());
        Ok(())
    }

    #[test]
    fn verify_legacy_names() -> Result<()> {
        let args = Args::try_parse_from([
            "commit-sigcheck",
            "sigcheck",
            "--dir",
            "/tmp/repo",
            "--pub-key-file",
            "a.asc",
            "-k",
            "b.asc",
            "-r",
            "v1.0",
        ])?;
        let SubCommand::Verify(verify) = args.subcommand else {
            bail!("Unexpected subcommand");
        };
        assert_eq!(verify.path, PathBuf::from("/tmp/repo"));
        assert_eq!(verify.reference, "v1.0");
        assert_eq!(
            verify.keys.keys,
            [PathBuf::from("a.asc"), PathBuf::from("b.asc")]
        );
        Ok(())
    }

    #[test]
    fn write_keyfile_defaults() -> Result<()> {
        let args = Args::try_parse_from(["commit-sigcheck", "write-keyfile"])?;
        let SubCommand::WriteKeyfile(write) = args.subcommand else {
            bail!("Unexpected subcommand");
        };
        assert_eq!(write.out, PathBuf::from("keys.asc"));
        assert!(!write.dedup);
        Ok(())
    }

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }
}
