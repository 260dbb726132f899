use crate::errors::*;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Something that can return the raw text of a commit object.
#[async_trait]
pub trait CommitTextProvider: Send + Sync {
    async fn commit_text(&self, reference: &str) -> Result<Vec<u8>, InputError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Run `git cat-file commit`
    #[default]
    Git,
    /// Read the repository in-process
    Gix,
}

impl Backend {
    pub fn provider(&self, path: &Path) -> Result<Box<dyn CommitTextProvider>> {
        match self {
            Backend::Git => Ok(Box::new(GitCli::new(path))),
            #[cfg(feature = "git")]
            Backend::Gix => Ok(Box::new(Gix::new(path))),
            #[cfg(not(feature = "git"))]
            Backend::Gix => bail!("Built without the `git` feature, the gix backend is not available"),
        }
    }
}

/// Invokes the git binary, the child is killed if the future is dropped.
#[derive(Debug, Clone)]
pub struct GitCli {
    pub path: PathBuf,
}

impl GitCli {
    pub fn new(path: &Path) -> Self {
        GitCli {
            path: path.to_path_buf(),
        }
    }
}

#[async_trait]
impl CommitTextProvider for GitCli {
    async fn commit_text(&self, reference: &str) -> Result<Vec<u8>, InputError> {
        if reference.starts_with('-') {
            return Err(InputError::Git {
                path: self.path.clone(),
                reference: reference.to_string(),
                reason: "reference must not start with `-`".to_string(),
            });
        }

        debug!(
            "Running git cat-file for {reference:?} in {:?}",
            self.path
        );
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(["cat-file", "commit", reference])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| InputError::Git {
                path: self.path.clone(),
                reference: reference.to_string(),
                reason: format!("Failed to execute git: {err}"),
            })?;

        if !output.status.success() {
            return Err(InputError::GitExit {
                reference: reference.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Resolves the reference with gix and returns the commit's raw object data.
#[cfg(feature = "git")]
#[derive(Debug, Clone)]
pub struct Gix {
    pub path: PathBuf,
}

#[cfg(feature = "git")]
impl Gix {
    pub fn new(path: &Path) -> Self {
        Gix {
            path: path.to_path_buf(),
        }
    }

    fn read(&self, reference: &str) -> Result<Vec<u8>> {
        let repo = gix::open(self.path.clone()).context("Failed to open repository")?;
        let id = repo
            .rev_parse_single(reference)
            .context("Failed to resolve reference")?;
        let object = id.object().context("Failed to read object")?;
        let commit = object
            .peel_to_kind(gix::object::Kind::Commit)
            .context("Reference does not point to a commit")?;
        Ok(commit.detach().data)
    }
}

#[cfg(feature = "git")]
#[async_trait]
impl CommitTextProvider for Gix {
    async fn commit_text(&self, reference: &str) -> Result<Vec<u8>, InputError> {
        debug!("Reading commit {reference:?} from {:?} with gix", self.path);
        self.read(reference).map_err(|err| InputError::Git {
            path: self.path.clone(),
            reference: reference.to_string(),
            reason: format!("{err:#}"),
        })
    }
}
