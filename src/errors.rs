pub use anyhow::{anyhow, bail, Context, Result};
pub use log::{debug, error, info, trace, warn};

use std::path::PathBuf;
use thiserror::Error;

/// The commit text or a key file could not be obtained.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to get commit {reference:?} from repository at {path:?}: {reason}")]
    Git {
        path: PathBuf,
        reference: String,
        reason: String,
    },
    #[error("Git exited with {status} while reading commit {reference:?}: {stderr}")]
    GitExit {
        reference: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Commit does not have a gpgsig header")]
    NoSignatureField,
    #[error("Commit signature block is malformed: {0}")]
    MalformedSignatureBlock(&'static str),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to parse public keys from {name}: {reason}")]
    Malformed { name: String, reason: String },
    #[error("No public keys found in {name}")]
    Empty { name: String },
    #[error("No public key was set at compile time and none was provided at runtime")]
    NoSources,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Failed to decode signature: {0}")]
    MalformedSignature(String),
    #[error("Signature was issued by a key that is not in the keyring (issuers: {})", issuers.join(", "))]
    UnknownIssuer { issuers: Vec<String> },
    #[error("Signature could not be verified with key {fingerprint}")]
    BadSignature { fingerprint: String },
}

/// Any failure of the commit verification pipeline.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}
