pub mod args;
pub mod commit;
pub mod config;
pub mod errors;
pub mod keyring;
pub mod pgp;
pub mod plumbing;
pub mod provider;
pub mod verify;
