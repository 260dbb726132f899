use clap::Parser;
use colored::Colorize;
use commit_sigcheck::args::{self, Args, SubCommand};
use commit_sigcheck::config;
use commit_sigcheck::errors::*;
use commit_sigcheck::keyring::{self, Keyring, DEFAULT_KEY};
use commit_sigcheck::plumbing;
use commit_sigcheck::verify;
use env_logger::Env;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match (args.quiet, args.verbose) {
        (0, 0) => "warn,commit_sigcheck=info",
        (1, 0) => "warn",
        (_, 0) => "error",
        (_, 1) => "info,commit_sigcheck=debug",
        (_, 2) => "debug",
        (_, 3) => "debug,commit_sigcheck=trace",
        _ => "trace",
    };
    env_logger::init_from_env(Env::default().default_filter_or(log_level));

    let config = config::Config::load_with_args(&args).await;

    if args.colors {
        colored::control::set_override(true);
    }

    match args.subcommand {
        SubCommand::Verify(sigcheck) => {
            let config = config?;
            let sources = config.key_sources(DEFAULT_KEY, &sigcheck.keys)?;
            let keyring = Keyring::load(&sources).context("Failed to load keyring")?;
            let provider = sigcheck.backend.provider(&sigcheck.path)?;
            let anchoring = config.anchoring(sigcheck.strict_headers);

            let verified = tokio::select! {
                verified = verify::check(provider.as_ref(), &sigcheck.reference, &keyring, anchoring) => {
                    verified.with_context(|| anyhow!(
                        "Failed to verify signature of {:?} in {:?}",
                        sigcheck.reference,
                        sigcheck.path
                    ))?
                }
                _ = signal::ctrl_c() => {
                    // dropping the other branch kills the git child process
                    bail!("Got interrupt, canceled processes in flight");
                }
            };

            let mut names = verified.names().peekable();
            if names.peek().is_none() {
                println!(
                    "{} commit in {} has verified signature by key {:X}",
                    sigcheck.reference,
                    sigcheck.path.display(),
                    verified.signer
                );
            }
            for name in names {
                println!(
                    "{} commit in {} has verified signature by {}",
                    sigcheck.reference,
                    sigcheck.path.display(),
                    name
                );
            }
        }
        SubCommand::WriteKeyfile(write) => {
            let config = config?;
            let sources = if write.keys.is_empty() {
                let source = config
                    .default_source(DEFAULT_KEY)
                    .ok_or(LoadError::NoSources)?;
                vec![source]
            } else {
                keyring::read_sources(&write.keys)?
            };

            let keyring = keyring::write_keyfile(&write.out, &sources, write.dedup)?;
            debug!("Keyfile contains {} keys", keyring.len());
            println!("Written key file: {}", write.out.display());
        }
        SubCommand::Keyring(args) => {
            let config = config?;
            let sources = config.key_sources(DEFAULT_KEY, &args.keys)?;
            let keyring = Keyring::load(&sources).context("Failed to load keyring")?;

            if args.json {
                let keyring = keyring.generate_report();
                let keyring = serde_json::to_string_pretty(&keyring)
                    .context("Failed to encode keyring as json")?;
                println!("{keyring}");
            } else {
                for key in &keyring.entities {
                    let hex = key.hex_fingerprint();
                    for identity in &key.identities {
                        println!("{}  {}", hex.green(), identity.user_id.yellow());
                    }
                    for subkey in key.subkeys() {
                        let subkey = format!("Subkey {subkey:X}");
                        println!("{}  {}", hex.green(), subkey.purple());
                    }
                }
            }
        }
        SubCommand::Plumbing(plumbing) => plumbing::run(config, plumbing).await?,
        SubCommand::Completions(completions) => args::gen_completions(&completions)?,
    }

    Ok(())
}
