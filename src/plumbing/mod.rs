use crate::args::{FileOrStdin, Plumbing};
use crate::commit::SignedCommit;
use crate::config::Config;
use crate::errors::*;
use crate::keyring::{Keyring, DEFAULT_KEY};
use crate::verify;
use tokio::io;
use tokio::io::AsyncWriteExt;

pub async fn run(config: Result<Config>, args: Plumbing) -> Result<()> {
    match args {
        Plumbing::Extract(mut extract) => {
            FileOrStdin::default_stdin(&mut extract.paths);
            let config = config?;
            let anchoring = config.anchoring(extract.strict_headers);

            let mut stdout = io::stdout();
            for path in &extract.paths {
                let buf = path.read().await?;
                let signed = SignedCommit::from_bytes_with(&buf, anchoring)
                    .with_context(|| anyhow!("Failed to extract signature from {path:?}"))?;

                if extract.signature {
                    stdout.write_all(&signed.signature).await?;
                } else {
                    stdout.write_all(&signed.body).await?;
                }
            }
            // https://github.com/tokio-rs/tokio/issues/7174
            stdout.flush().await?;
        }
        Plumbing::VerifyObject(mut verify_object) => {
            FileOrStdin::default_stdin(&mut verify_object.paths);
            let config = config?;
            let sources = config.key_sources(DEFAULT_KEY, &verify_object.keys)?;
            let keyring = Keyring::load(&sources).context("Failed to load keyring")?;
            let anchoring = config.anchoring(verify_object.strict_headers);

            for path in &verify_object.paths {
                let buf = path.read().await?;
                let verified = verify::verify_commit(&buf, &keyring, anchoring)
                    .with_context(|| anyhow!("Failed to verify commit object {path:?}"))?;

                let mut names = verified.names().peekable();
                if names.peek().is_none() {
                    println!("{path:?} has verified signature by key {:X}", verified.signer);
                }
                for name in names {
                    println!("{path:?} has verified signature by {name}");
                }
            }
        }
    }

    Ok(())
}
