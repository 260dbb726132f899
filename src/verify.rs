use crate::commit::{self, Anchoring, SignedCommit};
use crate::errors::*;
use crate::keyring::Keyring;
use crate::pgp::{Entity, Identity};
use crate::provider::CommitTextProvider;
use sequoia_openpgp::packet::Signature;
use sequoia_openpgp::parse::{PacketParser, PacketParserResult, Parse};
use sequoia_openpgp::policy::StandardPolicy;
use sequoia_openpgp::{Fingerprint, KeyHandle, Packet};

/// A signature that was successfully verified with a key of the keyring.
#[derive(Debug, Clone)]
pub struct Verified<'a> {
    pub entity: &'a Entity,
    /// The (sub)key that issued the signature
    pub signer: Fingerprint,
}

impl<'a> Verified<'a> {
    pub fn identities(&self) -> &'a [Identity] {
        &self.entity.identities
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> {
        self.entity.names()
    }
}

fn format_handle(handle: &KeyHandle) -> String {
    match handle {
        KeyHandle::Fingerprint(fp) => format!("{fp:X}"),
        KeyHandle::KeyID(keyid) => format!("{keyid:X}"),
    }
}

/// Verify an armored detached signature over `body`.
pub fn verify<'a>(
    body: &[u8],
    armored: &[u8],
    keyring: &'a Keyring,
) -> Result<Verified<'a>, VerifyError> {
    let signature = commit::dearmor_signature(armored)?;
    verify_detached(body, &signature, keyring)
}

/// Verify binary signature packets over `body`.
pub fn verify_detached<'a>(
    body: &[u8],
    signature: &[u8],
    keyring: &'a Keyring,
) -> Result<Verified<'a>, VerifyError> {
    let malformed = |err: anyhow::Error| VerifyError::MalformedSignature(format!("{err:#}"));

    let mut issuers = Vec::new();
    let mut rejected = None;
    let mut num_signatures = 0;

    let mut ppr = PacketParser::from_bytes(signature).map_err(malformed)?;
    while let PacketParserResult::Some(pp) = ppr {
        let (packet, next_ppr) = pp.recurse().map_err(malformed)?;
        ppr = next_ppr;

        let sig = match packet {
            Packet::Signature(sig) => sig,
            packet => {
                debug!("Unexpected openpgp packet in signature block, ignoring: {packet:?}");
                continue;
            }
        };
        num_signatures += 1;

        let Some(entity) = keyring.find_key(&sig) else {
            issuers.extend(sig.get_issuers().iter().map(format_handle));
            continue;
        };

        if let Some(signer) = verify_with_entity(body, &sig, entity) {
            debug!(
                "Successfully verified signature with key {signer:X} of {}",
                entity.hex_fingerprint()
            );
            return Ok(Verified { entity, signer });
        }
        rejected = Some(entity);
    }

    if num_signatures == 0 {
        return Err(VerifyError::MalformedSignature(
            "no signature packet found".to_string(),
        ));
    }

    if let Some(entity) = rejected {
        Err(VerifyError::BadSignature {
            fingerprint: entity.hex_fingerprint(),
        })
    } else {
        Err(VerifyError::UnknownIssuer { issuers })
    }
}

fn verify_with_entity(body: &[u8], sig: &Signature, entity: &Entity) -> Option<Fingerprint> {
    let policy = StandardPolicy::new();
    let issuers = sig.get_issuers();
    // only keys that were bound as signing keys when the signature was made
    let keys = entity
        .cert
        .keys()
        .with_policy(&policy, sig.signature_creation_time())
        .for_signing()
        .collect::<Vec<_>>();

    // keys named by the signature first, then the other signing keys
    for named_only in [true, false] {
        for ka in &keys {
            let key = ka.key();
            let named = issuers
                .iter()
                .any(|issuer| issuer.aliases(key.key_handle()));
            if named != named_only {
                continue;
            }

            match sig.verify_message(key, body) {
                Ok(()) => return Some(key.fingerprint()),
                Err(err) => {
                    debug!("Signature did not verify with key {:X}: {err:#}", key.fingerprint())
                }
            }
        }
    }
    None
}

/// Split a raw commit into signed body and signature and verify it.
pub fn verify_commit<'a>(
    text: &[u8],
    keyring: &'a Keyring,
    anchoring: Anchoring,
) -> Result<Verified<'a>, CheckError> {
    let signed = SignedCommit::from_bytes_with(text, anchoring)?;
    let verified = verify(&signed.body, &signed.signature, keyring)?;
    Ok(verified)
}

/// Fetch a commit with the given provider and verify its signature.
pub async fn check<'a>(
    provider: &dyn CommitTextProvider,
    reference: &str,
    keyring: &'a Keyring,
    anchoring: Anchoring,
) -> Result<Verified<'a>, CheckError> {
    let text = provider.commit_text(reference).await?;
    debug!("Read commit {reference:?} ({} bytes)", text.len());
    verify_commit(&text, keyring, anchoring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::KeySource;
    use crate::pgp::tests::{armored, generate, sign_detached, ANTHRAXX};
    use crate::provider::tests::Fixed;
    use bstr::ByteSlice;
    use sequoia_openpgp::Cert;

    const SIGNED_COMMIT: &[u8] = include_bytes!("../tests/fixtures/signed-commit.txt");

    const UNSIGNED_BODY: &[u8] = b"tree abc
parent def
author A <a@x> 0 +0000
committer A <a@x> 0 +0000

Initial commit
";

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Insert an armored signature as gpgsig header, like `git commit -S` does.
    fn sign_commit(body: &[u8], signature: &[u8]) -> Vec<u8> {
        let pos = body.find(b"\n\n").expect("commit has no message") + 1;
        let mut out = body[..pos].to_vec();
        out.extend(b"gpgsig ");
        for (idx, line) in signature.lines().enumerate() {
            if idx > 0 {
                out.push(b' ');
            }
            out.extend(line);
            out.push(b'\n');
        }
        out.extend(&body[pos..]);
        out
    }

    #[test]
    fn verify_real_commit() -> Result<()> {
        init();
        let keyring = Keyring::new(ANTHRAXX)?;
        let verified = verify_commit(SIGNED_COMMIT, &keyring, Anchoring::FirstMatch)?;
        assert_eq!(
            verified.entity.hex_fingerprint(),
            "E240B57E2C4630BA768E2F26FC1B547C8D8172C8"
        );
        assert_eq!(
            format!("{:X}", verified.signer),
            "E240B57E2C4630BA768E2F26FC1B547C8D8172C8"
        );
        assert!(!verified.identities().is_empty());
        assert!(verified.names().any(|name| name == "Levente Polyak"));
        Ok(())
    }

    #[test]
    fn detect_modified_commit() -> Result<()> {
        init();
        let keyring = Keyring::new(ANTHRAXX)?;
        let signed = SignedCommit::from_bytes(SIGNED_COMMIT)?;

        let mut body = signed.body.to_vec();
        let idx = body.len() - 2;
        body[idx] ^= 0x01;

        let err = verify(&body, &signed.signature, &keyring).unwrap_err();
        assert!(matches!(err, VerifyError::BadSignature { .. }));
        Ok(())
    }

    #[test]
    fn unknown_issuer() -> Result<()> {
        init();
        let signed = SignedCommit::from_bytes(SIGNED_COMMIT)?;

        let err = verify(&signed.body, &signed.signature, &Keyring::default()).unwrap_err();
        let issuers = match err {
            VerifyError::UnknownIssuer { issuers } => issuers,
            err => panic!("Unexpected error: {err:?}"),
        };
        assert!(issuers.contains(&"E240B57E2C4630BA768E2F26FC1B547C8D8172C8".to_string()));

        let other = generate("B <b@example.org>")?;
        let keyring = Keyring::new(&armored(&other)?)?;
        let err = verify(&signed.body, &signed.signature, &keyring).unwrap_err();
        assert!(matches!(err, VerifyError::UnknownIssuer { .. }));
        Ok(())
    }

    #[test]
    fn generated_commit_signature() -> Result<()> {
        init();
        let cert = generate("A <a@example.org>")?;
        let signature = sign_detached(&cert, UNSIGNED_BODY)?;
        let text = sign_commit(UNSIGNED_BODY, &signature);
        assert!(text
            .find(b"committer A <a@x> 0 +0000\ngpgsig -----BEGIN PGP SIGNATURE-----\n")
            .is_some());

        let signed = SignedCommit::from_bytes(&text)?;
        assert_eq!(signed.body, UNSIGNED_BODY);
        assert_eq!(signed.to_commit_text(), text);

        let sources = [
            KeySource::new("anthraxx.asc", ANTHRAXX),
            KeySource::new("a.asc", armored(&cert)?),
        ];
        let keyring = Keyring::load(&sources)?;
        let verified = verify_commit(&text, &keyring, Anchoring::Headers)?;
        assert_eq!(verified.entity.fingerprint, cert.fingerprint());
        assert_ne!(verified.signer, cert.fingerprint());
        assert_eq!(verified.names().collect::<Vec<_>>(), vec!["A"]);
        Ok(())
    }

    #[test]
    fn identities_without_name_are_returned() -> Result<()> {
        init();
        let cert = generate("<nameless@example.org>")?;
        let signature = sign_detached(&cert, UNSIGNED_BODY)?;
        let keyring = Keyring::new(&armored(&cert)?)?;

        let verified = verify(UNSIGNED_BODY, &signature, &keyring)?;
        assert_eq!(verified.identities().len(), 1);
        assert_eq!(verified.names().count(), 0);
        Ok(())
    }

    #[test]
    fn signature_by_other_key_of_same_keyring() -> Result<()> {
        init();
        let alice = generate("Alice <alice@example.org>")?;
        let mallory = generate("Mallory <mallory@example.org>")?;
        let keyring = Keyring::load(&[
            KeySource::new("alice.asc", armored(&alice)?),
            KeySource::new("mallory.asc", armored(&mallory)?),
        ])?;

        let signature = sign_detached(&mallory, UNSIGNED_BODY)?;
        let verified = verify(UNSIGNED_BODY, &signature, &keyring)?;
        assert_eq!(verified.names().collect::<Vec<_>>(), vec!["Mallory"]);

        let mut body = UNSIGNED_BODY.to_vec();
        body.push(b'\n');
        let err = verify(&body, &signature, &keyring).unwrap_err();
        let fingerprint = match err {
            VerifyError::BadSignature { fingerprint } => fingerprint,
            err => panic!("Unexpected error: {err:?}"),
        };
        assert_eq!(fingerprint, format!("{:X}", mallory.fingerprint()));
        Ok(())
    }

    #[test]
    fn signature_by_unbound_subkey_is_rejected() -> Result<()> {
        init();
        let alice = generate("Alice <alice@example.org>")?;
        let mallory = generate("Mallory <mallory@example.org>")?;

        // attach mallory's signing subkey to alice's certificate without a binding signature
        let subkey = mallory
            .keys()
            .subkeys()
            .next()
            .context("Generated certificate has no subkey")?
            .key()
            .clone();
        let packets = alice
            .clone()
            .strip_secret_key_material()
            .into_packets()
            .chain(std::iter::once(Packet::from(subkey)));
        let forged = Cert::from_packets(packets)?;
        assert_eq!(forged.keys().subkeys().count(), 2);

        let mut keyring = Keyring::default();
        keyring.push(Entity::from_cert(forged));
        assert_eq!(keyring.entities[0].subkeys().count(), 1);

        let signature = sign_detached(&mallory, UNSIGNED_BODY)?;
        let err = verify(UNSIGNED_BODY, &signature, &keyring).unwrap_err();
        assert!(matches!(
            err,
            VerifyError::UnknownIssuer { .. } | VerifyError::BadSignature { .. }
        ));

        let signature = sign_detached(&alice, UNSIGNED_BODY)?;
        let verified = verify(UNSIGNED_BODY, &signature, &keyring)?;
        assert_eq!(verified.names().collect::<Vec<_>>(), vec!["Alice"]);
        Ok(())
    }

    #[test]
    fn malformed_signature() -> Result<()> {
        let keyring = Keyring::new(ANTHRAXX)?;
        let err = verify(
            UNSIGNED_BODY,
            b"-----BEGIN PGP SIGNATURE-----\n\n-----END PGP SIGNATURE-----\n",
            &keyring,
        )
        .unwrap_err();
        assert!(matches!(err, VerifyError::MalformedSignature(_)));
        Ok(())
    }

    #[test]
    fn unsigned_commit() -> Result<()> {
        let keyring = Keyring::new(ANTHRAXX)?;
        let err = verify_commit(UNSIGNED_BODY, &keyring, Anchoring::FirstMatch).unwrap_err();
        assert!(matches!(
            err,
            CheckError::Extract(ExtractError::NoSignatureField)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn check_with_provider() -> Result<()> {
        init();
        let keyring = Keyring::new(ANTHRAXX)?;
        let provider = Fixed(SIGNED_COMMIT.to_vec());
        let verified = check(&provider, "HEAD", &keyring, Anchoring::FirstMatch).await?;
        assert_eq!(
            verified.entity.hex_fingerprint(),
            "E240B57E2C4630BA768E2F26FC1B547C8D8172C8"
        );
        Ok(())
    }
}
