use crate::errors::*;
use sequoia_openpgp::armor;
use sequoia_openpgp::cert::prelude::*;
use sequoia_openpgp::packet::UserID;
use sequoia_openpgp::parse::{PacketParser, Parse};
use sequoia_openpgp::policy::StandardPolicy;
use sequoia_openpgp::serialize::Serialize as _;
use sequoia_openpgp::{Cert, Fingerprint, KeyHandle, KeyID};
use serde::Serialize;
use std::io::Write;

/// Armor header written into combined keyfiles.
pub const KEYFILE_PURPOSE: (&str, &str) = ("purpose", "public keys for commit verification");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    #[allow(deprecated)]
    pub fn from_userid(uid: &UserID) -> Self {
        Identity {
            user_id: uid.to_string(),
            name: uid.name().ok().flatten(),
            email: uid.email().ok().flatten(),
        }
    }
}

/// A public certificate we accept commit signatures from.
#[derive(Debug, Clone)]
pub struct Entity {
    pub fingerprint: Fingerprint,
    pub cert: Cert,
    pub identities: Vec<Identity>,
    pub key_handles: Vec<(KeyHandle, Fingerprint)>,
}

impl Entity {
    pub fn from_cert(cert: Cert) -> Self {
        let mut entity = Entity {
            fingerprint: cert.fingerprint(),
            cert,
            identities: Vec::new(),
            key_handles: Vec::new(),
        };

        // keys without a valid binding signature are not part of the certificate
        let policy = StandardPolicy::new();
        let fingerprints = entity
            .cert
            .keys()
            .with_policy(&policy, None)
            .map(|key| key.fingerprint())
            .collect::<Vec<_>>();
        if fingerprints.is_empty() {
            warn!(
                "Certificate {} has no usable keys",
                entity.hex_fingerprint()
            );
        }
        for fp in fingerprints {
            entity.register_keyhandles(fp);
        }

        for ua in entity.cert.userids() {
            entity.identities.push(Identity::from_userid(ua.userid()));
        }

        entity
    }

    pub fn hex_fingerprint(&self) -> String {
        format!("{:X}", self.fingerprint)
    }

    pub fn register_keyhandles(&mut self, fp: Fingerprint) {
        let keyid = KeyID::from(&fp);
        self.key_handles.push((KeyHandle::KeyID(keyid), fp.clone()));
        self.key_handles
            .push((KeyHandle::Fingerprint(fp.clone()), fp));
    }

    /// Fingerprints of all bound subkeys
    pub fn subkeys(&self) -> impl Iterator<Item = &Fingerprint> {
        self.key_handles.iter().filter_map(|(handle, fp)| match handle {
            KeyHandle::Fingerprint(_) if *fp != self.fingerprint => Some(fp),
            _ => None,
        })
    }

    /// Names of all identities that have one
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.identities
            .iter()
            .filter_map(|identity| identity.name.as_deref())
    }
}

/// Parse all certificates of an armored (or binary) keyring.
pub fn load(name: &str, keyring: &[u8]) -> Result<Vec<Entity>, LoadError> {
    let malformed = |err: anyhow::Error| LoadError::Malformed {
        name: name.to_string(),
        reason: format!("{err:#}"),
    };

    let ppr = PacketParser::from_bytes(keyring).map_err(malformed)?;

    let mut out = Vec::new();
    for certo in CertParser::from(ppr) {
        let cert = certo.map_err(malformed)?;
        let entity = Entity::from_cert(cert);
        debug!(
            "Loaded key {} from {name} ({} identities)",
            entity.hex_fingerprint(),
            entity.identities.len()
        );
        out.push(entity);
    }

    if out.is_empty() {
        return Err(LoadError::Empty {
            name: name.to_string(),
        });
    }

    Ok(out)
}

/// Write the public parts of all given entities as one armored key block.
pub fn write_armored<'a, W, I>(out: W, entities: I) -> Result<W>
where
    W: Write + Send + Sync,
    I: IntoIterator<Item = &'a Entity>,
{
    let mut writer = armor::Writer::with_headers(out, armor::Kind::PublicKey, [KEYFILE_PURPOSE])
        .context("Failed to setup armor writer")?;
    for entity in entities {
        entity
            .cert
            .serialize(&mut writer)
            .with_context(|| anyhow!("Failed to serialize key {}", entity.hex_fingerprint()))?;
    }
    let out = writer.finalize().context("Failed to finalize armor")?;
    Ok(out)
}
