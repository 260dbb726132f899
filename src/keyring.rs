use crate::errors::*;
use crate::pgp;
use crate::pgp::Entity;
use sequoia_openpgp::packet::Signature;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Armored public key baked into the binary at build time, if any.
pub const DEFAULT_KEY: Option<&str> = option_env!("COMMIT_SIGCHECK_DEFAULT_KEY");

/// Armored key material and a name to refer to it in errors.
#[derive(Debug, Clone, PartialEq)]
pub struct KeySource {
    pub name: String,
    pub data: Vec<u8>,
}

impl KeySource {
    pub fn new<N: Into<String>, D: Into<Vec<u8>>>(name: N, data: D) -> Self {
        KeySource {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn read(path: &Path) -> Result<Self, InputError> {
        let data = fs::read(path).map_err(|source| InputError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(KeySource::new(format!("{path:?}"), data))
    }
}

#[derive(Debug, Default, Clone)]
pub struct Keyring {
    pub entities: Vec<Entity>,
    identifiers: BTreeMap<String, usize>,
}

impl Keyring {
    pub fn new(keyring: &[u8]) -> Result<Self, LoadError> {
        let mut out = Keyring::default();
        out.append(&KeySource::new("keyring", keyring))?;
        Ok(out)
    }

    /// Load all sources in order, entities of a source stay in file order.
    pub fn load<'a, I>(sources: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = &'a KeySource>,
    {
        let mut keyring = Keyring::default();
        let mut count = 0;
        for source in sources {
            keyring.append(source)?;
            count += 1;
        }
        if count == 0 {
            return Err(LoadError::NoSources);
        }
        Ok(keyring)
    }

    pub fn append(&mut self, source: &KeySource) -> Result<usize, LoadError> {
        let entities = pgp::load(&source.name, &source.data)?;
        let num = entities.len();
        for entity in entities {
            self.push(entity);
        }
        Ok(num)
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
        self.register_identifiers(self.entities.len() - 1);
    }

    fn register_identifiers(&mut self, idx: usize) {
        let key = &self.entities[idx];
        for (handle, _fp) in &key.key_handles {
            let id = handle.to_string();
            // with duplicate entities the first one stays responsible
            if let Entry::Vacant(entry) = self.identifiers.entry(id) {
                trace!(
                    "Linking identifier for key {}: {:?}",
                    key.hex_fingerprint(),
                    entry.key()
                );
                entry.insert(idx);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn find_key(&self, sig: &Signature) -> Option<&Entity> {
        for issuer in sig.get_issuers() {
            debug!("Found issuer in signature packet: {issuer:?}");
            if let Some(idx) = self.identifiers.get(&issuer.to_string()) {
                let entity = &self.entities[*idx];
                debug!(
                    "Found key for given issuer: {}",
                    entity.hex_fingerprint()
                );
                return Some(entity);
            }
        }
        None
    }

    /// Remove entities whose primary fingerprint occurred earlier in the keyring.
    pub fn dedup(&mut self) -> usize {
        let before = self.entities.len();
        let mut seen = BTreeSet::new();
        let entities = std::mem::take(&mut self.entities);
        self.identifiers.clear();
        for entity in entities {
            if seen.insert(entity.fingerprint.clone()) {
                self.push(entity);
            } else {
                debug!("Dropping duplicate key {}", entity.hex_fingerprint());
            }
        }
        before - self.entities.len()
    }

    pub fn write_armored<W: Write + Send + Sync>(&self, out: W) -> Result<W> {
        pgp::write_armored(out, &self.entities)
    }

    pub fn generate_report(&self) -> Vec<KeyReport> {
        self.entities
            .iter()
            .map(|entity| KeyReport {
                fingerprint: entity.hex_fingerprint(),
                identities: entity.identities.clone(),
                subkeys: entity
                    .subkeys()
                    .map(|fp| format!("{fp:X}"))
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, PartialEq, Serialize)]
pub struct KeyReport {
    pub fingerprint: String,
    pub identities: Vec<pgp::Identity>,
    pub subkeys: Vec<String>,
}

/// Combine the keys of `out` (if it already exists) and all `sources` into `out`.
///
/// Keys that are already present are added again unless `dedup` is set.
pub fn write_keyfile(out: &Path, sources: &[KeySource], dedup: bool) -> Result<Keyring> {
    let mut keyring = Keyring::default();

    if out.exists() {
        let existing = KeySource::read(out)?;
        let num = keyring
            .append(&existing)
            .with_context(|| anyhow!("Failed to load existing keyfile {out:?}"))?;
        info!("Loaded {num} keys from existing keyfile {out:?}");
    }

    for source in sources {
        keyring.append(source)?;
    }

    if dedup {
        let removed = keyring.dedup();
        if removed > 0 {
            info!("Removed {removed} duplicate keys");
        }
    }

    let buf = keyring.write_armored(Vec::new())?;
    fs::write(out, buf).with_context(|| anyhow!("Failed to write keyfile to {out:?}"))?;
    Ok(keyring)
}

pub fn read_sources(paths: &[PathBuf]) -> Result<Vec<KeySource>, InputError> {
    paths.iter().map(|path| KeySource::read(path)).collect()
}
