//! Persistence for sigchains on top of a [Documents] store.
//!
//! Each statement is its own document, keyed `sigchain/<owner>/<sequence>`
//! with the sequence zero-padded so key order is chain order.

use crate::{
    crypto::base::KeyID,
    docs::{Documents, Write},
    error::{Error, Result},
    sigchain::{Sigchain, Statement},
    util::ser,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

const PREFIX: &str = "sigchain";

fn owner_prefix(owner: &KeyID) -> String {
    format!("{}/{}/", PREFIX, owner)
}

fn statement_key(owner: &KeyID, sequence: u64) -> String {
    format!("{}{:015}", owner_prefix(owner), sequence)
}

/// One mutex per owner, held across a save's check and its write.
#[derive(Debug, Default)]
struct OwnerLocks {
    locks: Mutex<HashMap<KeyID, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    fn get(&self, owner: &KeyID) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| Error::StoreLockPoisoned)?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(locks.entry(owner.clone()).or_default().clone())
    }
}

/// Stores and loads sigchains by owner.
///
/// Clones share their save locks, so every save for an owner should go
/// through the same `Sigchains` (or a clone of it).
#[derive(Clone)]
pub struct Sigchains {
    docs: Arc<dyn Documents>,
    locks: Arc<OwnerLocks>,
}

impl Sigchains {
    pub fn new(docs: Arc<dyn Documents>) -> Self {
        Self {
            docs,
            locks: Arc::new(OwnerLocks::default()),
        }
    }

    fn statements(&self, owner: &KeyID) -> Result<Vec<Statement>> {
        self.docs
            .list(&owner_prefix(owner))?
            .into_iter()
            .map(|(_, bytes)| ser::deserialize::<Statement>(&bytes))
            .collect::<Result<Vec<_>>>()
    }

    /// Save a chain.
    ///
    /// Saving the same chain again (or a longer version of it) is fine. Saving
    /// a chain that would drop or replace statements we already have stored
    /// fails with [ChainConflict][Error::ChainConflict], since chains only
    /// ever grow. Saves for the same owner run one at a time, so the check
    /// always sees what the previous save wrote.
    pub fn save(&self, chain: &Sigchain) -> Result<()> {
        let owner = chain.owner();
        let lock = self.locks.get(owner)?;
        let _guard = lock.lock().map_err(|_| Error::StoreLockPoisoned)?;
        let existing = self.statements(owner)?;
        if existing.len() > chain.len() {
            Err(Error::ChainConflict(format!(
                "stored chain for {} has {} statements, refusing to truncate to {}",
                owner,
                existing.len(),
                chain.len()
            )))?;
        }
        if let Some(forked) = existing
            .iter()
            .zip(chain.statements().iter())
            .find(|(stored, ours)| stored != ours)
        {
            Err(Error::ChainConflict(format!("statement {} for {} differs from stored statement", forked.0.sequence(), owner)))?;
        }
        let batch = chain
            .statements()
            .iter()
            .map(|st| -> Result<Write> { Ok(Write::Put(statement_key(owner, st.sequence()), ser::serialize(st)?)) })
            .collect::<Result<Vec<_>>>()?;
        debug!(%owner, statements = batch.len(), previous = existing.len(), "sigchains: save");
        self.docs.apply(batch)
    }

    /// Load (and validate) the chain for `owner`.
    pub fn sigchain(&self, owner: &KeyID) -> Result<Sigchain> {
        let statements = self.statements(owner)?;
        if statements.is_empty() {
            Err(Error::ChainNotFound(owner.to_string()))?;
        }
        Sigchain::from_statements(owner.clone(), statements)
    }

    /// Whether we have a chain stored for `owner`.
    pub fn exists(&self, owner: &KeyID) -> Result<bool> {
        Ok(self.docs.get(&statement_key(owner, 1))?.is_some())
    }

    /// The owners of every chain we have stored, sorted.
    pub fn kids(&self) -> Result<Vec<KeyID>> {
        let mut kids = BTreeSet::new();
        for (key, _) in self.docs.list(&format!("{}/", PREFIX))? {
            let owner = key.split('/').nth(1).ok_or_else(|| Error::ChainInvalid(format!("bad sigchain key {}", key)))?;
            kids.insert(KeyID::try_from(owner)?);
        }
        Ok(kids.into_iter().collect())
    }
}
