//! A tiny interface over sorted key-value storage.
//!
//! Sigchains and cached verification results both live in a [Documents] store
//! under namespaced string keys (`sigchain/...`, `user/...`, `user-index/...`).
//! Anything that can do ordered prefix scans and apply a batch of writes
//! atomically can back it. [MemDocuments] is the in-memory version.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::trace;

/// A single write inside of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Set a key to a value, overwriting whatever was there.
    Put(String, Vec<u8>),
    /// Remove a key. Removing a missing key is not an error.
    Delete(String),
}

/// Sorted key-value storage.
pub trait Documents: Send + Sync {
    /// Grab the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List every `(key, value)` pair whose key starts with `prefix`, in key
    /// order.
    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Apply a batch of writes. Either all of them land or none of them do,
    /// and readers never see a partially applied batch.
    fn apply(&self, batch: Vec<Write>) -> Result<()>;

    /// Set a single key.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.apply(vec![Write::Put(key.to_string(), value)])
    }
}

/// An in-memory document store.
#[derive(Debug, Default)]
pub struct MemDocuments {
    docs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many keys we're holding.
    pub fn len(&self) -> Result<usize> {
        Ok(self.docs.read().map_err(|_| Error::StoreLockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Documents for MemDocuments {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let docs = self.docs.read().map_err(|_| Error::StoreLockPoisoned)?;
        Ok(docs.get(key).cloned())
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let docs = self.docs.read().map_err(|_| Error::StoreLockPoisoned)?;
        let found = docs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, val)| (key.clone(), val.clone()))
            .collect::<Vec<_>>();
        Ok(found)
    }

    fn apply(&self, batch: Vec<Write>) -> Result<()> {
        let mut docs = self.docs.write().map_err(|_| Error::StoreLockPoisoned)?;
        trace!(writes = batch.len(), "docs: apply batch");
        for write in batch {
            match write {
                Write::Put(key, val) => {
                    docs.insert(key, val);
                }
                Write::Delete(key) => {
                    docs.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_get_put_list() {
        let docs = MemDocuments::new();
        assert!(docs.is_empty().unwrap());
        docs.put("user/b/1", b"b1".to_vec()).unwrap();
        docs.put("user/a/2", b"a2".to_vec()).unwrap();
        docs.put("user/a/1", b"a1".to_vec()).unwrap();
        docs.put("userz", b"nope".to_vec()).unwrap();
        docs.put("sigchain/a/1", b"s".to_vec()).unwrap();

        assert_eq!(docs.get("user/a/1").unwrap(), Some(b"a1".to_vec()));
        assert_eq!(docs.get("user/a/3").unwrap(), None);

        let keys = docs.list("user/").unwrap().into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(keys, vec!["user/a/1", "user/a/2", "user/b/1"]);
        let keys = docs.list("user/a/").unwrap().into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(keys, vec!["user/a/1", "user/a/2"]);
        assert_eq!(docs.list("nothing/").unwrap(), vec![]);
        assert_eq!(docs.len().unwrap(), 5);
    }

    #[test]
    fn mem_apply_batch() {
        let docs = MemDocuments::new();
        docs.put("a", vec![1]).unwrap();
        docs.put("b", vec![2]).unwrap();
        docs.apply(vec![
            Write::Delete("a".into()),
            Write::Delete("missing".into()),
            Write::Put("b".into(), vec![3]),
            Write::Put("c".into(), vec![4]),
        ])
        .unwrap();
        assert_eq!(docs.list("").unwrap(), vec![("b".to_string(), vec![3]), ("c".to_string(), vec![4])]);
    }
}
