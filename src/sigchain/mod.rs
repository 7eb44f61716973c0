//! A sigchain is an append-only, hash-linked log of [statements][Statement]
//! all signed by the same key (the chain's owner).
//!
//! Statements live in a dense arena indexed by sequence number. Revoking a
//! statement doesn't remove it: a later [Revoke][StatementKind::Revoke]
//! statement is appended and the chain remembers which statement revoked
//! which. This keeps the hash links intact forever.

use crate::{
    crypto::base::{KeyID, SignKeypair},
    error::{Error, Result},
    util::{ser, Timestamp},
};
use getset;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

mod statement;
mod store;

pub use statement::*;
pub use store::*;

/// An append-only chain of statements owned by a single key.
#[derive(Debug, Clone, PartialEq, getset::Getters)]
#[getset(get = "pub")]
pub struct Sigchain {
    /// The key that signs everything in this chain.
    owner: KeyID,
    /// Our statements, where `statements[n]` has sequence `n + 1`.
    statements: Vec<Statement>,
    /// Maps revoked sequence -> sequence of the statement that revoked it.
    revokes: BTreeMap<u64, u64>,
}

/// How a chain looks when exported. Revocations are derived, so they don't
/// get written out.
#[derive(Serialize, Deserialize)]
struct SigchainExport {
    owner: KeyID,
    statements: Vec<Statement>,
}

impl Sigchain {
    /// Create a new, empty chain.
    pub fn new(owner: KeyID) -> Self {
        Self {
            owner,
            statements: Vec::new(),
            revokes: BTreeMap::new(),
        }
    }

    /// Load a chain from a list of statements we got from somewhere else
    /// (storage, the network, a friend). Every statement is checked and if any
    /// of them fail, the whole chain is rejected.
    pub fn from_statements(owner: KeyID, statements: Vec<Statement>) -> Result<Self> {
        let mut chain = Self::new(owner);
        for statement in statements {
            chain.add(statement).map_err(|e| Error::ChainInvalid(e.to_string()))?;
        }
        Ok(chain)
    }

    /// The highest sequence in the chain, or 0 if the chain is empty.
    pub fn last_seq(&self) -> u64 {
        self.statements.len() as u64
    }

    /// The last statement in the chain, if any.
    pub fn last(&self) -> Option<&Statement> {
        self.statements.last()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Find a statement by its sequence.
    pub fn statement_at(&self, sequence: u64) -> Result<&Statement> {
        if sequence == 0 {
            Err(Error::ChainStatementNotFound(sequence))?;
        }
        self.statements
            .get((sequence - 1) as usize)
            .ok_or(Error::ChainStatementNotFound(sequence))
    }

    /// Whether or not a later statement revoked the one at `sequence`.
    pub fn is_revoked(&self, sequence: u64) -> bool {
        self.revokes.contains_key(&sequence)
    }

    /// The sequence of the statement that revoked `sequence`, if any.
    pub fn revoked_by(&self, sequence: u64) -> Option<u64> {
        self.revokes.get(&sequence).copied()
    }

    /// Iterate over the non-revoked statements of a given kind, in chain order.
    pub fn active(&self, kind: StatementKind) -> impl Iterator<Item = &Statement> + '_ {
        self.statements
            .iter()
            .filter(move |st| st.kind() == kind && !self.is_revoked(st.sequence()))
    }

    /// Make sure `target` is something that can be revoked right now.
    fn check_revoke(&self, target: u64) -> Result<()> {
        let statement = self.statement_at(target)?;
        if statement.kind() == StatementKind::Revoke {
            Err(Error::ChainRevokeInvalid(format!("statement {} is a revoke and cannot be revoked", target)))?;
        }
        if self.is_revoked(target) {
            Err(Error::ChainAlreadyRevoked(target))?;
        }
        Ok(())
    }

    /// Append a statement to the chain.
    ///
    /// The statement has to be signed by our owner, follow directly after our
    /// last statement (by sequence and by hash), and not be created before it.
    /// Revoke statements also have to point at something revokable. On error,
    /// the chain is left as it was.
    pub fn add(&mut self, statement: Statement) -> Result<()> {
        let entry = statement.entry();
        let sequence = *entry.sequence();
        if entry.key_id() != self.owner() {
            Err(Error::ChainBadSigner {
                expected: self.owner().to_string(),
                got: entry.key_id().to_string(),
            })?;
        }
        statement.verify_signature()?;
        let expected = self.last_seq() + 1;
        if sequence != expected {
            Err(Error::ChainBadSequence { expected, got: sequence })?;
        }
        match self.last() {
            Some(last) => {
                if entry.previous().as_ref() != Some(&last.digest()?) {
                    Err(Error::ChainBadPrevious(sequence))?;
                }
                if entry.created() < last.entry().created() {
                    Err(Error::ChainBadTimestamp(sequence))?;
                }
            }
            None => {
                if entry.previous().is_some() {
                    Err(Error::ChainBadPrevious(sequence))?;
                }
            }
        }
        let revoke_target = statement.revoke_target()?;
        if let Some(target) = revoke_target {
            self.check_revoke(target)?;
        }

        debug!(owner = %self.owner, sequence, kind = %statement.kind(), "sigchain: add statement");
        self.statements.push(statement);
        if let Some(target) = revoke_target {
            self.revokes.insert(target, sequence);
        }
        Ok(())
    }

    /// Build (and sign) the next statement for this chain without adding it.
    pub fn build_statement<T: Into<Timestamp>>(
        &self,
        sign_with: &SignKeypair,
        kind: StatementKind,
        payload: Vec<u8>,
        now: T,
    ) -> Result<Statement> {
        if &sign_with.key_id() != self.owner() {
            Err(Error::ChainBadSigner {
                expected: self.owner().to_string(),
                got: sign_with.key_id().to_string(),
            })?;
        }
        let previous = self.last().map(|st| st.digest()).transpose()?;
        let entry = StatementEntry::new(self.last_seq() + 1, previous, kind, payload, self.owner().clone(), now);
        Statement::new(entry, sign_with)
    }

    /// Revoke the statement at `sequence` by appending a revoke statement.
    /// Returns the revoke statement's sequence.
    pub fn revoke<T: Into<Timestamp>>(&mut self, sequence: u64, sign_with: &SignKeypair, now: T) -> Result<u64> {
        self.check_revoke(sequence)?;
        let payload = ser::serialize(&sequence)?;
        let statement = self.build_statement(sign_with, StatementKind::Revoke, payload, now)?;
        let revoke_seq = statement.sequence();
        self.add(statement)?;
        Ok(revoke_seq)
    }

    /// Export this chain as human-readable text.
    pub fn serialize_text(&self) -> Result<String> {
        let export = SigchainExport {
            owner: self.owner().clone(),
            statements: self.statements().clone(),
        };
        ser::serialize_text(&export)
    }

    /// Import a chain from text created with [serialize_text][Sigchain::serialize_text].
    /// The chain is fully re-validated.
    pub fn deserialize_text(text: &[u8]) -> Result<Self> {
        let export: SigchainExport = ser::deserialize_text(text)?;
        Self::from_statements(export.owner, export.statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;

    fn chain_with(keypair: &SignKeypair, num: u64) -> Sigchain {
        let mut chain = Sigchain::new(keypair.key_id());
        for i in 0..num {
            let statement = chain
                .build_statement(keypair, StatementKind::Generic, format!("statement {}", i).into_bytes(), Timestamp::from_millis(1000 + i as i64))
                .unwrap();
            chain.add(statement).unwrap();
        }
        chain
    }

    #[test]
    fn sigchain_empty() {
        let keypair = test::keypair(1);
        let chain = Sigchain::new(keypair.key_id());
        assert_eq!(chain.last_seq(), 0);
        assert!(chain.last().is_none());
        assert!(chain.is_empty());
        assert_eq!(chain.statement_at(0).err(), Some(Error::ChainStatementNotFound(0)));
        assert_eq!(chain.statement_at(1).err(), Some(Error::ChainStatementNotFound(1)));
    }

    #[test]
    fn sigchain_add_links() {
        let keypair = test::keypair(1);
        let chain = chain_with(&keypair, 4);
        assert_eq!(chain.last_seq(), 4);
        assert_eq!(chain.len(), 4);
        assert!(chain.statement_at(1).unwrap().entry().previous().is_none());
        for seq in 2..=4 {
            let prev_digest = chain.statement_at(seq - 1).unwrap().digest().unwrap();
            assert_eq!(chain.statement_at(seq).unwrap().entry().previous(), &Some(prev_digest));
        }
        assert_eq!(chain.statement_at(5).err(), Some(Error::ChainStatementNotFound(5)));
    }

    #[test]
    fn sigchain_add_bad_sequence() {
        let keypair = test::keypair(1);
        let mut chain = chain_with(&keypair, 2);
        let good = chain.build_statement(&keypair, StatementKind::Generic, vec![1], Timestamp::from_millis(2000)).unwrap();

        let mut entry = good.entry().clone();
        entry.set_sequence(5);
        let bad = Statement::new(entry, &keypair).unwrap();
        assert_eq!(chain.add(bad).err(), Some(Error::ChainBadSequence { expected: 3, got: 5 }));
        assert_eq!(chain.last_seq(), 2);

        // re-adding an old statement is a sequence problem too
        let old = chain.statement_at(2).unwrap().clone();
        assert_eq!(chain.add(old).err(), Some(Error::ChainBadSequence { expected: 3, got: 2 }));

        chain.add(good).unwrap();
        assert_eq!(chain.last_seq(), 3);
    }

    #[test]
    fn sigchain_add_bad_previous() {
        let keypair = test::keypair(1);
        let mut chain = chain_with(&keypair, 2);
        let good = chain.build_statement(&keypair, StatementKind::Generic, vec![1], Timestamp::from_millis(2000)).unwrap();

        let mut entry = good.entry().clone();
        entry.set_previous(Some(chain.statement_at(1).unwrap().digest().unwrap()));
        let bad = Statement::new(entry.clone(), &keypair).unwrap();
        assert_eq!(chain.add(bad).err(), Some(Error::ChainBadPrevious(3)));

        entry.set_previous(None);
        let bad = Statement::new(entry, &keypair).unwrap();
        assert_eq!(chain.add(bad).err(), Some(Error::ChainBadPrevious(3)));
        assert_eq!(chain.last_seq(), 2);

        // first statement can't point anywhere
        let mut chain2 = Sigchain::new(keypair.key_id());
        let mut entry = chain2.build_statement(&keypair, StatementKind::Generic, vec![], Timestamp::from_millis(5)).unwrap().entry().clone();
        entry.set_previous(Some(good.digest().unwrap()));
        let bad = Statement::new(entry, &keypair).unwrap();
        assert_eq!(chain2.add(bad).err(), Some(Error::ChainBadPrevious(1)));
        assert!(chain2.is_empty());
    }

    #[test]
    fn sigchain_add_bad_signer_or_signature() {
        let keypair1 = test::keypair(1);
        let keypair2 = test::keypair(2);
        let mut chain = chain_with(&keypair1, 1);

        let chain2 = chain_with(&keypair2, 1);
        let other = chain2.build_statement(&keypair2, StatementKind::Generic, vec![], Timestamp::from_millis(2000)).unwrap();
        assert_eq!(
            chain.add(other).err(),
            Some(Error::ChainBadSigner {
                expected: keypair1.key_id().to_string(),
                got: keypair2.key_id().to_string(),
            })
        );
        assert_eq!(
            chain.build_statement(&keypair2, StatementKind::Generic, vec![], Timestamp::from_millis(2000)).err(),
            Some(Error::ChainBadSigner {
                expected: keypair1.key_id().to_string(),
                got: keypair2.key_id().to_string(),
            })
        );

        let mut forged = chain.build_statement(&keypair1, StatementKind::Generic, vec![1, 2, 3], Timestamp::from_millis(2000)).unwrap();
        forged.entry_mut().set_payload(vec![4, 5, 6].into());
        assert_eq!(chain.add(forged).err(), Some(Error::ChainSignatureInvalid(2)));
        assert_eq!(chain.last_seq(), 1);
    }

    #[test]
    fn sigchain_add_bad_timestamp() {
        let keypair = test::keypair(1);
        let mut chain = chain_with(&keypair, 2);
        let st = chain.build_statement(&keypair, StatementKind::Generic, vec![], Timestamp::from_millis(999)).unwrap();
        assert_eq!(chain.add(st).err(), Some(Error::ChainBadTimestamp(3)));
        // same time is fine
        let st = chain.build_statement(&keypair, StatementKind::Generic, vec![], Timestamp::from_millis(1001)).unwrap();
        chain.add(st).unwrap();
    }

    #[test]
    fn sigchain_revoke() {
        let keypair = test::keypair(1);
        let mut chain = chain_with(&keypair, 3);
        let revoke_seq = chain.revoke(2, &keypair, Timestamp::from_millis(3000)).unwrap();
        assert_eq!(revoke_seq, 4);
        assert!(chain.is_revoked(2));
        assert!(!chain.is_revoked(1));
        assert_eq!(chain.revoked_by(2), Some(4));
        assert_eq!(chain.statement_at(4).unwrap().revoke_target().unwrap(), Some(2));

        // revoked statements are still there, and the links still hold
        assert_eq!(chain.statement_at(2).unwrap().sequence(), 2);
        let active = chain.active(StatementKind::Generic).map(|st| st.sequence()).collect::<Vec<_>>();
        assert_eq!(active, vec![1, 3]);

        assert_eq!(chain.revoke(2, &keypair, Timestamp::from_millis(3001)).err(), Some(Error::ChainAlreadyRevoked(2)));
        assert_eq!(chain.revoke(9, &keypair, Timestamp::from_millis(3001)).err(), Some(Error::ChainStatementNotFound(9)));
        assert_eq!(chain.revoke(0, &keypair, Timestamp::from_millis(3001)).err(), Some(Error::ChainStatementNotFound(0)));
        assert!(matches!(chain.revoke(4, &keypair, Timestamp::from_millis(3001)), Err(Error::ChainRevokeInvalid(_))));
        assert_eq!(chain.last_seq(), 4);
    }

    #[test]
    fn sigchain_add_revoke_statement_twice() {
        let keypair = test::keypair(1);
        let mut chain = chain_with(&keypair, 1);
        chain.revoke(1, &keypair, Timestamp::from_millis(2000)).unwrap();
        // a hand-built second revoke of the same target gets rejected on add
        let payload = ser::serialize(&1u64).unwrap();
        let st = chain.build_statement(&keypair, StatementKind::Revoke, payload, Timestamp::from_millis(2001)).unwrap();
        assert_eq!(chain.add(st).err(), Some(Error::ChainAlreadyRevoked(1)));
        // can't revoke the future either
        let payload = ser::serialize(&3u64).unwrap();
        let st = chain.build_statement(&keypair, StatementKind::Revoke, payload, Timestamp::from_millis(2001)).unwrap();
        assert_eq!(chain.add(st).err(), Some(Error::ChainStatementNotFound(3)));
        assert_eq!(chain.last_seq(), 2);
    }

    #[test]
    fn sigchain_from_statements() {
        let keypair = test::keypair(1);
        let mut chain = chain_with(&keypair, 3);
        chain.revoke(1, &keypair, Timestamp::from_millis(3000)).unwrap();

        let chain2 = Sigchain::from_statements(keypair.key_id(), chain.statements().clone()).unwrap();
        assert_eq!(chain2, chain);
        assert!(chain2.is_revoked(1));

        // drop one in the middle
        let mut statements = chain.statements().clone();
        statements.remove(1);
        let res = Sigchain::from_statements(keypair.key_id(), statements);
        assert_eq!(res.err(), Some(Error::ChainInvalid(Error::ChainBadSequence { expected: 2, got: 3 }.to_string())));

        // wrong owner
        let res = Sigchain::from_statements(test::keypair(2).key_id(), chain.statements().clone());
        assert!(matches!(res, Err(Error::ChainInvalid(_))));
    }

    #[test]
    fn sigchain_text_export() {
        let keypair = test::keypair(1);
        let mut chain = chain_with(&keypair, 2);
        chain.revoke(2, &keypair, Timestamp::from_millis(3000)).unwrap();
        let text = chain.serialize_text().unwrap();
        assert!(text.contains("owner:"));
        assert!(text.contains("Revoke"));
        let chain2 = Sigchain::deserialize_text(text.as_bytes()).unwrap();
        assert_eq!(chain2, chain);

        let tampered = text.replacen("sequence: 2", "sequence: 7", 1);
        assert!(tampered != text);
        assert!(matches!(Sigchain::deserialize_text(tampered.as_bytes()), Err(Error::ChainInvalid(_))));
    }
}
