//! A `Statement` is a single signed entry in a [Sigchain][crate::sigchain::Sigchain].
//!
//! Statements have a [StatementEntry] (the part that gets signed) and the
//! owner's signature over the entry's binary encoding. Each entry references
//! the [Hash] of the full statement that came before it, which is what turns a
//! pile of statements into a chain.

use crate::{
    crypto::base::{Hash, KeyID, SignKeypair, SignKeypairSignature},
    error::{Error, Result},
    util::{
        ser::{self, BinaryVec, SerdeBinary},
        Timestamp,
    },
};
use getset;
use serde_derive::{Deserialize, Serialize};

/// What kind of data a statement's payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// Arbitrary application data. The chain doesn't care what's inside.
    Generic,
    /// A serialized [UserClaim][crate::user::UserClaim].
    User,
    /// The (serialized) sequence number of a previous statement, which this
    /// statement revokes.
    Revoke,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Generic => "generic",
            Self::User => "user",
            Self::Revoke => "revoke",
        };
        write!(f, "{}", name)
    }
}

/// The signed portion of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::MutGetters, getset::Setters)]
#[getset(get = "pub", get_mut = "pub(crate)", set = "pub(crate)")]
pub struct StatementEntry {
    /// This statement's position in its chain, starting at 1.
    sequence: u64,
    /// The hash of the statement before us. `None` for the first statement.
    previous: Option<Hash>,
    /// What the payload is.
    kind: StatementKind,
    /// The statement data.
    payload: BinaryVec,
    /// Who signed this statement. Must be the chain's owner.
    key_id: KeyID,
    /// When this statement was created.
    created: Timestamp,
}

impl StatementEntry {
    /// Create a new entry.
    pub fn new<T: Into<Timestamp>>(
        sequence: u64,
        previous: Option<Hash>,
        kind: StatementKind,
        payload: Vec<u8>,
        key_id: KeyID,
        created: T,
    ) -> Self {
        Self {
            sequence,
            previous,
            kind,
            payload: BinaryVec::from(payload),
            key_id,
            created: created.into(),
        }
    }
}

/// A signed, sequence-numbered, hash-linked record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::MutGetters, getset::Setters)]
#[getset(get = "pub", get_mut = "pub(crate)", set = "pub(crate)")]
pub struct Statement {
    /// The signed data.
    entry: StatementEntry,
    /// The signer's signature on the binary-serialized `entry`.
    signature: SignKeypairSignature,
}

impl Statement {
    /// Sign a [StatementEntry], creating a statement. The keypair must be the
    /// one named by the entry's `key_id`.
    pub fn new(entry: StatementEntry, sign_with: &SignKeypair) -> Result<Self> {
        if &sign_with.key_id() != entry.key_id() {
            Err(Error::ChainBadSigner {
                expected: entry.key_id().to_string(),
                got: sign_with.key_id().to_string(),
            })?;
        }
        let serialized = ser::serialize(&entry)?;
        let signature = sign_with.sign(&serialized[..])?;
        Ok(Self { entry, signature })
    }

    /// Verify the signature on this statement against the entry's `key_id`.
    pub fn verify_signature(&self) -> Result<()> {
        let serialized = ser::serialize(self.entry())?;
        self.entry()
            .key_id()
            .verify(self.signature(), &serialized[..])
            .map_err(|_| Error::ChainSignatureInvalid(*self.entry().sequence()))
    }

    /// The hash of this statement's canonical encoding (entry *and* signature).
    /// The statement after us must list this in its `previous` field.
    pub fn digest(&self) -> Result<Hash> {
        let serialized = ser::serialize(self)?;
        Hash::new_blake2b_256(&serialized[..])
    }

    /// Shortcut for the entry's sequence number.
    pub fn sequence(&self) -> u64 {
        *self.entry().sequence()
    }

    /// Shortcut for the entry's kind.
    pub fn kind(&self) -> StatementKind {
        *self.entry().kind()
    }

    /// If this is a revoke statement, grab the sequence it revokes.
    pub fn revoke_target(&self) -> Result<Option<u64>> {
        match self.kind() {
            StatementKind::Revoke => Ok(Some(ser::deserialize(self.entry().payload())?)),
            _ => Ok(None),
        }
    }
}

impl SerdeBinary for Statement {}
