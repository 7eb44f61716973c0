//! The main error enum for the project lives here, and documents the various
//! conditions that can arise while interacting with the system.
//!
//! Note that a proof that fails to verify is *not* an error from the point of
//! view of the [verification engine][crate::user::Users]. The `Proof*` variants
//! below are produced internally and then folded into a
//! [Status][crate::user::Status] on the cached result. Anything that escapes
//! the engine as an `Err` is an infrastructure problem.

use thiserror::Error;

/// This is our error enum. It contains an entry for any part of the system in
/// which an expectation is not met or a problem occurs.
#[derive(Error, Debug)]
pub enum Error {
    /// A statement was signed by someone other than the chain's owner.
    #[error("statement signer {got} does not match sigchain owner {expected}")]
    ChainBadSigner {
        expected: String,
        got: String,
    },

    /// The statement's previous hash doesn't match the digest of the last
    /// statement in the chain.
    #[error("statement {0} has an invalid previous hash")]
    ChainBadPrevious(u64),

    /// Statements must be appended in order.
    #[error("invalid statement sequence, expected {expected}, got {got}")]
    ChainBadSequence {
        expected: u64,
        got: u64,
    },

    /// Statements cannot be created before the ones they follow.
    #[error("statement {0} was created before its previous statement")]
    ChainBadTimestamp(u64),

    /// A save would truncate or fork the chain we already have stored.
    #[error("sigchain conflicts with stored sigchain: {0}")]
    ChainConflict(String),

    /// An externally supplied chain failed validation. The inner string holds
    /// the reason the first bad statement was rejected.
    #[error("sigchain invalid: {0}")]
    ChainInvalid(String),

    /// No sigchain exists for the given key.
    #[error("sigchain not found: {0}")]
    ChainNotFound(String),

    /// Tried to revoke a statement twice.
    #[error("statement {0} is already revoked")]
    ChainAlreadyRevoked(u64),

    /// A revoke statement targets something it isn't allowed to.
    #[error("invalid revoke: {0}")]
    ChainRevokeInvalid(String),

    /// The statement's signature does not verify against the owner key.
    #[error("statement {0} has an invalid signature")]
    ChainSignatureInvalid(u64),

    /// Looked for a statement that doesn't exist.
    #[error("statement not found: {0}")]
    ChainStatementNotFound(u64),

    /// The address given isn't in `name@service` form.
    #[error("invalid user address {0}")]
    ClaimInvalidAddress(String),

    /// The chain already holds an active claim for this service.
    #[error("user set in sigchain already")]
    ClaimAlreadyClaimed,

    /// The name given for a claim doesn't fit the service's rules.
    #[error("invalid name: {0}")]
    ClaimInvalidName(String),

    /// We don't know about the service given.
    #[error("invalid service {0}")]
    ClaimInvalidService(String),

    /// The url on a claim is unusable.
    #[error("invalid url: {0}")]
    ClaimInvalidUrl(String),

    /// A claim was found signed into a chain that isn't owned by the key on
    /// the claim.
    #[error("user key {got} does not match sigchain owner {expected}")]
    ClaimKeyMismatch {
        expected: String,
        got: String,
    },

    /// A claim was created without a name.
    #[error("no id")]
    ClaimNoID,

    /// The name uses a reserved prefix.
    #[error("user id prefix reserved {0}")]
    ClaimReserved(String),

    /// The claim's sequence doesn't line up with the statement holding it.
    #[error("user seq mismatch, expected {expected}, got {got}")]
    ClaimSequenceMismatch {
        expected: u64,
        got: u64,
    },

    /// Loading configuration failed.
    #[error("config error: {0}")]
    Config(String),

    /// The context we were running under was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// Bad key.
    #[error("key is invalid")]
    CryptoBadKey,

    /// A key is missing from a crypto operation
    #[error("crypto key missing")]
    CryptoKeyMissing,

    /// A signature failed to verify.
    #[error("the given signature/public key/data combo does not verify")]
    CryptoSignatureVerificationFailed,

    /// The context we were running under hit its deadline.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Some bytes didn't have the length we needed.
    #[error("bad length")]
    BadLength,

    /// An error while engaging in binary (de)serialization.
    #[error("binary serialization error")]
    Bincode(#[from] bincode::Error),

    /// An error while engaging in deserialization.
    #[error("deserialization error")]
    DeserializeBase64(#[from] base64::DecodeError),

    /// The proof content did not hold a usable message.
    #[error("{0}")]
    ProofContentInvalid(String),

    /// The url of a proof doesn't match the claim.
    #[error("{0}")]
    ProofPathInvalid(String),

    /// The message we found doesn't verify against the claim.
    #[error("failed to user verify: {0}")]
    ProofStatementInvalid(String),

    /// Fetching a url failed. The inner string is the transport's message
    /// exactly, since it ends up in front of users.
    #[error("{0}")]
    Request(String),

    /// An error while engaging in yaml serialization.
    #[error("yaml serialization error")]
    SerializeYaml(#[from] serde_yaml::Error),

    /// A lock guarding one of our stores was poisoned.
    #[error("store lock poisoned")]
    StoreLockPoisoned,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        // the serde errors aren't eq-able, so compare on their debug output.
        format!("{:?}", self) == format!("{:?}", other)
    }
}

/// Wraps `std::result::Result` around our `Error` enum
pub type Result<T> = std::result::Result<T, Error>;
