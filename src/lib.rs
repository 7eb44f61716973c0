//! Sigchains and the user proofs that hang off of them.
//!
//! A sigchain is an append-only list of signed statements made by a single
//! key. Each statement points at the one before it, so once a statement is
//! published it can't be quietly edited or dropped. Statements can be revoked
//! by later statements, but never removed.
//!
//! One kind of statement is a user claim: "this key also owns `bob` on
//! twitter, and here's the tweet that says so." The tweet (or gist, or reddit
//! post, or file on a domain) carries an armored, signed message. The
//! [Users][user::Users] engine fetches those proofs, checks them against the
//! claims, and caches the results so that questions like "which key is
//! bob@twitter?" can be answered without going back out to the network.
//!
//! The pieces:
//!
//! 1. [crypto] holds the keys, signatures, and the armor proofs are posted in.
//! 1. [sigchain] builds, validates, and stores chains.
//! 1. [user] defines services, claims, results, and the verification engine.
//! 1. [docs], [request], and [clock] are the seams to the outside world: a
//! document store, the network, and time. Each one has an in-memory version
//! for tests.
//! 1. [context] carries cancellation and deadlines into engine operations.

pub mod error;
pub mod util;
pub mod clock;
pub mod config;
pub mod context;
pub mod crypto;
pub mod docs;
pub mod request;
pub mod sigchain;
pub mod user;

pub use error::{Error, Result};
