//! Users are accounts on other services (twitter, github, ...) that a key
//! claims to own.
//!
//! A [UserClaim] lives in its owner's sigchain, a proof message lives on the
//! service, and the [Users] engine checks one against the other, caching a
//! [UserResult] for every claim so lookups and searches never have to touch
//! the network.

mod claim;
mod engine;
mod result;
mod service;

pub use claim::*;
pub use engine::*;
pub use result::*;
pub use service::*;
