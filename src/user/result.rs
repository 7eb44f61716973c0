//! The outcome of checking a claim against its proof.

use crate::{error::Error, user::UserClaim, util::Timestamp};
use getset;
use serde_derive::{Deserialize, Serialize};

/// How verifying a claim went.
///
/// When a check fails for more than one reason, the first failure along the
/// way wins: the url is checked before anything is fetched, the fetch has to
/// work before there's content to look at, and so on. In order: `PathInvalid`,
/// `ConnFailure`, `ContentInvalid`, `StatementInvalid`, and `Failure` for
/// anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The proof checks out.
    #[serde(rename = "ok")]
    Ok,
    /// Something went wrong that doesn't fit anywhere else.
    #[serde(rename = "failure")]
    Failure,
    /// We couldn't fetch the proof.
    #[serde(rename = "connection-fail")]
    ConnFailure,
    /// We fetched the proof but there was no usable message in it.
    #[serde(rename = "content-invalid")]
    ContentInvalid,
    /// The message we found doesn't match the claim.
    #[serde(rename = "statement-invalid")]
    StatementInvalid,
    /// The proof url doesn't point at the claimed account.
    #[serde(rename = "path-invalid")]
    PathInvalid,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Failure => "failure",
            Self::ConnFailure => "connection-fail",
            Self::ContentInvalid => "content-invalid",
            Self::StatementInvalid => "statement-invalid",
            Self::PathInvalid => "path-invalid",
        };
        write!(f, "{}", name)
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        match err {
            Error::ProofPathInvalid(_) => Self::PathInvalid,
            Error::Request(_) | Error::Cancelled | Error::DeadlineExceeded => Self::ConnFailure,
            Error::ProofContentInvalid(_) => Self::ContentInvalid,
            Error::ProofStatementInvalid(_) => Self::StatementInvalid,
            _ => Self::Failure,
        }
    }
}

/// A cached verification outcome for one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::MutGetters, getset::Setters)]
#[getset(get = "pub", get_mut = "pub(crate)", set = "pub(crate)")]
pub struct UserResult {
    /// The claim that was checked.
    user: UserClaim,
    /// How it went.
    status: Status,
    /// What went wrong, if anything.
    err: Option<String>,
    /// When the check happened.
    timestamp: Timestamp,
    /// The last time the claim checked out, if it ever has.
    verified_at: Option<Timestamp>,
}

impl UserResult {
    /// A passing result, checked (and verified) at `timestamp`.
    pub fn ok(user: UserClaim, timestamp: Timestamp) -> Self {
        Self {
            user,
            status: Status::Ok,
            err: None,
            verified_at: Some(timestamp.clone()),
            timestamp,
        }
    }

    /// A failing result. The status comes from the error.
    pub fn failed(user: UserClaim, err: &Error, timestamp: Timestamp) -> Self {
        Self {
            user,
            status: Status::from(err),
            err: Some(err.to_string()),
            timestamp,
            verified_at: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}
