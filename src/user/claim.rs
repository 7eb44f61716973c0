//! User claims: "the key that owns this sigchain also owns `name` on
//! `service`, and here's the url where it says so."
//!
//! A claim goes into its owner's sigchain as the payload of a
//! [User][StatementKind::User] statement. The proof posted on the service is
//! an armored signature over a [ProofStatement], which leaves out the url and
//! sequence so it can be posted before the claim statement exists.

use crate::{
    crypto::{
        armor,
        base::{KeyID, SignKeypair},
        sign::{self, Signature},
    },
    error::{Error, Result},
    sigchain::{Sigchain, Statement, StatementKind},
    user::Service,
    util::{ser, Timestamp, Url},
};
use getset;
use serde_derive::{Deserialize, Serialize};
use std::str::FromStr;

/// What actually gets signed and posted as proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, getset::Getters)]
#[getset(get = "pub")]
pub struct ProofStatement {
    key_id: KeyID,
    service: Service,
    name: String,
}

/// An account on some service, claimed by a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, getset::Getters)]
#[getset(get = "pub")]
pub struct UserClaim {
    /// The key claiming the account.
    key_id: KeyID,
    /// The service the account is on.
    service: Service,
    /// The (normalized) account name.
    name: String,
    /// Where the proof lives.
    url: Url,
    /// The sequence of the statement this claim is (or will be) stored in.
    sequence: u64,
}

impl UserClaim {
    /// Create a claim, validating the service, name, and url.
    ///
    /// This doesn't check that the url actually points at `name`. That's a
    /// verification problem (see [Status::PathInvalid][crate::user::Status::PathInvalid]).
    pub fn new(key_id: KeyID, service: &str, name: &str, url: &str, sequence: u64) -> Result<Self> {
        let service = Service::from_str(service)?;
        let name = service.normalize_name(name);
        service.validate_name(&name)?;
        let url = Url::parse(url.trim()).map_err(|e| Error::ClaimInvalidUrl(format!("{}: {}", url, e)))?;
        service.validate_url(&url)?;
        Ok(Self {
            key_id,
            service,
            name,
            url,
            sequence,
        })
    }

    /// `name@service`
    pub fn address(&self) -> String {
        format!("{}@{}", self.name(), self.service())
    }

    pub fn proof_statement(&self) -> ProofStatement {
        ProofStatement {
            key_id: self.key_id().clone(),
            service: *self.service(),
            name: self.name().clone(),
        }
    }

    /// Create the armored message the user posts on the service.
    pub fn sign(&self, sign_with: &SignKeypair) -> Result<String> {
        sign_proof(sign_with, self.service(), self.name())
    }

    /// Check an armored proof message against this claim.
    ///
    /// A message that can't be decoded is a content problem. A message that
    /// decodes but wasn't signed by our key, or is about some other account,
    /// is a statement problem.
    pub fn verify_message(&self, message: &str) -> Result<()> {
        let bytes = armor::dearmor(message).map_err(|_| Error::ProofContentInvalid("failed to decode message".into()))?;
        let signature: Signature =
            ser::deserialize(&bytes).map_err(|_| Error::ProofContentInvalid("failed to decode message".into()))?;
        let data = sign::verify_attached(self.key_id(), &signature).map_err(|_| Error::ProofStatementInvalid("verify failed".into()))?;
        let statement: ProofStatement =
            ser::deserialize(data).map_err(|_| Error::ProofStatementInvalid("invalid proof statement".into()))?;
        if statement != self.proof_statement() {
            Err(Error::ProofStatementInvalid(format!("proof is for {}@{}, not {}", statement.name(), statement.service(), self.address())))?;
        }
        Ok(())
    }

    /// Build the sigchain statement holding this claim. The chain must belong
    /// to the claim's key, must not already hold an active claim on this
    /// service, and the claim's sequence has to be the chain's next one.
    pub fn new_statement<T: Into<Timestamp>>(&self, chain: &Sigchain, sign_with: &SignKeypair, now: T) -> Result<Statement> {
        if chain.owner() != self.key_id() {
            Err(Error::ClaimKeyMismatch {
                expected: chain.owner().to_string(),
                got: self.key_id().to_string(),
            })?;
        }
        if Self::find_in_sigchain(chain)?.iter().any(|claim| claim.service() == self.service()) {
            Err(Error::ClaimAlreadyClaimed)?;
        }
        let expected = chain.last_seq() + 1;
        if self.sequence != expected {
            Err(Error::ClaimSequenceMismatch {
                expected,
                got: self.sequence,
            })?;
        }
        let payload = ser::serialize(self)?;
        chain.build_statement(sign_with, StatementKind::User, payload, now)
    }

    /// Decode the claim held in a user statement. Whatever signed it, the
    /// name and url still have to pass the service's rules.
    pub fn from_statement(statement: &Statement) -> Result<Self> {
        if statement.kind() != StatementKind::User {
            Err(Error::ChainInvalid(format!("statement {} is not a user statement", statement.sequence())))?;
        }
        let claim: Self = ser::deserialize(statement.entry().payload())?;
        claim.service().validate_name(claim.name())?;
        claim.service().validate_url(claim.url())?;
        Ok(claim)
    }

    /// Make sure a claim agrees with the statement (and chain) it came from.
    pub fn check_statement(&self, statement: &Statement) -> Result<()> {
        if self.key_id() != statement.entry().key_id() {
            Err(Error::ClaimKeyMismatch {
                expected: statement.entry().key_id().to_string(),
                got: self.key_id().to_string(),
            })?;
        }
        if self.sequence != statement.sequence() {
            Err(Error::ClaimSequenceMismatch {
                expected: statement.sequence(),
                got: self.sequence,
            })?;
        }
        Ok(())
    }

    /// All the active (non-revoked) claims in a chain, in chain order. Claims
    /// that can't be read, or don't line up with their statement, are skipped.
    pub fn find_in_sigchain(chain: &Sigchain) -> Result<Vec<Self>> {
        let mut claims = Vec::new();
        for statement in chain.active(StatementKind::User) {
            match Self::from_statement(statement) {
                Ok(claim) if claim.check_statement(statement).is_ok() => claims.push(claim),
                _ => {}
            }
        }
        Ok(claims)
    }
}

/// Sign a proof for an account before any claim (or url) exists.
pub fn sign_proof(sign_with: &SignKeypair, service: &Service, name: &str) -> Result<String> {
    let statement = ProofStatement {
        key_id: sign_with.key_id(),
        service: *service,
        name: service.normalize_name(name),
    };
    let signature = sign::sign_attached(sign_with, &ser::serialize(&statement)?)?;
    Ok(armor::armor(&ser::serialize(&signature)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;

    #[test]
    fn claim_new() {
        let key_id = test::keypair(1).key_id();
        let claim = UserClaim::new(key_id.clone(), "twitter", "@Gabriel", "https://twitter.com/gabriel/status/1", 1).unwrap();
        assert_eq!(claim.name(), "gabriel");
        assert_eq!(claim.service(), &Service::Twitter);
        assert_eq!(claim.address(), "gabriel@twitter");

        assert_eq!(
            UserClaim::new(key_id.clone(), "twitter", "", "https://twitter.com/gabriel/status/1", 1).err(),
            Some(Error::ClaimNoID)
        );
        assert_eq!(
            UserClaim::new(key_id.clone(), "friendster", "gabriel", "https://twitter.com/gabriel/status/1", 1).err(),
            Some(Error::ClaimInvalidService("friendster".into()))
        );
        assert!(matches!(UserClaim::new(key_id.clone(), "twitter", "gabriel", "not a url", 1), Err(Error::ClaimInvalidUrl(_))));
        assert!(matches!(
            UserClaim::new(key_id.clone(), "twitter", "gabriel", "http://twitter.com/gabriel/status/1", 1),
            Err(Error::ClaimInvalidUrl(_))
        ));
        assert!(matches!(UserClaim::new(key_id, "echo", "gabriel", "https://echo/gabriel", 1), Err(Error::ClaimInvalidUrl(_))));
    }

    #[test]
    fn claim_sign_verify() {
        let keypair = test::keypair(1);
        let claim = UserClaim::new(keypair.key_id(), "twitter", "bob", "https://twitter.com/bob/status/1205589994380783616", 1).unwrap();
        let msg = claim.sign(&keypair).unwrap();
        assert!(msg.starts_with("BEGIN MESSAGE."));
        claim.verify_message(&msg).unwrap();
        // posted somewhere noisy
        claim.verify_message(&format!("<div>\n  <p>{}</p>\n</div>", msg.replace('\n', "<br>"))).unwrap();

        // same claim, different key
        let keypair2 = test::keypair(2);
        let claim2 = UserClaim::new(keypair2.key_id(), "twitter", "bob", "https://twitter.com/bob/status/1205589994380783616", 1).unwrap();
        assert_eq!(claim2.verify_message(&msg).err(), Some(Error::ProofStatementInvalid("verify failed".into())));
        assert_eq!(claim2.verify_message(&msg).err().map(|e| e.to_string()), Some("failed to user verify: verify failed".into()));

        // right key, different account
        let claim3 = UserClaim::new(keypair.key_id(), "twitter", "alice", "https://twitter.com/alice/status/1", 1).unwrap();
        assert!(matches!(claim3.verify_message(&msg), Err(Error::ProofStatementInvalid(_))));

        // garbage
        assert!(matches!(claim.verify_message("BEGIN MESSAGE. abcd. END MESSAGE."), Err(Error::ProofContentInvalid(_))));
    }

    #[test]
    fn claim_new_statement() {
        let keypair = test::keypair(1);
        let mut chain = Sigchain::new(keypair.key_id());
        let claim = UserClaim::new(keypair.key_id(), "twitter", "bob", "https://twitter.com/bob/status/1", chain.last_seq() + 1).unwrap();
        let st = claim.new_statement(&chain, &keypair, Timestamp::from_millis(1234567890001)).unwrap();
        chain.add(st).unwrap();
        assert_eq!(UserClaim::find_in_sigchain(&chain).unwrap(), vec![claim.clone()]);
        assert_eq!(UserClaim::from_statement(chain.statement_at(1).unwrap()).unwrap(), claim);

        let res = claim.new_statement(&chain, &keypair, Timestamp::from_millis(1234567890002));
        assert_eq!(res.err().map(|e| e.to_string()), Some("user set in sigchain already".into()));

        // a different service is fine, as long as the sequence lines up
        let echo = UserClaim::new(keypair.key_id(), "echo", "bob", &format!("test://echo/bob/{}?m=hi", keypair.key_id()), 1).unwrap();
        assert_eq!(
            echo.new_statement(&chain, &keypair, Timestamp::from_millis(1234567890002)).err(),
            Some(Error::ClaimSequenceMismatch { expected: 2, got: 1 })
        );

        // revoke and the service frees up
        chain.revoke(1, &keypair, Timestamp::from_millis(1234567890003)).unwrap();
        assert_eq!(UserClaim::find_in_sigchain(&chain).unwrap(), vec![]);
        let again = UserClaim::new(keypair.key_id(), "twitter", "bob", "https://twitter.com/bob/status/1", chain.last_seq() + 1).unwrap();
        let st = again.new_statement(&chain, &keypair, Timestamp::from_millis(1234567890004)).unwrap();
        chain.add(st).unwrap();
        assert_eq!(UserClaim::find_in_sigchain(&chain).unwrap(), vec![again]);

        // someone else's claim
        let keypair2 = test::keypair(2);
        let theirs = UserClaim::new(keypair2.key_id(), "github", "bob", "https://gist.github.com/bob/1", chain.last_seq() + 1).unwrap();
        assert!(matches!(theirs.new_statement(&chain, &keypair, Timestamp::from_millis(1234567890005)), Err(Error::ClaimKeyMismatch { .. })));
    }

    #[test]
    fn claim_sequence_mismatch_in_chain_is_skipped() {
        let keypair = test::keypair(1);
        let mut chain = Sigchain::new(keypair.key_id());
        // smuggle a claim with the wrong sequence in as a user statement
        let claim = UserClaim::new(keypair.key_id(), "twitter", "bob", "https://twitter.com/bob/status/1", 7).unwrap();
        let st = chain
            .build_statement(&keypair, StatementKind::User, ser::serialize(&claim).unwrap(), Timestamp::from_millis(5))
            .unwrap();
        chain.add(st).unwrap();
        assert_eq!(
            claim.check_statement(chain.statement_at(1).unwrap()).err(),
            Some(Error::ClaimSequenceMismatch { expected: 1, got: 7 })
        );
        assert_eq!(UserClaim::find_in_sigchain(&chain).unwrap(), vec![]);
    }
}
