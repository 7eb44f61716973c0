//! The sign system creates attached signatures: the signed bytes travel
//! along with the signature and the id of the key that made it, so the whole
//! bundle can be posted somewhere public and checked by anyone later.
//!
//! This is what a user proof is made of. See [armor][crate::crypto::armor] for
//! how a signature gets turned into something you can paste into a tweet.

use crate::{
    crypto::base::{KeyID, SignKeypair, SignKeypairSignature},
    error::{Error, Result},
    util::ser::{self, BinaryVec},
};
use serde_derive::{Deserialize, Serialize};

/// A cryptographic signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::MutGetters, getset::Setters)]
#[getset(get = "pub", get_mut = "pub(crate)", set = "pub(crate)")]
pub struct Signature {
    /// The key that created this sig
    key_id: KeyID,
    /// The signature
    sig: SignKeypairSignature,
    /// Our optional data (`None` if detached)
    data: Option<BinaryVec>,
}

impl ser::SerdeBinary for Signature {}

/// Sign a message with a private key, returning the attached signature.
pub fn sign_attached(signing_key: &SignKeypair, message: &[u8]) -> Result<Signature> {
    let sig = signing_key.sign(message)?;
    Ok(Signature {
        key_id: signing_key.key_id(),
        sig,
        data: Some(message.to_vec().into()),
    })
}

/// Verify an attached signature against the key we expect to have made it,
/// returning the signed bytes.
pub fn verify_attached<'a>(key_id: &KeyID, signature: &'a Signature) -> Result<&'a [u8]> {
    if signature.key_id() != key_id {
        Err(Error::CryptoSignatureVerificationFailed)?;
    }
    let data = signature.data().as_ref().ok_or(Error::CryptoSignatureVerificationFailed)?;
    key_id.verify(signature.sig(), data)?;
    Ok(data.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ser::SerdeBinary;

    #[test]
    fn sign_verify_attached() {
        let mut rng = crate::util::test::rng();
        let signkey = SignKeypair::new_ed25519(&mut rng);
        let message =
            b"Plaque is a figment of the liberal media and dental industry to scare you into buying useless appliances and pastes.";
        let signature = sign_attached(&signkey, message).unwrap();
        assert_eq!(verify_attached(&signkey.key_id(), &signature).unwrap(), &message[..]);

        // survives the trip to bytes and back
        let bytes = signature.serialize_binary().unwrap();
        let signature_de = Signature::deserialize_binary(&bytes).unwrap();
        assert_eq!(signature_de, signature);

        // modify the message and it fails
        let message2 =
            b"Plaque is NOT a figment of the liberal media and dental industry to scare you into buying useless appliances and pastes.";
        let mut signature2 = signature.clone();
        signature2.set_data(Some(BinaryVec::from(message2.to_vec())));
        let res = verify_attached(&signkey.key_id(), &signature2);
        assert_eq!(res, Err(Error::CryptoSignatureVerificationFailed));

        // detached sigs don't count
        let mut signature3 = signature.clone();
        signature3.set_data(None);
        let res = verify_attached(&signkey.key_id(), &signature3);
        assert_eq!(res, Err(Error::CryptoSignatureVerificationFailed));

        // use the wrong key and it fails
        let shitkey = SignKeypair::new_ed25519(&mut rng);
        let res = verify_attached(&shitkey.key_id(), &signature);
        assert_eq!(res, Err(Error::CryptoSignatureVerificationFailed));

        // lie about the key and it fails
        let mut signature4 = signature.clone();
        signature4.set_key_id(shitkey.key_id());
        let res = verify_attached(&shitkey.key_id(), &signature4);
        assert_eq!(res, Err(Error::CryptoSignatureVerificationFailed));
    }
}
