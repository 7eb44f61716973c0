use crate::{
    error::{Error, Result},
    util::ser::{self, Binary, BinarySecret},
};
use rand::{CryptoRng, RngCore};
use serde_derive::{Deserialize, Serialize};
use std::ops::Deref;

/// A signature derived from a signing keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignKeypairSignature {
    Ed25519(Binary<64>),
}

impl AsRef<[u8]> for SignKeypairSignature {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Ed25519(sig) => sig.as_ref(),
        }
    }
}

/// An asymmetric signing keypair.
///
/// The secret half is optional: a keypair without it can still verify.
#[derive(Debug, Clone)]
pub enum SignKeypair {
    /// Ed25519 signing keypair
    Ed25519 {
        public: Binary<32>,
        secret: Option<BinarySecret<32>>,
    },
}

impl SignKeypair {
    fn new_ed25519_from_secret(secret: ed25519_consensus::SigningKey) -> Self {
        let public = secret.verification_key();
        Self::Ed25519 {
            public: Binary::new(public.to_bytes()),
            secret: Some(BinarySecret::new(secret.to_bytes())),
        }
    }

    /// Create a new ed25519 keypair
    pub fn new_ed25519<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut randbuf = [0u8; 32];
        rng.fill_bytes(&mut randbuf);
        let keypair = Self::new_ed25519_from_bytes(randbuf);
        zeroize::Zeroize::zeroize(&mut randbuf);
        keypair
    }

    /// Create a new ed25519 keypair from a cryptographic seed
    pub fn new_ed25519_from_bytes(secret_bytes: [u8; 32]) -> Self {
        Self::new_ed25519_from_secret(ed25519_consensus::SigningKey::from(secret_bytes))
    }

    /// Sign a value with our secret key.
    pub fn sign(&self, data: &[u8]) -> Result<SignKeypairSignature> {
        match self {
            Self::Ed25519 { secret, .. } => {
                let sec = secret.as_ref().ok_or(Error::CryptoKeyMissing)?;
                let seckey = ed25519_consensus::SigningKey::from(*sec.expose_secret());
                let sig_obj = seckey.sign(data);
                Ok(SignKeypairSignature::Ed25519(Binary::new(sig_obj.to_bytes())))
            }
        }
    }

    /// Verify a value with a detached signature given the public key of the
    /// signer.
    pub fn verify(&self, signature: &SignKeypairSignature, data: &[u8]) -> Result<()> {
        SignKeypairPublic::from(self.clone()).verify(signature, data)
    }

    /// Return a copy of this keypair with the secret half removed.
    pub fn strip_private(&self) -> Self {
        match self {
            Self::Ed25519 { public, .. } => Self::Ed25519 {
                public: public.clone(),
                secret: None,
            },
        }
    }

    pub fn has_private(&self) -> bool {
        match self {
            Self::Ed25519 { secret, .. } => secret.is_some(),
        }
    }

    /// Create a KeyID from this keypair.
    pub fn key_id(&self) -> KeyID {
        KeyID::from(SignKeypairPublic::from(self.clone()))
    }
}

impl PartialEq for SignKeypair {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ed25519 { public: public1, .. }, Self::Ed25519 { public: public2, .. }) => public1 == public2,
        }
    }
}

/// An asymmetric signing public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignKeypairPublic {
    /// Ed25519 signing public key
    Ed25519(Binary<32>),
}

impl SignKeypairPublic {
    /// Verify a value with a detached signature given the public key of the
    /// signer.
    pub fn verify(&self, signature: &SignKeypairSignature, data: &[u8]) -> Result<()> {
        match (self, signature) {
            (Self::Ed25519(pubkey_bytes), SignKeypairSignature::Ed25519(sig_bytes)) => {
                let pubkey = ed25519_consensus::VerificationKey::try_from(*pubkey_bytes.deref())
                    .map_err(|_| Error::CryptoSignatureVerificationFailed)?;
                let sig = ed25519_consensus::Signature::from(*sig_bytes.deref());
                pubkey.verify(&sig, data).map_err(|_| Error::CryptoSignatureVerificationFailed)
            }
        }
    }
}

impl From<SignKeypair> for SignKeypairPublic {
    fn from(kp: SignKeypair) -> Self {
        match kp {
            SignKeypair::Ed25519 { public, .. } => Self::Ed25519(public),
        }
    }
}

/// The identity of a key, and so the identity of anyone holding a sigchain.
///
/// Stringifies as `base64([<pubkey bytes>|<u8 tag>])`, same as [Hash][crate::crypto::base::Hash].
/// The string form only uses the url-safe base64 alphabet, so it can sit
/// inside storage paths and urls untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyID(SignKeypairPublic);

impl KeyID {
    pub fn as_string(&self) -> String {
        let (bytes, tag) = match &self.0 {
            SignKeypairPublic::Ed25519(pubkey) => (pubkey.deref(), 0u8),
        };
        let mut vec = Vec::from(&bytes[..]);
        vec.push(tag);
        ser::base64_encode(&vec[..])
    }

    /// Verify a signature made by this key.
    pub fn verify(&self, signature: &SignKeypairSignature, data: &[u8]) -> Result<()> {
        self.0.verify(signature, data)
    }
}

impl Deref for KeyID {
    type Target = SignKeypairPublic;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<SignKeypairPublic> for KeyID {
    fn from(public: SignKeypairPublic) -> Self {
        Self(public)
    }
}

impl TryFrom<&str> for KeyID {
    type Error = Error;

    fn try_from(string: &str) -> std::result::Result<Self, Self::Error> {
        let dec = ser::base64_decode(string).map_err(|_| Error::CryptoBadKey)?;
        let (tag, bytes) = dec.split_last().ok_or(Error::CryptoBadKey)?;
        match tag {
            0 => Ok(Self(SignKeypairPublic::Ed25519(Binary::try_from(bytes).map_err(|_| Error::CryptoBadKey)?))),
            _ => Err(Error::CryptoBadKey),
        }
    }
}

impl std::fmt::Display for KeyID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn signkeypair_ed25519_sign_verify() {
        let mut rng = crate::util::test::rng();
        let our_keypair = SignKeypair::new_ed25519(&mut rng);

        let msg_real =
            String::from("the old man leaned back in his chair, his face weathered by the ceaseless march of time, pondering his...");
        let msg_fake = String::from(
            "the old man leaned back in his chair, his face weathered by the ceaseless march of NATUREFRESH MILK, pondering his...",
        );
        let sig = our_keypair.sign(msg_real.as_bytes()).unwrap();
        let verify_real = our_keypair.verify(&sig, msg_real.as_bytes());
        let verify_fake = our_keypair.verify(&sig, msg_fake.as_bytes());
        assert_eq!(verify_real, Ok(()));
        assert_eq!(verify_fake, Err(Error::CryptoSignatureVerificationFailed));
    }

    #[test]
    fn signkeypair_ed25519_strip_has_private() {
        let mut rng = crate::util::test::rng();
        let keypair = SignKeypair::new_ed25519(&mut rng);
        assert!(keypair.has_private());
        let keypair_pub = keypair.strip_private();
        assert!(!keypair_pub.has_private());
        assert_eq!(keypair, keypair_pub);
        assert_eq!(keypair_pub.sign(b"hi").err(), Some(Error::CryptoKeyMissing));

        let sig = keypair.sign(b"hi").unwrap();
        keypair_pub.verify(&sig, b"hi").unwrap();
    }

    #[test]
    fn key_id_string() {
        let keypair = SignKeypair::new_ed25519_from_bytes([0x01; 32]);
        let key_id = keypair.key_id();
        let string = key_id.as_string();
        assert_eq!(string.len(), 44);
        assert!(string.ends_with('A'));
        assert_eq!(KeyID::try_from(string.as_str()).unwrap(), key_id);
        assert_eq!(KeyID::try_from("z").err(), Some(Error::CryptoBadKey));
        assert_eq!(KeyID::try_from("AQID").err(), Some(Error::CryptoBadKey));

        let other = SignKeypair::new_ed25519_from_bytes([0x02; 32]).key_id();
        assert!(key_id != other);
    }
}
