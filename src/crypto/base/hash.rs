use crate::{
    error::{Error, Result},
    util::ser::{self, Binary},
};
use blake2::Digest;
use serde_derive::{Deserialize, Serialize};
use std::ops::Deref;

/// A cryptographic hash. By defining this as an enum, we allow expansion of
/// hash algorithms in the future.
///
/// When stringified, the hash is in the format `base64([<hash bytes>|<u8 tag>])`
/// where the `tag` is the specific hash algorithm we use. This allows the hash
/// to shine on its own without the tag getting in the way. Yes, it's vain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hash {
    /// Blake2b 256bit hash
    Blake2b256(Binary<32>),
}

impl Hash {
    /// Create a new blake2b (256 bit) hash from a message
    pub fn new_blake2b_256(message: &[u8]) -> Result<Self> {
        let mut hasher = blake2::Blake2b::<blake2::digest::consts::U32>::new();
        hasher.update(message);
        let genarr = hasher.finalize();
        let arr: [u8; 32] = genarr.as_slice().try_into().map_err(|_| Error::BadLength)?;
        Ok(Self::Blake2b256(Binary::new(arr)))
    }
}

impl From<&Hash> for String {
    fn from(hash: &Hash) -> Self {
        let (bytes, tag) = match hash {
            Hash::Blake2b256(bin) => (bin.deref(), 0u8),
        };
        let mut vec = Vec::from(&bytes[..]);
        vec.push(tag);
        ser::base64_encode(&vec[..])
    }
}

impl TryFrom<&str> for Hash {
    type Error = Error;

    fn try_from(string: &str) -> std::result::Result<Self, Self::Error> {
        let dec = ser::base64_decode(string)?;
        let (tag, bytes) = dec.split_last().ok_or(Error::BadLength)?;
        match tag {
            0 => Ok(Self::Blake2b256(Binary::try_from(bytes)?)),
            _ => Err(Error::BadLength),
        }
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from(self))
    }
}
