//! Helpful serialization tools.
//!
//! Statements are signed and hashed over their binary (bincode) encoding, so
//! that encoding has to be stable: fields go out in declaration order and byte
//! strings go out length-prefixed. When a human is looking (yaml export)
//! binary values turn into url-safe base64 instead.

use crate::error::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;
use zeroize::Zeroize;

/// Serialize an object into our canonical binary format.
pub(crate) fn serialize<T: Serialize>(obj: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(obj)?)
}

/// Deserialize an object from our canonical binary format.
pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

pub(crate) fn serialize_text<T: Serialize>(obj: &T) -> Result<String> {
    Ok(serde_yaml::to_string(obj)?)
}

pub(crate) fn deserialize_text<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_yaml::from_slice(bytes)?)
}

/// Convert bytes to base64
pub fn base64_encode<T: AsRef<[u8]>>(bytes: T) -> String {
    URL_SAFE_NO_PAD.encode(bytes.as_ref())
}

/// Convert base64 to bytes
pub fn base64_decode<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(bytes.as_ref())?)
}

/// A default implementation for (de)serializing an object to or from binary
/// format.
pub trait SerdeBinary: Serialize + DeserializeOwned {
    /// Serialize this object
    fn serialize_binary(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// Deserialize this object
    fn deserialize_binary(slice: &[u8]) -> Result<Self> {
        deserialize(slice)
    }
}

/// Reads raw bytes out of whatever the deserializer hands us. bincode gives us
/// a byte slice, but we also accept sequences of u8 to be forgiving.
struct BytesVisitor;

impl<'de> serde::de::Visitor<'de> for BytesVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "a byte array")
    }

    fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> std::result::Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> std::result::Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            out.push(byte);
        }
        Ok(out)
    }
}

fn serialize_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.serialize_str(&base64_encode(bytes))
    } else {
        serializer.serialize_bytes(bytes)
    }
}

fn deserialize_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
    if deserializer.is_human_readable() {
        let s = <String>::deserialize(deserializer)?;
        base64_decode(s).map_err(serde::de::Error::custom)
    } else {
        deserializer.deserialize_bytes(BytesVisitor)
    }
}

/// A fixed-length chunk of binary data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binary<const N: usize>([u8; N]);

impl<const N: usize> Binary<N> {
    pub fn new(data: [u8; N]) -> Self {
        Self(data)
    }
}

impl<const N: usize> Deref for Binary<N> {
    type Target = [u8; N];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> AsRef<[u8]> for Binary<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl<const N: usize> TryFrom<&[u8]> for Binary<N> {
    type Error = crate::error::Error;
    fn try_from(slice: &[u8]) -> std::result::Result<Self, Self::Error> {
        let arr: [u8; N] = slice.try_into().map_err(|_| crate::error::Error::BadLength)?;
        Ok(Self(arr))
    }
}

impl<const N: usize> Serialize for Binary<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_bytes(&self.0[..], serializer)
    }
}

impl<'de, const N: usize> Deserialize<'de> for Binary<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let vec = deserialize_bytes(deserializer)?;
        Binary::try_from(vec.as_slice()).map_err(|_| serde::de::Error::custom(String::from("bad slice length")))
    }
}

/// A variable-length chunk of binary data.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct BinaryVec(Vec<u8>);

impl Deref for BinaryVec {
    type Target = Vec<u8>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for BinaryVec {
    fn from(vec: Vec<u8>) -> Self {
        Self(vec)
    }
}

impl Serialize for BinaryVec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_bytes(&self.0[..], serializer)
    }
}

impl<'de> Deserialize<'de> for BinaryVec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self(deserialize_bytes(deserializer)?))
    }
}

/// Fixed-length binary data that is wiped when dropped. Never serialized.
#[derive(Clone)]
pub struct BinarySecret<const N: usize>([u8; N]);

impl<const N: usize> BinarySecret<N> {
    pub fn new(data: [u8; N]) -> Self {
        Self(data)
    }

    pub fn expose_secret(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> Drop for BinarySecret<N> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<const N: usize> std::fmt::Debug for BinarySecret<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BinarySecret(<redacted>)")
    }
}

pub(crate) mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            ts.serialize(serializer)
        } else {
            serializer.serialize_i64(ts.timestamp_millis())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            DateTime::<Utc>::deserialize(deserializer)
        } else {
            let millis = i64::deserialize(deserializer)?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", millis)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Timestamp;
    use serde_derive::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Packet {
        id: Binary<4>,
        body: BinaryVec,
        sent: Timestamp,
    }

    #[test]
    fn binary_formats() {
        let packet = Packet {
            id: Binary::new([1, 2, 3, 4]),
            body: BinaryVec::from(vec![255, 0, 7]),
            sent: Timestamp::from_millis(1234567890001),
        };

        // fields in order, bytes length-prefixed, timestamp as i64 millis
        let bytes = serialize(&packet).unwrap();
        assert_eq!(&bytes[0..12], &[4, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(bytes.len(), 12 + 11 + 8);
        assert_eq!(&bytes[23..], &1234567890001i64.to_le_bytes());
        let packet2: Packet = deserialize(&bytes).unwrap();
        assert_eq!(packet, packet2);

        let text = serialize_text(&packet).unwrap();
        assert!(text.contains("id: AQIDBA"));
        assert!(text.contains("body: _wAH"));
        let packet3: Packet = deserialize_text(text.as_bytes()).unwrap();
        assert_eq!(packet, packet3);
    }

    #[test]
    fn binary_bad_length() {
        let bytes = serialize(&BinaryVec::from(vec![1, 2, 3])).unwrap();
        let res: Result<Binary<4>> = deserialize(&bytes);
        assert!(res.is_err());
        assert_eq!(Binary::<2>::try_from(&[1u8, 2, 3][..]).err(), Some(crate::error::Error::BadLength));
    }
}
